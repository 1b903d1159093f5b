//! Stored price info and its client-facing JSON rendering

use crate::attestation::PriceAttestation;
use crate::feed_id::FeedId;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Latest known value of one feed together with the message it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceInfo {
    pub attestation: PriceAttestation,
    pub sequence: u64,
    pub emitter_chain: u16,
    /// Signed message bytes backing this value
    pub raw: Bytes,
    /// Local receive time, unix seconds
    pub receive_time: i64,
}

impl PriceInfo {
    pub fn feed_id(&self) -> FeedId {
        self.attestation.feed_id
    }

    pub fn attestation_time(&self) -> i64 {
        self.attestation.attestation_time
    }

    pub fn publish_time(&self) -> i64 {
        self.attestation.publish_time
    }

    /// Render as a price feed object
    pub fn to_price_feed(&self, options: RenderOptions) -> PriceFeedJson {
        let a = &self.attestation;
        PriceFeedJson {
            id: a.feed_id,
            price: PriceJson {
                price: a.price.to_string(),
                conf: a.conf.to_string(),
                expo: a.expo,
                publish_time: a.publish_time,
            },
            ema_price: PriceJson {
                price: a.ema_price.to_string(),
                conf: a.ema_conf.to_string(),
                expo: a.expo,
                publish_time: a.publish_time,
            },
            metadata: options.verbose.then(|| PriceFeedMetadata {
                emitter_chain: self.emitter_chain,
                attestation_time: a.attestation_time,
                sequence_number: self.sequence,
                price_service_receive_time: self.receive_time,
            }),
            vaa: options
                .binary
                .then(|| base64::engine::general_purpose::STANDARD.encode(&self.raw)),
        }
    }
}

/// Optional extras requested by a subscriber or query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub binary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceJson {
    /// Decimal string, fixed point with `expo`
    pub price: String,
    pub conf: String,
    pub expo: i32,
    pub publish_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedMetadata {
    pub emitter_chain: u16,
    pub attestation_time: i64,
    pub sequence_number: u64,
    pub price_service_receive_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedJson {
    pub id: FeedId,
    pub price: PriceJson,
    pub ema_price: PriceJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PriceFeedMetadata>,
    /// Base64 of the signed message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vaa: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> PriceInfo {
        let mut attestation = PriceAttestation::new(FeedId::new([0xaa; 32]), -1500, 25, -2, 100);
        attestation.ema_price = -1490;
        attestation.ema_conf = 30;
        attestation.publish_time = 99;
        PriceInfo {
            attestation,
            sequence: 12,
            emitter_chain: 26,
            raw: Bytes::from_static(&[1, 2, 3]),
            receive_time: 101,
        }
    }

    #[test]
    fn test_plain_rendering() {
        let json = serde_json::to_value(info().to_price_feed(RenderOptions::default())).unwrap();
        assert_eq!(json["id"], "aa".repeat(32));
        assert_eq!(json["price"]["price"], "-1500");
        assert_eq!(json["price"]["conf"], "25");
        assert_eq!(json["price"]["expo"], -2);
        assert_eq!(json["price"]["publish_time"], 99);
        assert_eq!(json["ema_price"]["price"], "-1490");
        assert!(json.get("metadata").is_none());
        assert!(json.get("vaa").is_none());
    }

    #[test]
    fn test_verbose_binary_rendering() {
        let feed = info().to_price_feed(RenderOptions {
            verbose: true,
            binary: true,
        });
        let metadata = feed.metadata.clone().unwrap();
        assert_eq!(metadata.attestation_time, 100);
        assert_eq!(metadata.sequence_number, 12);
        assert_eq!(metadata.emitter_chain, 26);
        assert_eq!(metadata.price_service_receive_time, 101);
        assert_eq!(feed.vaa.as_deref(), Some("AQID"));
    }
}
