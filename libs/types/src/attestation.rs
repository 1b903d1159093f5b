//! Decoded price attestations
//!
//! A [`BatchAttestation`] is everything the services need out of one signed
//! message: the individual readings, the original bytes so they can be
//! re-served or relayed verbatim, and the emitter's sequence number.

use crate::feed_id::FeedId;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Trading status reported by the price source
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum PriceStatus {
    #[default]
    Unknown = 0,
    Trading = 1,
    Halted = 2,
    Auction = 3,
}

impl PriceStatus {
    /// Statuses outside the known range decode as `Unknown`
    pub fn from_wire(value: u8) -> Self {
        Self::try_from(value).unwrap_or(Self::Unknown)
    }
}

/// One asset's signed reading inside a batch. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAttestation {
    pub product_id: [u8; 32],
    pub feed_id: FeedId,
    pub price: i64,
    pub conf: u64,
    pub expo: i32,
    pub ema_price: i64,
    pub ema_conf: u64,
    pub status: PriceStatus,
    pub num_publishers: u32,
    pub max_num_publishers: u32,
    /// Network clock, seconds. Orders successive readings of a feed.
    pub attestation_time: i64,
    /// Source clock, seconds
    pub publish_time: i64,
    pub prev_publish_time: i64,
    pub prev_price: i64,
    pub prev_conf: u64,
    pub last_attested_publish_time: i64,
}

impl PriceAttestation {
    /// Minimal attestation for a feed; remaining fields are zeroed
    pub fn new(feed_id: FeedId, price: i64, conf: u64, expo: i32, attestation_time: i64) -> Self {
        Self {
            product_id: [0u8; 32],
            feed_id,
            price,
            conf,
            expo,
            ema_price: price,
            ema_conf: conf,
            status: PriceStatus::Trading,
            num_publishers: 0,
            max_num_publishers: 0,
            attestation_time,
            publish_time: attestation_time,
            prev_publish_time: attestation_time,
            prev_price: price,
            prev_conf: conf,
            last_attested_publish_time: attestation_time,
        }
    }

    pub fn with_publish_time(mut self, publish_time: i64) -> Self {
        self.publish_time = publish_time;
        self
    }
}

/// Attestations signed together as one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchAttestation {
    pub attestations: Vec<PriceAttestation>,
    /// The original signed message
    pub raw: Bytes,
    /// Monotonically increasing per emitter
    pub sequence: u64,
    pub emitter_chain: u16,
}

impl BatchAttestation {
    pub fn feed_ids(&self) -> impl Iterator<Item = FeedId> + '_ {
        self.attestations.iter().map(|a| a.feed_id)
    }

    /// Attestation time of the batch; all members are attested together, so
    /// the latest one is representative.
    pub fn attestation_time(&self) -> Option<i64> {
        self.attestations.iter().map(|a| a.attestation_time).max()
    }

    pub fn len(&self) -> usize {
        self.attestations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attestations.is_empty()
    }
}
