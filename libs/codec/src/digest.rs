//! Message digests and batch keys
//!
//! Two different hashes are in play:
//!
//! - [`message_digest`] hashes the raw signed bytes. Byte-identical
//!   re-deliveries share it; a re-signed copy of the same data does not.
//! - [`batch_key`] hashes only the set of feed ids in a batch. Every update
//!   to the same feed set shares it, whatever the prices are.

use sha3::{Digest as _, Keccak256};
use std::fmt;
use types::{BatchAttestation, FeedId};

/// 32-byte Keccak-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Content digest of a raw signed message
pub fn message_digest(raw: &[u8]) -> Digest {
    Digest(Keccak256::digest(raw).into())
}

/// Key shared by every batch covering the same feed ids
pub fn batch_key(batch: &BatchAttestation) -> Digest {
    feed_set_key(batch.feed_ids())
}

pub fn feed_set_key(ids: impl IntoIterator<Item = FeedId>) -> Digest {
    let mut ids: Vec<FeedId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Keccak256::new();
    for id in &ids {
        hasher.update(id.as_bytes());
    }
    Digest(hasher.finalize().into())
}

/// Compact JSON summary of a batch for logs and status output
pub fn batch_summary(batch: &BatchAttestation) -> String {
    let entries: Vec<serde_json::Value> = batch
        .attestations
        .iter()
        .map(|a| {
            serde_json::json!({
                "id": a.feed_id.to_hex(),
                "price": a.price.to_string(),
                "conf": a.conf.to_string(),
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}
