//! # Attestation Codec
//!
//! Decoding rules for the signed price-attestation messages that arrive from
//! the gossip network, plus the digests both services key their state on.
//!
//! ## Architecture
//!
//! ```text
//! raw bytes ─► message_digest ─► DedupWindow (drop re-deliveries)
//!     │
//!     └──────► parse_envelope ─► decode_payload ─► BatchAttestation ─► batch_key
//! ```
//!
//! Decode failures are reported as [`CodecError`]; callers log and drop the
//! message. Nothing here touches the network or the clock.

pub mod attestation;
pub mod builder;
pub mod dedup;
pub mod digest;
pub mod envelope;
pub mod error;

pub use attestation::{decode_batch, decode_payload, AttestationWire};
pub use builder::{encode_batch, SignedMessageBuilder};
pub use dedup::{DedupWindow, DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_TTL};
pub use digest::{batch_key, batch_summary, feed_set_key, message_digest, Digest};
pub use envelope::{parse_envelope, Envelope};
pub use error::{CodecError, Result};
