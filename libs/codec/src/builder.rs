//! # Signed Message Builder
//!
//! Produces wire-compatible signed messages. Signatures are filled with a
//! deterministic placeholder pattern: nothing on the distribution path
//! verifies them, so fixtures and local tooling only need the layout.
//!
//! ```rust
//! use codec::{decode_batch, encode_batch, SignedMessageBuilder};
//! use types::{FeedId, PriceAttestation};
//!
//! let attestation = PriceAttestation::new(FeedId::new([0xaa; 32]), 100, 1, -2, 1_000);
//! let raw = SignedMessageBuilder::new(26)
//!     .with_sequence(1)
//!     .with_payload(encode_batch(&[attestation]).unwrap())
//!     .build();
//! assert_eq!(decode_batch(raw).unwrap().len(), 1);
//! ```

use crate::attestation::{
    AttestationWire, BatchCounts, BatchHeader, BATCH_MAGIC, BATCH_PAYLOAD_ID, FORMAT_MAJOR,
    MIN_FORMAT_MINOR,
};
use crate::envelope::{EnvelopeBody, EnvelopeHeader, GuardianSignature, ENVELOPE_VERSION};
use crate::error::{CodecError, Result};
use bytes::Bytes;
use std::mem::size_of;
use types::PriceAttestation;
use zerocopy::byteorder::{U16, U32, U64};
use zerocopy::AsBytes;

/// Encode attestations as a batch payload
pub fn encode_batch(attestations: &[PriceAttestation]) -> Result<Vec<u8>> {
    let count = u16::try_from(attestations.len()).map_err(|_| CodecError::Encode {
        reason: format!("{} attestations exceed the u16 count field", attestations.len()),
    })?;

    let header = BatchHeader {
        magic: U32::new(BATCH_MAGIC),
        major: U16::new(FORMAT_MAJOR),
        minor: U16::new(MIN_FORMAT_MINOR),
        header_size: U16::new(1),
    };
    let counts = BatchCounts {
        count: U16::new(count),
        attestation_size: U16::new(size_of::<AttestationWire>() as u16),
    };

    let mut payload = Vec::with_capacity(
        size_of::<BatchHeader>()
            + 1
            + size_of::<BatchCounts>()
            + attestations.len() * size_of::<AttestationWire>(),
    );
    payload.extend_from_slice(header.as_bytes());
    payload.push(BATCH_PAYLOAD_ID);
    payload.extend_from_slice(counts.as_bytes());
    for attestation in attestations {
        payload.extend_from_slice(AttestationWire::from(attestation).as_bytes());
    }
    Ok(payload)
}

/// Builder for a complete signed message around an arbitrary payload
#[derive(Debug, Clone)]
pub struct SignedMessageBuilder {
    guardian_set_index: u32,
    signature_count: u8,
    timestamp: u32,
    nonce: u32,
    emitter_chain: u16,
    emitter_address: [u8; 32],
    sequence: u64,
    consistency_level: u8,
    payload: Vec<u8>,
}

impl SignedMessageBuilder {
    pub fn new(emitter_chain: u16) -> Self {
        Self {
            guardian_set_index: 0,
            signature_count: 1,
            timestamp: 0,
            nonce: 0,
            emitter_chain,
            emitter_address: [0u8; 32],
            sequence: 0,
            consistency_level: 1,
            payload: Vec::new(),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_signatures(mut self, count: u8) -> Self {
        self.signature_count = count;
        self
    }

    pub fn with_guardian_set(mut self, index: u32) -> Self {
        self.guardian_set_index = index;
        self
    }

    pub fn with_emitter_address(mut self, address: [u8; 32]) -> Self {
        self.emitter_address = address;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Convenience for the common case of a batch payload
    pub fn with_batch(self, attestations: &[PriceAttestation]) -> Result<Self> {
        Ok(self.with_payload(encode_batch(attestations)?))
    }

    pub fn build(self) -> Bytes {
        let header = EnvelopeHeader {
            version: ENVELOPE_VERSION,
            guardian_set_index: U32::new(self.guardian_set_index),
            signature_count: self.signature_count,
        };
        let body = EnvelopeBody {
            timestamp: U32::new(self.timestamp),
            nonce: U32::new(self.nonce),
            emitter_chain: U16::new(self.emitter_chain),
            emitter_address: self.emitter_address,
            sequence: U64::new(self.sequence),
            consistency_level: self.consistency_level,
        };

        let mut out = Vec::with_capacity(
            size_of::<EnvelopeHeader>()
                + self.signature_count as usize * size_of::<GuardianSignature>()
                + size_of::<EnvelopeBody>()
                + self.payload.len(),
        );
        out.extend_from_slice(header.as_bytes());
        for index in 0..self.signature_count {
            let signature = GuardianSignature {
                guardian_index: index,
                signature: [index.wrapping_mul(31).wrapping_add(7); 65],
            };
            out.extend_from_slice(signature.as_bytes());
        }
        out.extend_from_slice(body.as_bytes());
        out.extend_from_slice(&self.payload);
        Bytes::from(out)
    }
}
