//! # Signed Message Envelope
//!
//! Zero-copy parsing of the guardian-signed envelope that wraps every
//! attestation payload on the gossip network.
//!
//! ## Wire Layout (big-endian)
//!
//! ```text
//! ┌─────────┬────────────┬───────┬──────────────────┬───────────────────────────┬─────────┐
//! │ version │ gs_index   │ n_sig │ n_sig × 66 bytes │ body (51 bytes)           │ payload │
//! │ u8 = 1  │ u32        │ u8    │ index + sig[65]  │ ts nonce chain addr seq cl│ ...     │
//! └─────────┴────────────┴───────┴──────────────────┴───────────────────────────┴─────────┘
//! ```
//!
//! Signatures are carried through untouched; verification belongs to the
//! destination chain, not to the distribution path.

use crate::error::{CodecError, Result};
use std::mem::size_of;
use zerocopy::byteorder::{BigEndian, U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Ref, Unaligned};

/// Only envelope version understood by this codec
pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct EnvelopeHeader {
    pub version: u8,
    pub guardian_set_index: U32<BigEndian>,
    pub signature_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct GuardianSignature {
    pub guardian_index: u8,
    pub signature: [u8; 65],
}

#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct EnvelopeBody {
    pub timestamp: U32<BigEndian>,
    pub nonce: U32<BigEndian>,
    pub emitter_chain: U16<BigEndian>,
    pub emitter_address: [u8; 32],
    pub sequence: U64<BigEndian>,
    pub consistency_level: u8,
}

/// Borrowed view over a parsed envelope
#[derive(Debug, Clone)]
pub struct Envelope<'a> {
    pub guardian_set_index: u32,
    pub signatures: &'a [GuardianSignature],
    pub timestamp: u32,
    pub nonce: u32,
    pub emitter_chain: u16,
    pub emitter_address: [u8; 32],
    pub sequence: u64,
    pub consistency_level: u8,
    pub payload: &'a [u8],
}

/// Parse the envelope and return views over its fields and payload
pub fn parse_envelope(data: &[u8]) -> Result<Envelope<'_>> {
    let (header, rest) = Ref::<_, EnvelopeHeader>::new_from_prefix(data).ok_or_else(|| {
        CodecError::message_too_small(size_of::<EnvelopeHeader>(), data.len(), "envelope header")
    })?;
    let header = header.into_ref();

    if header.version != ENVELOPE_VERSION {
        return Err(CodecError::UnsupportedVersion {
            version: header.version,
            expected: ENVELOPE_VERSION,
        });
    }

    let count = header.signature_count as usize;
    let (signatures, rest) = Ref::<_, [GuardianSignature]>::new_slice_from_prefix(rest, count)
        .ok_or_else(|| {
            CodecError::message_too_small(
                size_of::<EnvelopeHeader>() + count * size_of::<GuardianSignature>(),
                data.len(),
                "guardian signatures",
            )
        })?;

    let (body, payload) = Ref::<_, EnvelopeBody>::new_from_prefix(rest).ok_or_else(|| {
        CodecError::message_too_small(
            data.len() - rest.len() + size_of::<EnvelopeBody>(),
            data.len(),
            "envelope body",
        )
    })?;
    let body = body.into_ref();

    Ok(Envelope {
        guardian_set_index: header.guardian_set_index.get(),
        signatures: signatures.into_slice(),
        timestamp: body.timestamp.get(),
        nonce: body.nonce.get(),
        emitter_chain: body.emitter_chain.get(),
        emitter_address: body.emitter_address,
        sequence: body.sequence.get(),
        consistency_level: body.consistency_level,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SignedMessageBuilder;

    #[test]
    fn test_wire_sizes() {
        assert_eq!(size_of::<EnvelopeHeader>(), 6);
        assert_eq!(size_of::<GuardianSignature>(), 66);
        assert_eq!(size_of::<EnvelopeBody>(), 51);
    }

    #[test]
    fn test_parse_built_envelope() {
        let raw = SignedMessageBuilder::new(26)
            .with_sequence(99)
            .with_timestamp(1_700_000_000)
            .with_signatures(3)
            .with_payload(b"hello".to_vec())
            .build();

        let envelope = parse_envelope(&raw).unwrap();
        assert_eq!(envelope.emitter_chain, 26);
        assert_eq!(envelope.sequence, 99);
        assert_eq!(envelope.timestamp, 1_700_000_000);
        assert_eq!(envelope.signatures.len(), 3);
        assert_eq!(envelope.signatures[2].guardian_index, 2);
        assert_eq!(envelope.payload, b"hello");
    }

    #[test]
    fn test_rejects_wrong_version() {
        let mut raw = SignedMessageBuilder::new(1).build().to_vec();
        raw[0] = 2;
        assert_eq!(
            parse_envelope(&raw).unwrap_err(),
            CodecError::UnsupportedVersion {
                version: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn test_truncated_envelope() {
        let raw = SignedMessageBuilder::new(1).with_signatures(2).build();
        for cut in [0, 3, 6, 70, raw.len() - 1] {
            assert!(matches!(
                parse_envelope(&raw[..cut]),
                Err(CodecError::MessageTooSmall { .. })
            ));
        }
    }
}
