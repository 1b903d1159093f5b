//! # Batch Price Attestation Decoding
//!
//! Decodes the payload of a signed message into a [`BatchAttestation`].
//!
//! ## Payload Layout (big-endian)
//!
//! ```text
//! magic "P2WH" │ major u16 │ minor u16 │ hdr_size u16 │ hdr (payload_id, ...) │
//! count u16 │ attestation_size u16 │ count × attestation_size bytes
//! ```
//!
//! The attestation slot may be larger than [`AttestationWire`]; trailing bytes
//! belong to newer minor versions and are skipped. The header is likewise
//! length-prefixed so unknown header fields are skipped.

use crate::envelope::parse_envelope;
use crate::error::{CodecError, Result};
use bytes::Bytes;
use std::mem::size_of;
use types::{BatchAttestation, FeedId, PriceAttestation, PriceStatus};
use zerocopy::byteorder::{BigEndian, I32, I64, U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Ref, Unaligned};

/// "P2WH"
pub const BATCH_MAGIC: u32 = 0x5032_5748;
pub const FORMAT_MAJOR: u16 = 3;
pub const MIN_FORMAT_MINOR: u16 = 1;
/// Payload id of a batch price attestation
pub const BATCH_PAYLOAD_ID: u8 = 2;

#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct BatchHeader {
    pub magic: U32<BigEndian>,
    pub major: U16<BigEndian>,
    pub minor: U16<BigEndian>,
    /// Bytes of header that follow this field
    pub header_size: U16<BigEndian>,
}

#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct BatchCounts {
    pub count: U16<BigEndian>,
    pub attestation_size: U16<BigEndian>,
}

#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct AttestationWire {
    pub product_id: [u8; 32],
    pub price_id: [u8; 32],
    pub price: I64<BigEndian>,
    pub conf: U64<BigEndian>,
    pub expo: I32<BigEndian>,
    pub ema_price: I64<BigEndian>,
    pub ema_conf: U64<BigEndian>,
    pub status: u8,
    pub num_publishers: U32<BigEndian>,
    pub max_num_publishers: U32<BigEndian>,
    pub attestation_time: I64<BigEndian>,
    pub publish_time: I64<BigEndian>,
    pub prev_publish_time: I64<BigEndian>,
    pub prev_price: I64<BigEndian>,
    pub prev_conf: U64<BigEndian>,
    pub last_attested_publish_time: I64<BigEndian>,
}

impl From<&AttestationWire> for PriceAttestation {
    fn from(wire: &AttestationWire) -> Self {
        Self {
            product_id: wire.product_id,
            feed_id: FeedId::new(wire.price_id),
            price: wire.price.get(),
            conf: wire.conf.get(),
            expo: wire.expo.get(),
            ema_price: wire.ema_price.get(),
            ema_conf: wire.ema_conf.get(),
            status: PriceStatus::from_wire(wire.status),
            num_publishers: wire.num_publishers.get(),
            max_num_publishers: wire.max_num_publishers.get(),
            attestation_time: wire.attestation_time.get(),
            publish_time: wire.publish_time.get(),
            prev_publish_time: wire.prev_publish_time.get(),
            prev_price: wire.prev_price.get(),
            prev_conf: wire.prev_conf.get(),
            last_attested_publish_time: wire.last_attested_publish_time.get(),
        }
    }
}

impl From<&PriceAttestation> for AttestationWire {
    fn from(a: &PriceAttestation) -> Self {
        Self {
            product_id: a.product_id,
            price_id: a.feed_id.0,
            price: I64::new(a.price),
            conf: U64::new(a.conf),
            expo: I32::new(a.expo),
            ema_price: I64::new(a.ema_price),
            ema_conf: U64::new(a.ema_conf),
            status: a.status.into(),
            num_publishers: U32::new(a.num_publishers),
            max_num_publishers: U32::new(a.max_num_publishers),
            attestation_time: I64::new(a.attestation_time),
            publish_time: I64::new(a.publish_time),
            prev_publish_time: I64::new(a.prev_publish_time),
            prev_price: I64::new(a.prev_price),
            prev_conf: U64::new(a.prev_conf),
            last_attested_publish_time: I64::new(a.last_attested_publish_time),
        }
    }
}

/// Decode the attestations carried by a batch payload
pub fn decode_payload(payload: &[u8]) -> Result<Vec<PriceAttestation>> {
    let (header, rest) = Ref::<_, BatchHeader>::new_from_prefix(payload).ok_or_else(|| {
        CodecError::message_too_small(size_of::<BatchHeader>(), payload.len(), "batch header")
    })?;
    let header = header.into_ref();

    if header.magic.get() != BATCH_MAGIC {
        return Err(CodecError::InvalidMagic {
            expected: BATCH_MAGIC,
            actual: header.magic.get(),
        });
    }
    let (major, minor) = (header.major.get(), header.minor.get());
    if major != FORMAT_MAJOR || minor < MIN_FORMAT_MINOR {
        return Err(CodecError::UnsupportedFormat {
            major,
            minor,
            expected_major: FORMAT_MAJOR,
            min_minor: MIN_FORMAT_MINOR,
        });
    }

    let header_size = header.header_size.get() as usize;
    if header_size == 0 || rest.len() < header_size {
        return Err(CodecError::message_too_small(
            size_of::<BatchHeader>() + header_size.max(1),
            payload.len(),
            "batch header fields",
        ));
    }
    if rest[0] != BATCH_PAYLOAD_ID {
        return Err(CodecError::UnexpectedPayloadId {
            payload_id: rest[0],
            expected: BATCH_PAYLOAD_ID,
        });
    }
    let rest = &rest[header_size..];

    let (counts, mut body) = Ref::<_, BatchCounts>::new_from_prefix(rest).ok_or_else(|| {
        CodecError::message_too_small(
            payload.len() - rest.len() + size_of::<BatchCounts>(),
            payload.len(),
            "batch counts",
        )
    })?;
    let count = counts.count.get() as usize;
    let slot = counts.attestation_size.get() as usize;
    if slot < size_of::<AttestationWire>() {
        return Err(CodecError::AttestationTooSmall {
            declared: slot,
            minimum: size_of::<AttestationWire>(),
        });
    }

    if slot > size_of::<AttestationWire>() {
        tracing::trace!(
            slot,
            known = size_of::<AttestationWire>(),
            "skipping trailing attestation bytes from newer minor version"
        );
    }

    let needed = count * slot;
    if body.len() < needed {
        return Err(CodecError::message_too_small(
            payload.len() - body.len() + needed,
            payload.len(),
            "batch attestations",
        ));
    }

    let mut attestations = Vec::with_capacity(count);
    for _ in 0..count {
        let (current, next) = body.split_at(slot);
        // slot >= size_of::<AttestationWire>() was checked above
        if let Some((wire, _)) = Ref::<_, AttestationWire>::new_from_prefix(current) {
            attestations.push(PriceAttestation::from(wire.into_ref()));
        }
        body = next;
    }

    Ok(attestations)
}

/// Decode a full signed message into a batch, keeping the raw bytes
pub fn decode_batch(raw: Bytes) -> Result<BatchAttestation> {
    let envelope = parse_envelope(&raw)?;
    let attestations = decode_payload(envelope.payload)?;
    let (sequence, emitter_chain) = (envelope.sequence, envelope.emitter_chain);

    Ok(BatchAttestation {
        attestations,
        raw,
        sequence,
        emitter_chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{encode_batch, SignedMessageBuilder};

    fn attestation(byte: u8, price: i64, time: i64) -> PriceAttestation {
        let mut a = PriceAttestation::new(FeedId::new([byte; 32]), price, 7, -8, time);
        a.product_id = [byte.wrapping_add(1); 32];
        a.num_publishers = 12;
        a.max_num_publishers = 40;
        a.prev_price = price - 1;
        a
    }

    #[test]
    fn test_attestation_layout() {
        assert_eq!(size_of::<AttestationWire>(), 157);
        assert_eq!(size_of::<BatchHeader>(), 10);
    }

    #[test]
    fn test_decode_signed_batch() {
        let items = vec![attestation(0xaa, 100, 1_000), attestation(0xbb, -5, 1_001)];
        let raw = SignedMessageBuilder::new(26)
            .with_sequence(5)
            .with_payload(encode_batch(&items).unwrap())
            .build();

        let batch = decode_batch(raw.clone()).unwrap();
        assert_eq!(batch.attestations, items);
        assert_eq!(batch.sequence, 5);
        assert_eq!(batch.emitter_chain, 26);
        assert_eq!(batch.raw, raw);
    }

    #[test]
    fn test_skips_trailing_bytes_in_slot_and_header() {
        let item = attestation(0x11, 42, 9);
        let mut payload = Vec::new();
        payload.extend_from_slice(&BATCH_MAGIC.to_be_bytes());
        payload.extend_from_slice(&3u16.to_be_bytes());
        payload.extend_from_slice(&2u16.to_be_bytes());
        payload.extend_from_slice(&3u16.to_be_bytes());
        payload.extend_from_slice(&[BATCH_PAYLOAD_ID, 0xee, 0xee]);
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload.extend_from_slice(&((size_of::<AttestationWire>() + 4) as u16).to_be_bytes());
        payload.extend_from_slice(AttestationWire::from(&item).as_bytes());
        payload.extend_from_slice(&[0xff; 4]);

        let decoded = decode_payload(&payload).unwrap();
        assert_eq!(decoded, vec![item]);
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let mut payload = encode_batch(&[attestation(1, 1, 1)]).unwrap();
        payload[0] = b'X';
        assert!(matches!(
            decode_payload(&payload),
            Err(CodecError::InvalidMagic { .. })
        ));

        let mut payload = encode_batch(&[attestation(1, 1, 1)]).unwrap();
        payload[5] = 2; // major = 2
        assert!(matches!(
            decode_payload(&payload),
            Err(CodecError::UnsupportedFormat { major: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_payload_id() {
        let mut payload = encode_batch(&[attestation(1, 1, 1)]).unwrap();
        payload[size_of::<BatchHeader>()] = 1;
        assert_eq!(
            decode_payload(&payload).unwrap_err(),
            CodecError::UnexpectedPayloadId {
                payload_id: 1,
                expected: BATCH_PAYLOAD_ID
            }
        );
    }

    #[test]
    fn test_truncated_attestations() {
        let payload = encode_batch(&[attestation(1, 1, 1), attestation(2, 2, 2)]).unwrap();
        let cut = &payload[..payload.len() - 10];
        assert!(matches!(
            decode_payload(cut),
            Err(CodecError::MessageTooSmall { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_decode_never_panics(data in proptest::collection::vec(proptest::num::u8::ANY, 0..600)) {
            let _ = decode_batch(Bytes::from(data.clone()));
            let _ = decode_payload(&data);
        }
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(decode_batch(Bytes::from_static(b"not a signed message")).is_err());
        assert!(decode_batch(Bytes::new()).is_err());
    }
}
