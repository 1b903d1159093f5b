//! Decode errors for signed attestation messages
//!
//! Every variant carries enough context to tell a truncated stream apart from
//! a message produced by an incompatible emitter. None of them are fatal to a
//! consumer: the offending message is dropped and the stream continues.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Envelope version other than the single supported one
    #[error("Unsupported envelope version {version}: expected {expected}")]
    UnsupportedVersion { version: u8, expected: u8 },

    /// Payload does not start with the batch attestation magic
    #[error("Invalid payload magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// Batch format version this codec cannot read
    #[error("Unsupported batch format {major}.{minor}: expected major {expected_major}, minor >= {min_minor}")]
    UnsupportedFormat {
        major: u16,
        minor: u16,
        expected_major: u16,
        min_minor: u16,
    },

    /// Payload kind other than a batch price attestation
    #[error("Unexpected payload id {payload_id}: expected {expected}")]
    UnexpectedPayloadId { payload_id: u8, expected: u8 },

    /// Declared attestation size is smaller than the fixed attestation layout
    #[error("Attestation size {declared} is smaller than the minimum {minimum}")]
    AttestationTooSmall { declared: usize, minimum: usize },

    /// Encoder input that cannot be represented on the wire
    #[error("Cannot encode batch: {reason}")]
    Encode { reason: String },
}

impl CodecError {
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
