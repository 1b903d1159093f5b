//! Feed identifiers
//!
//! A feed id is the 32-byte price account identifier carried in every
//! attestation. On the wire between clients and services it is rendered as
//! 64 lowercase hex characters, optionally prefixed with `0x` on input.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a feed id in bytes
pub const FEED_ID_LEN: usize = 32;

/// Errors produced when parsing a feed id from text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedIdError {
    #[error("invalid feed id length: expected 64 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("invalid feed id '{0}': only lowercase hex characters are accepted")]
    InvalidCharacters(String),
}

/// 32-byte identifier of a priced asset
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FeedId(pub [u8; FEED_ID_LEN]);

impl FeedId {
    pub const fn new(bytes: [u8; FEED_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FEED_ID_LEN] {
        &self.0
    }

    /// Hex rendering without prefix, as used in every client-facing payload
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; FEED_ID_LEN]> for FeedId {
    fn from(bytes: [u8; FEED_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for FeedId {
    type Err = FeedIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != FEED_ID_LEN * 2 {
            return Err(FeedIdError::InvalidLength(digits.len()));
        }
        if !digits
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(FeedIdError::InvalidCharacters(s.to_string()));
        }

        let mut bytes = [0u8; FEED_ID_LEN];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| FeedIdError::InvalidCharacters(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId({})", self.to_hex())
    }
}

impl Serialize for FeedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FeedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Comma-separated rendering of a list of ids, used in not-found messages
pub fn join_ids(ids: &[FeedId]) -> String {
    ids.iter()
        .map(FeedId::to_hex)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const AA: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn test_parse_with_and_without_prefix() {
        let plain: FeedId = AA.parse().unwrap();
        let prefixed: FeedId = format!("0x{}", AA).parse().unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(plain.0, [0xaa; 32]);
        assert_eq!(plain.to_string(), AA);
    }

    #[test]
    fn test_rejects_uppercase_and_bad_length() {
        assert!(matches!(
            AA.to_uppercase().parse::<FeedId>(),
            Err(FeedIdError::InvalidCharacters(_))
        ));
        assert_eq!(
            "abcd".parse::<FeedId>(),
            Err(FeedIdError::InvalidLength(4))
        );
        assert!("0x".parse::<FeedId>().is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let id = FeedId::new([0x01; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: FeedId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let bad: Result<FeedId, _> = serde_json::from_str("\"zz\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_join_ids() {
        let ids = [FeedId::new([0xaa; 32]), FeedId::new([0xbb; 32])];
        let joined = join_ids(&ids);
        assert_eq!(joined, format!("{}, {}", AA, "bb".repeat(32)));
    }
}
