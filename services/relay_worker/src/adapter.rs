//! # Relay Adapter Contract
//!
//! Chain-specific submission lives behind [`RelayAdapter`]. The worker only
//! interprets the returned [`RelayRetcode`]:
//!
//! | Code | Retry |
//! |---|---|
//! | `Success`, `AlreadyExecuted`, `InsufficientFunds` | no |
//! | `Fail`, `Timeout`, `SeqNumMismatch` | yes |
//! | anything else | yes, logged as unexpected |
//!
//! Adapters return numeric codes on the wire; unknown ones survive as
//! [`RelayRetcode::Other`].

use async_trait::async_trait;
use bytes::Bytes;
use codec::message_digest;
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use tracing::info;
use types::FeedId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum RelayRetcode {
    Success = 0,
    Fail = 1,
    AlreadyExecuted = 2,
    Timeout = 3,
    SeqNumMismatch = 4,
    InsufficientFunds = 5,
    #[num_enum(catch_all)]
    Other(u32),
}

impl RelayRetcode {
    /// Whether another attempt may change the outcome
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RelayRetcode::Success | RelayRetcode::AlreadyExecuted | RelayRetcode::InsufficientFunds
        )
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RelayRetcode::Other(_))
    }
}

impl fmt::Display for RelayRetcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayRetcode::Success => f.write_str("Success"),
            RelayRetcode::Fail => f.write_str("Fail"),
            RelayRetcode::AlreadyExecuted => f.write_str("AlreadyExecuted"),
            RelayRetcode::Timeout => f.write_str("Timeout"),
            RelayRetcode::SeqNumMismatch => f.write_str("SeqNumMismatch"),
            RelayRetcode::InsufficientFunds => f.write_str("InsufficientFunds"),
            RelayRetcode::Other(code) => write!(f, "Other({})", code),
        }
    }
}

impl Serialize for RelayRetcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayResult {
    pub code: RelayRetcode,
    /// Transaction references reported by the chain
    pub refs: Vec<String>,
}

impl RelayResult {
    pub fn new(code: RelayRetcode, refs: Vec<String>) -> Self {
        Self { code, refs }
    }

    pub fn fail() -> Self {
        Self::new(RelayRetcode::Fail, Vec::new())
    }

    pub fn is_ok(&self) -> bool {
        self.code == RelayRetcode::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayerInfo {
    pub address: String,
    pub balance: u128,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Relay transport error: {message}")]
    Transport { message: String },

    #[error("Query for {feed_id} failed: {message}")]
    Query { feed_id: FeedId, message: String },

    #[error("Payer lookup failed: {message}")]
    Payer { message: String },
}

/// Submits signed messages to one destination chain
#[async_trait]
pub trait RelayAdapter: Send + Sync {
    /// Submit `messages` together. An `Err` counts as a retryable failure.
    async fn relay(&self, messages: &[Bytes]) -> Result<RelayResult, AdapterError>;

    /// Current on-chain value of a feed, in whatever shape the chain reports
    async fn query(&self, feed_id: &FeedId) -> Result<serde_json::Value, AdapterError>;

    async fn payer_info(&self) -> Result<PayerInfo, AdapterError>;
}

/// Logs every submission and reports success without touching a chain
#[derive(Debug, Clone, Default)]
pub struct DryRunAdapter;

#[async_trait]
impl RelayAdapter for DryRunAdapter {
    async fn relay(&self, messages: &[Bytes]) -> Result<RelayResult, AdapterError> {
        let refs: Vec<String> = messages
            .iter()
            .map(|raw| message_digest(raw).to_hex())
            .collect();
        info!("Dry run: would relay {} message(s): {:?}", messages.len(), refs);
        Ok(RelayResult::new(RelayRetcode::Success, refs))
    }

    async fn query(&self, feed_id: &FeedId) -> Result<serde_json::Value, AdapterError> {
        Ok(serde_json::json!({ "price_id": feed_id.to_hex(), "dry_run": true }))
    }

    async fn payer_info(&self) -> Result<PayerInfo, AdapterError> {
        Ok(PayerInfo {
            address: "dry-run".to_string(),
            balance: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_classification() {
        for code in [
            RelayRetcode::Success,
            RelayRetcode::AlreadyExecuted,
            RelayRetcode::InsufficientFunds,
        ] {
            assert!(!code.is_retryable(), "{} must not retry", code);
        }
        for code in [
            RelayRetcode::Fail,
            RelayRetcode::Timeout,
            RelayRetcode::SeqNumMismatch,
            RelayRetcode::Other(42),
        ] {
            assert!(code.is_retryable(), "{} must retry", code);
        }
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!(RelayRetcode::from(2u32), RelayRetcode::AlreadyExecuted);
        assert_eq!(RelayRetcode::from(17u32), RelayRetcode::Other(17));
        assert!(!RelayRetcode::from(17u32).is_known());
        assert_eq!(u32::from(RelayRetcode::SeqNumMismatch), 4);
    }

    #[test]
    fn test_result_serialization() {
        let result = RelayResult::new(RelayRetcode::Success, vec!["abc".to_string()]);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"code": "Success", "refs": ["abc"]})
        );
    }

    #[tokio::test]
    async fn test_dry_run_reports_success() {
        let adapter = DryRunAdapter;
        let result = adapter.relay(&[Bytes::from_static(b"vaa")]).await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.refs, vec![message_digest(b"vaa").to_hex()]);
        assert_eq!(adapter.payer_info().await.unwrap().balance, 0);
    }
}
