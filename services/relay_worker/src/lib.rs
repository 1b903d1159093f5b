//! # Relay Worker
//!
//! Pushes batch price attestations from the gossip network to a destination
//! chain, one coalesced batch key at a time.
//!
//! ```text
//! gossip ─► StreamDriver ─► RelayFeeder ─► RelayWorker ─► RelayAdapter ─► chain
//!                         (dedup, decode)  (coalesce,     (per chain)
//!                                           retry, health)
//! ```
//!
//! Health is a function of the last successful relay only; the status
//! server exposes it for an external liveness probe.

pub mod adapter;
pub mod error;
pub mod feeder;
pub mod http;
pub mod metrics;
pub mod retry;
pub mod worker;

pub use adapter::{AdapterError, DryRunAdapter, PayerInfo, RelayAdapter, RelayResult, RelayRetcode};
pub use error::{RelayWorkerError, Result};
pub use feeder::RelayFeeder;
pub use metrics::RelayWorkerMetrics;
pub use retry::{relay_with_retry, RelayOutcome, RetryPolicy};
pub use worker::{CycleOutcome, PendingEvent, ProductRecord, ProductStatus, RelayWorker};
