//! # Price Service
//!
//! Ingests signed batch price attestations from the gossip network, keeps the
//! latest value per feed and serves it to clients.
//!
//! ## Architecture
//!
//! ```text
//! gossip ─► StreamDriver ─► Listener ─► PriceStore ─┬─► SubscriptionRegistry ─► /ws clients
//!                                  │                └─► (observers)
//!                                  └─► PublishTimeHistory
//!                 QueryService ◄── PriceStore + history ◄── REST (/api/*)
//! ```
//!
//! - [`store`]: latest value per feed, freshness ordering, observer fanout
//! - [`listener`]: dedup, decode, age and freshness filtering, readiness
//! - [`distribution`]: subscribe/unsubscribe protocol and update fanout
//! - [`server`]: WebSocket transport and heartbeat
//! - [`query`] / [`rest`]: stateless reads
//!
//! Every component takes its metrics handle at construction; nothing is
//! registered globally.

pub mod distribution;
pub mod error;
pub mod history;
pub mod listener;
pub mod metrics;
pub mod query;
pub mod rest;
pub mod server;
pub mod service;
pub mod store;

pub use distribution::{
    ClientMessage, ConnectionId, Outbound, ResponseStatus, ServerMessage, SubscriptionError,
    SubscriptionRegistry,
};
pub use error::{PriceServiceError, Result};
pub use history::{HistoryEntry, PublishTimeHistory};
pub use listener::{Listener, ProcessOutcome};
pub use metrics::PriceServiceMetrics;
pub use query::{QueryError, QueryService, StaleFeed};
pub use rest::{ReadinessCheck, RestApi};
pub use server::DistributionServer;
pub use service::{PriceService, RunningPriceService};
pub use store::{MessageOrigin, PriceObserver, PriceStore};
