//! # Gossip Network Access
//!
//! Both services consume the same upstream: a subscribe-stream of raw signed
//! messages from the gossip network. This crate owns that edge.
//!
//! ## Components
//!
//! - [`GossipSource`]: opens one subscription. [`WebSocketGossipSource`] is
//!   the production implementation, [`ChannelGossipSource`] feeds in-process
//!   messages for tests and local tooling.
//! - [`StreamDriver`]: reconnect-forever loop around a source, with jittered
//!   exponential backoff and a shared [`StreamStatus`].
//!
//! ```rust,no_run
//! use network::{BackoffConfig, StreamDriver, StreamHandler, WebSocketGossipSource};
//! use std::sync::Arc;
//!
//! struct Print;
//! impl StreamHandler for Print {
//!     fn on_message(&self, raw: bytes::Bytes) {
//!         println!("{} bytes", raw.len());
//!     }
//! }
//!
//! # async fn run() {
//! let source = Arc::new(WebSocketGossipSource::new("ws://localhost:7073"));
//! let driver = StreamDriver::new(source, BackoffConfig::default());
//! driver.run(Arc::new(Print)).await;
//! # }
//! ```

pub mod backoff;
pub mod driver;
pub mod error;
pub mod gossip;

pub use backoff::{Backoff, BackoffConfig};
pub use driver::{StreamDriver, StreamHandler, StreamState, StreamStatus};
pub use error::{NetworkError, Result};
pub use gossip::{
    ChannelGossipHandle, ChannelGossipSource, GossipSource, MessageStream, WebSocketGossipSource,
};
