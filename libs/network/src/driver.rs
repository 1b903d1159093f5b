//! # Stream Driver
//!
//! Keeps one subscription to a [`GossipSource`] alive for the lifetime of
//! the process.
//!
//! ## State Machine
//!
//! ```text
//!             ┌──────────────────────────────────────────────┐
//!             ▼                                              │
//! Disconnected ──► Connecting ──► Streaming ──► Error|Closed ┘
//!                      │                            ▲
//!                      └────────── connect failure ─┘
//! ```
//!
//! There is no terminal state. Every failure is logged, the driver waits a
//! jittered exponential backoff, then connects again. The current state and
//! the start of the current streaming session are published through
//! [`StreamStatus`] so callers can compute readiness without touching the
//! driver task.

use crate::backoff::{Backoff, BackoffConfig};
use crate::gossip::GossipSource;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    /// Subscription established and delivering messages
    Streaming,
    /// Connection attempt or live stream failed
    Error,
    /// Upstream ended the stream cleanly
    Closed,
}

/// Receives everything the driver reads
///
/// Called inline on the driver task: a slow handler delays the next read.
pub trait StreamHandler: Send + Sync {
    fn on_message(&self, raw: Bytes);

    fn on_state_change(&self, _state: StreamState) {}
}

#[derive(Debug)]
struct StatusInner {
    state: StreamState,
    connected_since: Option<Instant>,
    sessions: u64,
}

/// Shared view of the driver's connection status
#[derive(Debug, Clone)]
pub struct StreamStatus {
    inner: Arc<RwLock<StatusInner>>,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StatusInner {
                state: StreamState::Disconnected,
                connected_since: None,
                sessions: 0,
            })),
        }
    }
}

impl StreamStatus {
    pub fn state(&self) -> StreamState {
        self.inner.read().state
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// How long the current session has been streaming; `None` otherwise
    pub fn streaming_for(&self) -> Option<Duration> {
        let inner = self.inner.read();
        match (inner.state, inner.connected_since) {
            (StreamState::Streaming, Some(since)) => Some(since.elapsed()),
            _ => None,
        }
    }

    /// Number of streaming sessions established so far
    pub fn sessions(&self) -> u64 {
        self.inner.read().sessions
    }

    fn set(&self, state: StreamState) {
        let mut inner = self.inner.write();
        inner.state = state;
        if state == StreamState::Streaming {
            inner.connected_since = Some(Instant::now());
            inner.sessions += 1;
        } else {
            inner.connected_since = None;
        }
    }
}

pub struct StreamDriver {
    source: Arc<dyn GossipSource>,
    backoff: Backoff,
    status: StreamStatus,
}

impl StreamDriver {
    pub fn new(source: Arc<dyn GossipSource>, backoff: BackoffConfig) -> Self {
        Self {
            source,
            backoff: Backoff::new(backoff),
            status: StreamStatus::default(),
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.status.clone()
    }

    fn transition(&self, handler: &dyn StreamHandler, state: StreamState) {
        self.status.set(state);
        handler.on_state_change(state);
    }

    /// Run until the task is dropped
    pub async fn run(mut self, handler: Arc<dyn StreamHandler>) {
        let endpoint = self.source.endpoint();
        loop {
            self.transition(handler.as_ref(), StreamState::Connecting);
            debug!("Connecting to gossip endpoint {}", endpoint);

            match self.source.subscribe().await {
                Ok(mut messages) => {
                    self.transition(handler.as_ref(), StreamState::Streaming);
                    self.backoff.reset();
                    info!("Streaming from gossip endpoint {}", endpoint);

                    let mut ended = StreamState::Closed;
                    while let Some(item) = messages.next().await {
                        match item {
                            Ok(raw) => handler.on_message(raw),
                            Err(e) => {
                                error!("Gossip stream from {} failed: {}", endpoint, e);
                                ended = StreamState::Error;
                                break;
                            }
                        }
                    }
                    if ended == StreamState::Closed {
                        error!("Gossip stream from {} closed", endpoint);
                    }
                    self.transition(handler.as_ref(), ended);
                }
                Err(e) => {
                    error!("Failed to subscribe to gossip endpoint {}: {}", endpoint, e);
                    self.transition(handler.as_ref(), StreamState::Error);
                }
            }

            self.transition(handler.as_ref(), StreamState::Disconnected);
            let delay = self.backoff.next_delay();
            info!(
                "Reconnecting to gossip endpoint {} in {}ms",
                endpoint,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
