//! # Subscription Registry
//!
//! Transport-independent core of the WebSocket distribution server: who is
//! connected, which feeds each connection follows, and what to send them.
//!
//! ## Protocol
//!
//! ```text
//! client → {"type":"subscribe"|"unsubscribe","ids":[...],"verbose"?:bool,"binary"?:bool}
//! server → {"type":"response","status":"success"}
//!        | {"type":"response","status":"error","error":"..."}
//!        | {"type":"price_update","price_feed":{...}}
//! ```
//!
//! A request naming any unknown feed is rejected as a whole; none of its ids
//! are applied. Unsubscribing from a feed the connection does not follow is
//! a successful no-op.
//!
//! ## Liveness
//!
//! [`SubscriptionRegistry::heartbeat_sweep`] pings every connection and
//! evicts those that did not answer the previous sweep's ping.
//!
//! ## Locking
//!
//! Connections and per-feed subscriber sets share one lock. Membership
//! changes take it for writing, fanout for reading. Sends go into unbounded
//! per-connection channels, so fanout never waits on a socket.

use crate::metrics::PriceServiceMetrics;
use crate::store::{PriceObserver, PriceStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::{join_ids, FeedId, PriceFeedJson, PriceInfo, RenderOptions};

/// Per-connection id, for logs and metrics only
pub type ConnectionId = u64;

/// Frames queued for a connection's transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMessageType {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: ClientMessageType,
    pub ids: Vec<FeedId>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub binary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Response {
        status: ResponseStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PriceUpdate {
        price_feed: PriceFeedJson,
    },
}

impl ServerMessage {
    pub fn success() -> Self {
        Self::Response {
            status: ResponseStatus::Success,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Response {
            status: ResponseStatus::Error,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Price Feed(s) with id(s) {} not found.", join_ids(.0))]
    FeedsNotFound(Vec<FeedId>),

    #[error("Connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

struct Connection {
    sender: mpsc::UnboundedSender<Outbound>,
    /// Answered the last ping
    alive: bool,
    feeds: HashSet<FeedId>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, Connection>,
    feed_subscribers: HashMap<FeedId, HashMap<ConnectionId, RenderOptions>>,
}

impl RegistryState {
    fn drop_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        for feed in &connection.feeds {
            if let Some(subscribers) = self.feed_subscribers.get_mut(feed) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    self.feed_subscribers.remove(feed);
                }
            }
        }
        Some(connection)
    }
}

pub struct SubscriptionRegistry {
    store: Arc<PriceStore>,
    next_id: AtomicU64,
    state: RwLock<RegistryState>,
    metrics: Arc<PriceServiceMetrics>,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<PriceStore>, metrics: Arc<PriceServiceMetrics>) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(0),
            state: RwLock::new(RegistryState::default()),
            metrics,
        }
    }

    /// Create the registry and subscribe it to store updates
    pub fn attach(store: Arc<PriceStore>, metrics: Arc<PriceServiceMetrics>) -> Arc<Self> {
        let registry = Arc::new(Self::new(store.clone(), metrics));
        store.subscribe(registry.clone());
        registry
    }

    pub fn register_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.write();
        state.connections.insert(
            id,
            Connection {
                sender,
                alive: true,
                feeds: HashSet::new(),
            },
        );
        self.metrics.ws_connections.set(state.connections.len() as i64);
        self.metrics.ws_interaction("connection", "ok");
        info!("Registered connection {}", id);
        (id, receiver)
    }

    /// Forget a connection and every subscription it held
    pub fn remove_connection(&self, id: ConnectionId) {
        let mut state = self.state.write();
        if state.drop_connection(id).is_some() {
            self.metrics.ws_connections.set(state.connections.len() as i64);
            self.metrics.ws_interaction("close", "ok");
            info!("Connection {} closed", id);
        }
    }

    pub fn record_pong(&self, id: ConnectionId) {
        if let Some(connection) = self.state.write().connections.get_mut(&id) {
            connection.alive = true;
        }
    }

    /// Validate and apply one client request, queueing the response
    pub fn handle_client_message(&self, id: ConnectionId, text: &str) -> Result<(), SubscriptionError> {
        let mut state = self.state.write();
        let Some(connection) = state.connections.get(&id) else {
            return Err(SubscriptionError::UnknownConnection(id));
        };
        let sender = connection.sender.clone();

        let outcome = self.apply(&mut state, id, text);
        let response = match &outcome {
            Ok(()) => {
                info!("Successful request {} from connection {}", text, id);
                self.metrics.ws_interaction("client_message", "ok");
                ServerMessage::success()
            }
            Err(e) => {
                info!("Invalid request {} from connection {}: {}", text, id, e);
                self.metrics.ws_interaction("client_message", "err");
                ServerMessage::error(e.to_string())
            }
        };
        Self::send(&sender, &response);
        outcome
    }

    fn apply(&self, state: &mut RegistryState, id: ConnectionId, text: &str) -> Result<(), SubscriptionError> {
        let message: ClientMessage = serde_json::from_str(text)?;

        let mut missing: Vec<FeedId> = Vec::new();
        for feed in &message.ids {
            if !self.store.contains(feed) && !missing.contains(feed) {
                missing.push(*feed);
            }
        }
        if !missing.is_empty() {
            return Err(SubscriptionError::FeedsNotFound(missing));
        }

        match message.kind {
            ClientMessageType::Subscribe => {
                let options = RenderOptions {
                    verbose: message.verbose,
                    binary: message.binary,
                };
                for feed in &message.ids {
                    state
                        .feed_subscribers
                        .entry(*feed)
                        .or_default()
                        .insert(id, options);
                }
                if let Some(connection) = state.connections.get_mut(&id) {
                    connection.feeds.extend(message.ids.iter().copied());
                }
            }
            ClientMessageType::Unsubscribe => {
                for feed in &message.ids {
                    if let Some(subscribers) = state.feed_subscribers.get_mut(feed) {
                        subscribers.remove(&id);
                        if subscribers.is_empty() {
                            state.feed_subscribers.remove(feed);
                        }
                    }
                }
                if let Some(connection) = state.connections.get_mut(&id) {
                    for feed in &message.ids {
                        connection.feeds.remove(feed);
                    }
                }
            }
        }
        Ok(())
    }

    /// Push an update to every subscriber of its feed
    pub fn dispatch(&self, info: &PriceInfo) {
        let state = self.state.read();
        let Some(subscribers) = state.feed_subscribers.get(&info.feed_id()) else {
            debug!("Sending {} price update to no clients", info.feed_id());
            return;
        };

        // at most four renderings per update
        let mut rendered: HashMap<RenderOptions, String> = HashMap::new();
        for (connection_id, options) in subscribers {
            let Some(connection) = state.connections.get(connection_id) else {
                continue;
            };
            let text = rendered.entry(*options).or_insert_with(|| {
                let message = ServerMessage::PriceUpdate {
                    price_feed: info.to_price_feed(*options),
                };
                serde_json::to_string(&message).unwrap_or_default()
            });
            if connection.sender.send(Outbound::Text(text.clone())).is_ok() {
                self.metrics.ws_interaction("server_update", "ok");
            } else {
                self.metrics.ws_interaction("server_update", "err");
            }
        }
        debug!(
            "Sent {} price update to {} clients",
            info.feed_id(),
            subscribers.len()
        );
    }

    /// Ping live connections and evict those that missed the previous ping
    pub fn heartbeat_sweep(&self) -> Vec<ConnectionId> {
        let mut state = self.state.write();

        let mut timed_out = Vec::new();
        for (id, connection) in state.connections.iter_mut() {
            if connection.alive {
                connection.alive = false;
                let _ = connection.sender.send(Outbound::Ping);
            } else {
                timed_out.push(*id);
            }
        }

        for id in &timed_out {
            if let Some(connection) = state.drop_connection(*id) {
                warn!("Connection {} timed out, terminating", id);
                self.metrics.ws_interaction("timeout", "ok");
                let _ = connection.sender.send(Outbound::Close);
            }
        }
        self.metrics.ws_connections.set(state.connections.len() as i64);
        timed_out
    }

    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    /// Feeds a connection currently follows
    pub fn subscriptions(&self, id: ConnectionId) -> HashSet<FeedId> {
        self.state
            .read()
            .connections
            .get(&id)
            .map(|connection| connection.feeds.clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, feed: &FeedId) -> usize {
        self.state
            .read()
            .feed_subscribers
            .get(feed)
            .map_or(0, HashMap::len)
    }

    fn send(sender: &mpsc::UnboundedSender<Outbound>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(text) => {
                let _ = sender.send(Outbound::Text(text));
            }
            Err(e) => warn!("Failed to serialize server message: {}", e),
        }
    }
}

impl PriceObserver for SubscriptionRegistry {
    fn on_price_update(&self, info: &PriceInfo) {
        self.dispatch(info);
    }
}
