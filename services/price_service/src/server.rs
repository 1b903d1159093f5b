//! WebSocket distribution server
//!
//! Serves `/ws` next to the REST routes on one port. Each connection gets an
//! outbound channel from the [`SubscriptionRegistry`]; a select loop moves
//! frames between that channel and the socket.

use crate::distribution::{ConnectionId, Outbound, SubscriptionRegistry};
use crate::error::{PriceServiceError, Result};
use crate::rest::{self, RestApi};
use config::DistributionConfig;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};
use warp::reply::Response;
use warp::ws::{Message, WebSocket, Ws};
use warp::{Filter, Reply};

pub struct DistributionServer {
    config: DistributionConfig,
    registry: Arc<SubscriptionRegistry>,
    rest: Arc<RestApi>,
}

impl DistributionServer {
    pub fn new(config: DistributionConfig, registry: Arc<SubscriptionRegistry>, rest: Arc<RestApi>) -> Self {
        Self {
            config,
            registry,
            rest,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// WebSocket route combined with the REST routes
    pub fn routes(&self) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
        let registry = self.registry.clone();
        let max_payload = self.config.max_payload_bytes;

        let ws_route = warp::path!("ws")
            .and(warp::ws())
            .map(move |ws: Ws| {
                let registry = registry.clone();
                ws.max_message_size(max_payload)
                    .on_upgrade(move |socket| Self::handle_connection(registry, socket))
                    .into_response()
            });

        ws_route.or(rest::routes(self.rest.clone())).unify()
    }

    /// Bind the listening socket and serve in the background
    pub fn start(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| PriceServiceError::BindAddress {
                message: format!("{}:{}: {}", self.config.bind_address, self.config.port, e),
            })?;

        let (bound, server) = warp::serve(self.routes())
            .try_bind_ephemeral(addr)
            .map_err(|e| PriceServiceError::BindAddress {
                message: format!("{}: {}", addr, e),
            })?;
        info!("Distribution server listening on {}", bound);

        Ok((bound, tokio::spawn(server)))
    }

    /// Ping every connection each heartbeat interval, evicting the silent ones
    pub fn start_heartbeat_task(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let every = self.config.heartbeat_interval();

        tokio::spawn(async move {
            let mut interval = interval(every);
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = registry.heartbeat_sweep();
                debug!(
                    "Heartbeat: {} connections, {} evicted",
                    registry.connection_count(),
                    evicted.len()
                );
            }
        })
    }

    async fn handle_connection(registry: Arc<SubscriptionRegistry>, ws: WebSocket) {
        let (id, mut rx) = registry.register_connection();
        let (mut ws_sender, mut ws_receiver) = ws.split();

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    let message = match outbound {
                        Some(Outbound::Text(text)) => Message::text(text),
                        Some(Outbound::Ping) => Message::ping(Vec::new()),
                        Some(Outbound::Close) => {
                            let _ = ws_sender.send(Message::close()).await;
                            break;
                        }
                        None => break,
                    };
                    if let Err(e) = ws_sender.send(message).await {
                        warn!("Failed to send to connection {}: {}", id, e);
                        break;
                    }
                }

                inbound = ws_receiver.next() => {
                    match inbound {
                        Some(Ok(message)) => {
                            if !Self::handle_inbound(&registry, id, message) {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error for connection {}: {}", id, e);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        registry.remove_connection(id);
    }

    /// Returns false once the peer closed
    fn handle_inbound(registry: &SubscriptionRegistry, id: ConnectionId, message: Message) -> bool {
        if message.is_close() {
            return false;
        }
        if message.is_pong() {
            registry.record_pong(id);
        } else if let Ok(text) = message.to_str() {
            // error responses are queued by the registry
            let _ = registry.handle_client_message(id, text);
        } else if message.is_binary() {
            let text = String::from_utf8_lossy(message.as_bytes()).into_owned();
            let _ = registry.handle_client_message(id, &text);
        }
        true
    }
}
