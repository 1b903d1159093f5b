//! Upstream gossip sources
//!
//! A [`GossipSource`] opens one subscription to the gossip network and hands
//! back a stream of raw signed messages. The stream ends when the upstream
//! closes and yields an error when the connection fails; reconnecting is the
//! [`StreamDriver`](crate::StreamDriver)'s job, not the source's.

use crate::error::{NetworkError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

pub type MessageStream = BoxStream<'static, Result<Bytes>>;

#[async_trait]
pub trait GossipSource: Send + Sync {
    /// Open a new subscription
    async fn subscribe(&self) -> Result<MessageStream>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// Gossip source reading binary frames from a WebSocket endpoint
#[derive(Debug, Clone)]
pub struct WebSocketGossipSource {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketGossipSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl GossipSource for WebSocketGossipSource {
    async fn subscribe(&self) -> Result<MessageStream> {
        let (ws_stream, response) = match timeout(self.connect_timeout, connect_async(&self.url)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => return Err(NetworkError::connection(&self.url, e.to_string())),
            Err(_) => {
                return Err(NetworkError::Timeout {
                    endpoint: self.url.clone(),
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                })
            }
        };
        tracing::debug!("Gossip endpoint {} answered {:?}", self.url, response.status());

        // Pings are answered by tungstenite while reading; only payload frames
        // are surfaced. A close frame ends the stream.
        let messages = ws_stream
            .take_while(|frame| futures::future::ready(!matches!(frame, Ok(Message::Close(_)))))
            .filter_map(|frame| async move {
                match frame {
                    Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                    Ok(Message::Text(text)) => Some(Ok(Bytes::from(text.into_bytes()))),
                    Ok(_) => None,
                    Err(e) => Some(Err(NetworkError::from(e))),
                }
            });
        Ok(messages.boxed())
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

type Feed = mpsc::UnboundedSender<Result<Bytes>>;

/// In-process gossip source fed through a [`ChannelGossipHandle`]
///
/// Each `subscribe` opens a fresh channel; the handle always writes to the
/// most recent one. Dropping the current channel looks like an upstream
/// close to the subscriber.
#[derive(Debug)]
pub struct ChannelGossipSource {
    current: Arc<Mutex<Option<Feed>>>,
}

#[derive(Debug, Clone)]
pub struct ChannelGossipHandle {
    current: Arc<Mutex<Option<Feed>>>,
}

impl ChannelGossipSource {
    pub fn new() -> (Self, ChannelGossipHandle) {
        let current = Arc::new(Mutex::new(None));
        (
            Self {
                current: current.clone(),
            },
            ChannelGossipHandle { current },
        )
    }
}

#[async_trait]
impl GossipSource for ChannelGossipSource {
    async fn subscribe(&self) -> Result<MessageStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock() = Some(tx);
        let messages = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(messages.boxed())
    }

    fn endpoint(&self) -> String {
        "channel".to_string()
    }
}

impl ChannelGossipHandle {
    /// Deliver a message; false when nobody is subscribed
    pub fn send(&self, raw: impl Into<Bytes>) -> bool {
        match self.current.lock().as_ref() {
            Some(tx) => tx.send(Ok(raw.into())).is_ok(),
            None => false,
        }
    }

    /// Fail the current subscription with a stream error
    pub fn fail(&self, message: &str) -> bool {
        match self.current.lock().take() {
            Some(tx) => tx.send(Err(NetworkError::stream(message))).is_ok(),
            None => false,
        }
    }

    /// Close the current subscription
    pub fn close(&self) {
        self.current.lock().take();
    }

    pub fn is_subscribed(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_delivers_and_closes() {
        let (source, handle) = ChannelGossipSource::new();
        assert!(!handle.send(Bytes::from_static(b"early")));

        let mut stream = source.subscribe().await.unwrap();
        assert!(handle.is_subscribed());
        assert!(handle.send(Bytes::from_static(b"one")));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"one"));

        handle.close();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_source_failure() {
        let (source, handle) = ChannelGossipSource::new();
        let mut stream = source.subscribe().await.unwrap();
        assert!(handle.fail("boom"));
        assert!(matches!(
            stream.next().await,
            Some(Err(NetworkError::Stream { .. }))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_websocket_connect_failure() {
        let source = WebSocketGossipSource::new("ws://127.0.0.1:1")
            .with_connect_timeout(Duration::from_secs(2));
        assert!(source.subscribe().await.is_err());
    }
}
