//! Network Error Types
//!
//! Failures talking to the upstream gossip network. All of them are
//! recoverable: the stream driver logs them and reconnects.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    /// Could not establish the upstream connection
    #[error("Connection error: {message} (endpoint: {endpoint})")]
    Connection { endpoint: String, message: String },

    /// Connection attempt exceeded its deadline
    #[error("Connection to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// An established stream failed mid-flight
    #[error("Stream error: {message}")]
    Stream { message: String },

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl NetworkError {
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
