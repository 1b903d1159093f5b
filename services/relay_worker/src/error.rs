//! Error types for the relay worker

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayWorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Adapter error: {0}")]
    Adapter(#[from] crate::adapter::AdapterError),

    #[error("Invalid bind address: {message}")]
    BindAddress { message: String },
}

pub type Result<T> = std::result::Result<T, RelayWorkerError>;
