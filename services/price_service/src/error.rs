//! Error types for the price service

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceServiceError {
    #[error("Codec error: {0}")]
    Codec(#[from] codec::CodecError),

    #[error("Network error: {0}")]
    Network(#[from] network::NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bind address: {message}")]
    BindAddress { message: String },
}

pub type Result<T> = std::result::Result<T, PriceServiceError>;
