//! Error types for the protocol data model.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing or validating protocol data.
#[derive(Error, Debug)]
pub enum Error {
    /// A relay URL failed normalization.
    #[error("invalid relay URL: {0}")]
    InvalidRelayUrl(String),

    /// An event failed structural or identity validation.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// An inbound wire frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An address tag value could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
