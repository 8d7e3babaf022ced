//! Error types for the client layer.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the transport and orchestration layers.
///
/// Transport failures are deliberately absent: socket errors drive the
/// per-relay backoff state and surface through connection-state callbacks,
/// never through return values.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol data error (bad URL, malformed event, ...).
    #[error("protocol error: {0}")]
    Protocol(#[from] larimar_core::Error),

    /// The external signer collaborator failed.
    #[error("signer error: {0}")]
    Signer(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
