//! Transport error types.

use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors surfaced by a transport. None of these are retried at this layer.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// TLS negotiation with the remote endpoint failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection establishment did not complete in time.
    #[error("Connect timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Failed to write a frame; the channel is no longer usable.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Failed to read a frame; the receive sequence ends after this.
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// The channel is closed. A closed transport is never reconnected;
    /// callers construct a fresh one instead.
    #[error("Transport closed")]
    Closed,

    /// The endpoint could not be parsed or is not supported.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
