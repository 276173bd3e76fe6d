//! Client error taxonomy.
//!
//! Three layers, escalating outward:
//!
//! - [`DispatchError`]: the fate of one correlated request.
//! - [`SessionError`]: lifecycle and handshake failures.
//! - [`ClientError`]: what the façade hands to callers.
//!
//! A tool that *ran* but reported failure is not an error at any of these
//! layers; it comes back as [`CallToolResult::is_error`] data.
//!
//! [`CallToolResult::is_error`]: tether_protocol::CallToolResult

use std::time::Duration;
use thiserror::Error;

use crate::session::SessionState;
use tether_transport::TransportError;

/// How a single dispatched request can fail.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum DispatchError {
    /// No response arrived before the per-request deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request was cancelled by its caller.
    #[error("Request cancelled")]
    Cancelled,

    /// The owning session left `Ready`; every outstanding request is
    /// resolved with this, none is left pending.
    #[error("Session closed")]
    SessionClosed,

    /// A payload could not be serialized or deserialized.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// The server answered with a JSON-RPC error object.
    #[error("Server error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i32,
        /// Server-provided message.
        message: String,
    },
}

/// Session lifecycle and handshake failures.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum SessionError {
    /// The server did not acknowledge the initialize handshake in time.
    #[error("Initialize handshake timed out after {0:?}")]
    InitTimeout(Duration),

    /// An operation requires a `Ready` session.
    #[error("Session is not ready (state: {state})")]
    NotReady {
        /// The state the session was actually in.
        state: SessionState,
    },

    /// The server refused the initialize handshake.
    #[error("Server rejected handshake: {0}")]
    HandshakeRejected(String),

    /// The underlying transport failed.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The session was closed while the operation was in flight.
    #[error("Session closed")]
    Closed,

    /// The configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors surfaced by the invocation façade.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ClientError {
    /// The named tool is not offered by the server.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The server rejected the call arguments.
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// The server answered with a JSON-RPC error object.
    #[error("Server error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i32,
        /// Server-provided message.
        message: String,
    },

    /// No response arrived before the per-call deadline.
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// The session left `Ready` while the call was in flight.
    #[error("Session closed")]
    SessionClosed,

    /// The call was cancelled by its caller.
    #[error("Call cancelled")]
    Cancelled,

    /// The server sent a payload this client could not decode.
    #[error("Malformed server payload: {0}")]
    Malformed(String),

    /// No server is registered under the given name.
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    /// A session-level failure.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<DispatchError> for ClientError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Timeout(t) => Self::Timeout(t),
            DispatchError::Cancelled => Self::Cancelled,
            DispatchError::SessionClosed => Self::SessionClosed,
            DispatchError::Malformed(m) => Self::Malformed(m),
            DispatchError::Remote { code, message } => Self::Remote { code, message },
        }
    }
}
