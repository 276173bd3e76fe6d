//! The core transport trait.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::error::TransportResult;

/// One physical duplex channel to a server endpoint.
///
/// Implementations are driven through shared references: `send` may be
/// called concurrently from many tasks, while `receive` has exactly one
/// consumer of control flow per session (the dispatcher's reader task).
///
/// The receive sequence is finite and not restartable. Once it ends - the
/// peer closed, or a read failed - the transport is spent; a new connection
/// means a new transport instance.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Human-readable endpoint identifier, for logging.
    fn endpoint(&self) -> String;

    /// Open the channel. Fails with `ConnectFailed`, `Tls`, or `Timeout`.
    async fn connect(&self) -> TransportResult<()>;

    /// Close the channel. Idempotent; pending reads end after this.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Write one frame. Fails with `WriteFailed` or `Closed` once the
    /// channel is down.
    async fn send(&self, frame: Bytes) -> TransportResult<()>;

    /// Pull the next inbound frame.
    ///
    /// `None` means the channel closed and no further frames will arrive.
    /// `Some(Err(_))` reports a read failure; the sequence ends after it.
    async fn receive(&self) -> Option<TransportResult<Bytes>>;
}
