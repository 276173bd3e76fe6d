//! # Tether Transport
//!
//! Duplex streaming transports for the tether MCP client.
//!
//! A [`Transport`] owns one physical channel to a server endpoint and moves
//! opaque frames in both directions. It carries no protocol knowledge and no
//! retry logic; raw failures surface upward, and a closed transport is
//! discarded and replaced by a fresh `connect` at the session layer.
//!
//! Three implementations:
//!
//! - [`TcpTransport`]: newline-delimited JSON frames over a TCP stream
//! - [`WebSocketTransport`]: text frames over `ws://` or `wss://` (rustls)
//! - [`DuplexTransport`]: an in-memory pair, for tests and embedding

pub mod duplex;
mod endpoint;
mod error;
mod tcp;
mod traits;
mod websocket;

pub use duplex::DuplexTransport;
pub use endpoint::Endpoint;
pub use error::{TransportError, TransportResult};
pub use tcp::TcpTransport;
pub use traits::Transport;
pub use websocket::WebSocketTransport;

pub use bytes::Bytes;
