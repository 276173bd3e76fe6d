//! Server endpoint addressing.

use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use crate::error::TransportError;
use crate::tcp::TcpTransport;
use crate::traits::Transport;
use crate::websocket::WebSocketTransport;

/// Where a server lives and which transport reaches it.
///
/// Parsed from a string: `tcp://host:port` (or bare `host:port`) selects
/// the TCP transport, `ws://...` / `wss://...` the WebSocket transport.
/// TLS is expressed through the `wss` scheme; certificate roots come from
/// the native store via rustls.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum Endpoint {
    /// Newline-delimited JSON over TCP, addressed as `host:port`.
    Tcp(String),
    /// Text frames over a WebSocket, plaintext or TLS.
    Ws(Url),
}

impl Endpoint {
    /// Construct a fresh, unconnected transport for this endpoint.
    pub fn transport(&self) -> Arc<dyn Transport> {
        match self {
            Self::Tcp(addr) => Arc::new(TcpTransport::new(addr.clone())),
            Self::Ws(url) => Arc::new(WebSocketTransport::new(url.clone())),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            return parse_tcp(addr);
        }
        if s.starts_with("ws://") || s.starts_with("wss://") {
            let url = Url::parse(s).map_err(|e| {
                TransportError::InvalidEndpoint(format!("bad WebSocket URL '{s}': {e}"))
            })?;
            return Ok(Self::Ws(url));
        }
        // Scheme-less strings are treated as TCP host:port.
        parse_tcp(s)
    }
}

fn parse_tcp(addr: &str) -> Result<Endpoint, TransportError> {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(Endpoint::Tcp(addr.to_string()))
        }
        _ => Err(TransportError::InvalidEndpoint(format!(
            "expected host:port, got '{addr}'"
        ))),
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Ws(url) => write!(f, "{url}"),
        }
    }
}
