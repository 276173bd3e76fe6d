//! # Tether Client
//!
//! An MCP (Model Context Protocol) client: opens a session to a remote
//! tool-providing server, negotiates capabilities, discovers callable
//! tools/prompts/resources, and invokes tools over a streaming transport.
//!
//! ## Architecture
//!
//! ```text
//! Client (façade)
//!   ├── Session ── state machine + initialize handshake
//!   │     └── RequestDispatcher ── id-correlated requests, one reader task
//!   │           └── Transport ── duplex frame channel (tether-transport)
//!   └── CapabilityRegistry ── cached, single-flight discovery listings
//! ```
//!
//! One background task per session drains the transport and fans inbound
//! frames out to waiting calls by request id; everything else suspends
//! only its own caller. Per-request timeouts are independent: a slow tool
//! call never delays an unrelated one.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::time::Duration;
//! use tether_client::{Client, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::tcp("tools.internal:9000")
//!     .request_timeout(Duration::from_secs(5))
//!     .build()?;
//! let client = Client::connect(config).await?;
//!
//! let tools = client.list_tools().await?;
//! let mut args = HashMap::new();
//! args.insert("query".into(), serde_json::json!("cats"));
//! let result = client.call_tool("search", args).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod dispatcher;
mod error;
mod manager;
mod registry;
mod session;

pub use client::Client;
pub use config::{DEFAULT_CONNECT_TIMEOUT, ServerConfig, ServerConfigBuilder};
pub use error::{ClientError, DispatchError, SessionError};
pub use manager::{ClientManager, ServersDocument};
pub use session::{Session, SessionState};

pub use tether_protocol::types::{
    CallToolResult, CapabilitySet, ContentBlock, Implementation, PromptDescriptor,
    ResourceDescriptor, ToolDescriptor,
};
pub use tether_transport::{Endpoint, Transport, TransportError};
