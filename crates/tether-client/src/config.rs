//! Per-server client configuration.
//!
//! `request_timeout` has no default on purpose: the integrator decides how
//! long a tool call may run. Everything else carries a sensible default and
//! can also be supplied from a serialized `mcpServers`-style document (see
//! [`crate::manager::ServersDocument`]).

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use std::time::Duration;

use tether_protocol::{ClientCapabilities, Implementation};
use tether_transport::Endpoint;

use crate::error::SessionError;

/// Default timeout for transport connect plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_RETRY_BACKOFF_CAP: Duration = Duration::from_secs(30);

fn default_identity() -> Implementation {
    Implementation::new("tether", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_retry_backoff() -> Duration {
    DEFAULT_RETRY_BACKOFF
}

fn default_retry_backoff_cap() -> Duration {
    DEFAULT_RETRY_BACKOFF_CAP
}

/// Everything needed to reach and talk to one MCP server.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Where the server lives.
    pub endpoint: Endpoint,

    /// Identity announced in the initialize handshake.
    #[serde(rename = "clientInfo", default = "default_identity")]
    pub identity: Implementation,

    /// Deadline for each individual request. Required; there is no default.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "requestTimeoutSecs")]
    pub request_timeout: Duration,

    /// Deadline for transport connect plus handshake, per attempt.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "connectTimeoutSecs", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Additional handshake attempts after the first one fails. Applies to
    /// connection establishment only; tool calls are never retried.
    #[serde(rename = "handshakeRetries", default)]
    pub handshake_retries: u32,

    /// Base delay between handshake attempts, doubled per attempt.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "retryBackoffMs", default = "default_retry_backoff")]
    pub retry_backoff: Duration,

    /// Upper bound on the backoff delay.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "retryBackoffCapSecs", default = "default_retry_backoff_cap")]
    pub retry_backoff_cap: Duration,

    /// Capability families to request during the handshake.
    #[serde(default = "ClientCapabilities::full")]
    pub capabilities: ClientCapabilities,
}

impl ServerConfig {
    /// Start building a config for the given endpoint.
    pub fn builder(endpoint: Endpoint) -> ServerConfigBuilder {
        ServerConfigBuilder::new(endpoint)
    }

    /// Convenience for a plain TCP endpoint.
    pub fn tcp(addr: impl Into<String>) -> ServerConfigBuilder {
        ServerConfigBuilder::new(Endpoint::Tcp(addr.into()))
    }

    /// Backoff before retry `attempt` (1-based): base doubled per attempt,
    /// capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << exp)
            .min(self.retry_backoff_cap)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    endpoint: Endpoint,
    identity: Implementation,
    request_timeout: Option<Duration>,
    connect_timeout: Duration,
    handshake_retries: u32,
    retry_backoff: Duration,
    retry_backoff_cap: Duration,
    capabilities: ClientCapabilities,
}

impl ServerConfigBuilder {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            identity: default_identity(),
            request_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_retries: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            retry_backoff_cap: DEFAULT_RETRY_BACKOFF_CAP,
            capabilities: ClientCapabilities::full(),
        }
    }

    /// Set the identity announced during the handshake.
    #[must_use]
    pub fn identity(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.identity = Implementation::new(name, version);
        self
    }

    /// Set the per-request deadline. Mandatory.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the per-attempt connect deadline.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Allow extra handshake attempts with the given backoff base.
    #[must_use]
    pub fn handshake_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.handshake_retries = retries;
        self.retry_backoff = backoff;
        self
    }

    /// Cap the retry backoff.
    #[must_use]
    pub fn retry_backoff_cap(mut self, cap: Duration) -> Self {
        self.retry_backoff_cap = cap;
        self
    }

    /// Override the requested capability families.
    #[must_use]
    pub fn capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Finish the config. Fails if `request_timeout` was never set.
    pub fn build(self) -> Result<ServerConfig, SessionError> {
        let request_timeout = self.request_timeout.ok_or_else(|| {
            SessionError::Config("request_timeout must be configured explicitly".into())
        })?;
        Ok(ServerConfig {
            endpoint: self.endpoint,
            identity: self.identity,
            request_timeout,
            connect_timeout: self.connect_timeout,
            handshake_retries: self.handshake_retries,
            retry_backoff: self.retry_backoff,
            retry_backoff_cap: self.retry_backoff_cap,
            capabilities: self.capabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timeout_is_mandatory() {
        let err = ServerConfig::tcp("127.0.0.1:9000").build().unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn builder_defaults() {
        let config = ServerConfig::tcp("127.0.0.1:9000")
            .request_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.handshake_retries, 0);
        assert_eq!(config.identity.name, "tether");
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let config = ServerConfig::tcp("127.0.0.1:9000")
            .request_timeout(Duration::from_secs(5))
            .handshake_retries(8, Duration::from_millis(100))
            .retry_backoff_cap(Duration::from_millis(350))
            .build()
            .unwrap();
        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(350));
        assert_eq!(config.retry_delay(8), Duration::from_millis(350));
    }

    #[test]
    fn deserializes_from_json() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "endpoint": "tcp://tools.internal:9000",
                "requestTimeoutSecs": 5,
                "handshakeRetries": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.handshake_retries, 2);
        assert_eq!(config.endpoint.to_string(), "tcp://tools.internal:9000");
    }
}
