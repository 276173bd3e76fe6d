//! The invocation façade: connect, discover, call.
//!
//! [`Client`] is the only surface the orchestration layer consumes. It is
//! cheaply cloneable; all clones share one session and one registry, so a
//! clone can be handed to each task that needs to call tools.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use tether_protocol::types::{
    CallToolResult, CapabilitySet, Implementation, PromptDescriptor, ResourceDescriptor,
    ToolDescriptor,
};
use tether_protocol::{codes, methods};
use tether_transport::Transport;

use crate::config::ServerConfig;
use crate::error::{ClientError, DispatchError, SessionError};
use crate::registry::CapabilityRegistry;
use crate::session::{Session, SessionState};

struct ClientInner {
    session: Arc<Session>,
    registry: CapabilityRegistry,
}

/// Handle to one connected MCP server.
///
/// ```rust,no_run
/// use std::collections::HashMap;
/// use std::time::Duration;
/// use tether_client::{Client, ServerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::tcp("tools.internal:9000")
///     .identity("my-agent", "1.0.0")
///     .request_timeout(Duration::from_secs(5))
///     .build()?;
/// let client = Client::connect(config).await?;
///
/// for tool in client.list_tools().await? {
///     println!("{}: {}", tool.name, tool.description.unwrap_or_default());
/// }
///
/// let mut args = HashMap::new();
/// args.insert("query".to_string(), serde_json::json!("cats"));
/// let result = client.call_tool("search", args).await?;
/// println!("{}", result.text_lossy());
/// # Ok(())
/// # }
/// ```
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Client {
    /// Connect to the configured endpoint and run the handshake, honoring
    /// the config's bounded handshake retries.
    pub async fn connect(config: ServerConfig) -> Result<Self, SessionError> {
        Self::from_session(Session::new(config)).await
    }

    /// Connect over a pre-built transport.
    pub async fn with_transport(
        transport: Arc<dyn Transport>,
        config: ServerConfig,
    ) -> Result<Self, SessionError> {
        Self::from_session(Session::with_transport(transport, config)).await
    }

    /// Connect over a queue of pre-built transports, one per handshake
    /// attempt.
    pub async fn with_transports(
        transports: Vec<Arc<dyn Transport>>,
        config: ServerConfig,
    ) -> Result<Self, SessionError> {
        Self::from_session(Session::with_transports(transports, config)).await
    }

    async fn from_session(session: Session) -> Result<Self, SessionError> {
        let session = Arc::new(session);
        session.connect().await?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                session,
                registry: CapabilityRegistry::new(),
            }),
        })
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Identity the server reported during the handshake.
    pub fn server_info(&self) -> Option<Implementation> {
        self.inner.session.server_info()
    }

    /// Capability families negotiated during the handshake.
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        self.inner.session.capabilities()
    }

    /// Discovered tools, in server order. Cached after the first call.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
        let tools = self.inner.registry.tools(&self.inner.session, false).await?;
        Ok(tools.as_ref().clone())
    }

    /// Re-fetch the tool list, replacing the cache.
    pub async fn refresh_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
        let tools = self.inner.registry.tools(&self.inner.session, true).await?;
        Ok(tools.as_ref().clone())
    }

    /// Discovered prompts, in server order. Cached after the first call.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>, ClientError> {
        let prompts = self.inner.registry.prompts(&self.inner.session, false).await?;
        Ok(prompts.as_ref().clone())
    }

    /// Re-fetch the prompt list, replacing the cache.
    pub async fn refresh_prompts(&self) -> Result<Vec<PromptDescriptor>, ClientError> {
        let prompts = self.inner.registry.prompts(&self.inner.session, true).await?;
        Ok(prompts.as_ref().clone())
    }

    /// Discovered resources, in server order. Cached after the first call.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, ClientError> {
        let resources = self
            .inner
            .registry
            .resources(&self.inner.session, false)
            .await?;
        Ok(resources.as_ref().clone())
    }

    /// Re-fetch the resource list, replacing the cache.
    pub async fn refresh_resources(&self) -> Result<Vec<ResourceDescriptor>, ClientError> {
        let resources = self
            .inner
            .registry
            .resources(&self.inner.session, true)
            .await?;
        Ok(resources.as_ref().clone())
    }

    /// Invoke a tool with the configured per-request timeout.
    ///
    /// A populated registry cache is consulted first: calling a tool the
    /// server never listed fails with `ToolNotFound` without any network
    /// round trip. With no cache yet, the call goes out and the server's
    /// own verdict is surfaced instead.
    ///
    /// A result with `is_error: true` is a tool-domain failure and comes
    /// back as `Ok`: the tool ran and said no. Calls are never retried
    /// here; that policy belongs to the orchestration layer.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<CallToolResult, ClientError> {
        self.call_tool_with_timeout(name, arguments, self.inner.session.request_timeout())
            .await
    }

    /// Invoke a tool with an explicit per-call timeout.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
        timeout: Duration,
    ) -> Result<CallToolResult, ClientError> {
        // Readiness first: a dead session reports NotReady, not a verdict
        // derived from its stale cache.
        let dispatcher = self.inner.session.dispatcher()?;

        if let Some(tools) = self.inner.registry.peek_tools()
            && !tools.iter().any(|tool| tool.name == name)
        {
            debug!(tool = name, "rejected against cached tool list");
            return Err(ClientError::ToolNotFound(name.to_string()));
        }
        let params = json!({ "name": name, "arguments": arguments });
        let outcome = dispatcher
            .dispatch(methods::TOOLS_CALL, Some(params), timeout)
            .await;

        match outcome {
            Ok(value) => serde_json::from_value(value)
                .map_err(|e| ClientError::Malformed(format!("tools/call result: {e}"))),
            Err(DispatchError::Remote { code, message }) => {
                Err(remote_call_error(name, code, message))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Probe server liveness with the configured per-request timeout.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let dispatcher = self.inner.session.dispatcher()?;
        dispatcher
            .dispatch(methods::PING, None, self.inner.session.request_timeout())
            .await?;
        Ok(())
    }

    /// Close the session and drop the cached metadata. Idempotent.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.inner.registry.clear().await;
        self.inner.session.close().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

/// Classify a JSON-RPC error from `tools/call`.
///
/// Servers disagree on how to report an unknown tool: some answer method
/// not found, others invalid params with an "unknown tool" message. Both
/// mean the name, not the arguments, was wrong.
fn remote_call_error(name: &str, code: i32, message: String) -> ClientError {
    match code {
        codes::METHOD_NOT_FOUND => ClientError::ToolNotFound(name.to_string()),
        codes::INVALID_PARAMS => {
            if message.to_ascii_lowercase().contains("unknown tool") {
                ClientError::ToolNotFound(name.to_string())
            } else {
                ClientError::InvalidArguments(message)
            }
        }
        _ => ClientError::Remote { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_variants_map_to_not_found() {
        assert!(matches!(
            remote_call_error("x", codes::METHOD_NOT_FOUND, "Method not found".into()),
            ClientError::ToolNotFound(_)
        ));
        assert!(matches!(
            remote_call_error("x", codes::INVALID_PARAMS, "Unknown tool: x".into()),
            ClientError::ToolNotFound(_)
        ));
        assert!(matches!(
            remote_call_error("x", codes::INVALID_PARAMS, "query must be a string".into()),
            ClientError::InvalidArguments(_)
        ));
        assert!(matches!(
            remote_call_error("x", -32000, "backend unavailable".into()),
            ClientError::Remote { code: -32000, .. }
        ));
    }
}
