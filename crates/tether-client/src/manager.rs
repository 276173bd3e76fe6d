//! Multi-server management.
//!
//! [`ClientManager`] owns a set of named server configs and the clients
//! connected to them. Tool names are qualified as `server/tool` when
//! flattened across servers, and calls are routed back by that prefix.
//!
//! A failed session is never resurrected in place: `reconnect` (and a
//! `connect` that finds its client dead) builds a fresh client with a
//! fresh transport; requests pending on the old one were already resolved
//! with `SessionClosed` when it died.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tether_protocol::types::{CallToolResult, ToolDescriptor};

use crate::client::Client;
use crate::config::ServerConfig;
use crate::error::ClientError;
use crate::session::SessionState;

/// An `mcpServers`-style configuration document.
///
/// ```json
/// {
///   "mcpServers": {
///     "search": { "endpoint": "tcp://tools.internal:9000", "requestTimeoutSecs": 5 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ServersDocument {
    /// Server configs keyed by name.
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, ServerConfig>,
}

struct ManagedServer {
    config: Option<ServerConfig>,
    client: Option<Client>,
}

/// A registry of named MCP servers and their live clients.
#[derive(Default)]
pub struct ClientManager {
    servers: Mutex<HashMap<String, ManagedServer>>,
}

impl ClientManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager from a parsed configuration document.
    pub fn from_config(doc: ServersDocument) -> Self {
        let servers = doc
            .mcp_servers
            .into_iter()
            .map(|(name, config)| {
                (
                    name,
                    ManagedServer {
                        config: Some(config),
                        client: None,
                    },
                )
            })
            .collect();
        Self {
            servers: Mutex::new(servers),
        }
    }

    /// Register a server config. Connection happens lazily.
    pub async fn add_server(&self, name: impl Into<String>, config: ServerConfig) {
        let name = name.into();
        debug!(server = %name, "server registered");
        self.servers.lock().await.insert(
            name,
            ManagedServer {
                config: Some(config),
                client: None,
            },
        );
    }

    /// Register an already connected client, e.g. one built over an
    /// in-process transport. Such a server cannot be reconnected by the
    /// manager once its session dies.
    pub async fn insert(&self, name: impl Into<String>, client: Client) {
        self.servers.lock().await.insert(
            name.into(),
            ManagedServer {
                config: None,
                client: Some(client),
            },
        );
    }

    /// Names of all registered servers.
    pub async fn server_names(&self) -> Vec<String> {
        self.servers.lock().await.keys().cloned().collect()
    }

    /// Session state of one server's client, if any exists yet.
    pub async fn state(&self, name: &str) -> Option<SessionState> {
        self.servers
            .lock()
            .await
            .get(name)
            .and_then(|s| s.client.as_ref().map(Client::state))
    }

    /// Get a ready client for `name`, connecting or reconnecting as
    /// needed.
    pub async fn connect(&self, name: &str) -> Result<Client, ClientError> {
        let config = {
            let servers = self.servers.lock().await;
            let server = servers
                .get(name)
                .ok_or_else(|| ClientError::UnknownServer(name.to_string()))?;
            if let Some(client) = &server.client
                && client.state() == SessionState::Ready
            {
                return Ok(client.clone());
            }
            // An inserted client has no config to rebuild from; once its
            // session dies it stays dead.
            server.config.clone().ok_or(ClientError::SessionClosed)?
        };

        let client = Client::connect(config).await?;
        info!(server = %name, "connected");

        let mut servers = self.servers.lock().await;
        match servers.get_mut(name) {
            Some(server) => {
                // A racing connect may have installed a ready client first;
                // keep theirs and retire ours.
                if let Some(existing) = &server.client
                    && existing.state() == SessionState::Ready
                {
                    let existing = existing.clone();
                    drop(servers);
                    let _ = client.close().await;
                    return Ok(existing);
                }
                server.client = Some(client.clone());
                Ok(client)
            }
            // Removed concurrently; hand the caller the client anyway.
            None => Ok(client),
        }
    }

    /// Connect every registered server, reporting per-server outcomes.
    pub async fn connect_all(&self) -> HashMap<String, Result<(), ClientError>> {
        let names = self.server_names().await;
        let mut outcomes = HashMap::new();
        for name in names {
            let outcome = self.connect(&name).await.map(|_| ());
            if let Err(e) = &outcome {
                warn!(server = %name, error = %e, "warmup connect failed");
            }
            outcomes.insert(name, outcome);
        }
        outcomes
    }

    /// Tear down a server's client and build a fresh one from its config.
    pub async fn reconnect(&self, name: &str) -> Result<Client, ClientError> {
        let old = {
            let mut servers = self.servers.lock().await;
            let server = servers
                .get_mut(name)
                .ok_or_else(|| ClientError::UnknownServer(name.to_string()))?;
            server.client.take()
        };
        if let Some(old) = old {
            let _ = old.close().await;
        }
        self.connect(name).await
    }

    /// Every connected server's tools, flattened with `server/tool`
    /// qualified names. Servers that are not Ready are skipped.
    pub async fn list_all_tools(&self) -> Vec<ToolDescriptor> {
        let clients: Vec<(String, Client)> = {
            self.servers
                .lock()
                .await
                .iter()
                .filter_map(|(name, s)| s.client.clone().map(|c| (name.clone(), c)))
                .collect()
        };

        let mut all = Vec::new();
        for (name, client) in clients {
            match client.list_tools().await {
                Ok(tools) => {
                    all.extend(tools.into_iter().map(|mut tool| {
                        tool.name = format!("{name}/{}", tool.name);
                        tool
                    }));
                }
                Err(e) => warn!(server = %name, error = %e, "tool listing skipped"),
            }
        }
        all
    }

    /// Call a tool by its `server/tool` qualified name.
    pub async fn call_tool(
        &self,
        qualified: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<CallToolResult, ClientError> {
        let (server, tool) = qualified
            .split_once('/')
            .ok_or_else(|| ClientError::ToolNotFound(qualified.to_string()))?;
        let client = self.connect(server).await?;
        client.call_tool(tool, arguments).await
    }

    /// Ping every connected server; `true` means it answered in time.
    pub async fn ping_all(&self) -> HashMap<String, bool> {
        let clients: Vec<(String, Client)> = {
            self.servers
                .lock()
                .await
                .iter()
                .filter_map(|(name, s)| s.client.clone().map(|c| (name.clone(), c)))
                .collect()
        };

        let mut alive = HashMap::new();
        for (name, client) in clients {
            let ok = client.ping().await.is_ok();
            if !ok {
                warn!(server = %name, "ping failed");
            }
            alive.insert(name, ok);
        }
        alive
    }

    /// Close every client. Idempotent.
    pub async fn close_all(&self) {
        let clients: Vec<Client> = {
            self.servers
                .lock()
                .await
                .values_mut()
                .filter_map(|s| s.client.take())
                .collect()
        };
        for client in clients {
            let _ = client.close().await;
        }
        info!("all sessions closed");
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager").finish_non_exhaustive()
    }
}
