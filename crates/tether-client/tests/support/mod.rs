//! Scripted in-process MCP server speaking JSON-RPC over a duplex pair.
#![allow(dead_code)]

use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_client::{Client, ServerConfig};
use tether_transport::{DuplexTransport, Transport};

/// What the scripted server does with one request.
pub enum Reply {
    /// Answer immediately with this result.
    Result(Value),
    /// Answer immediately with a JSON-RPC error.
    Error { code: i32, message: String },
    /// Answer with this result after a delay, without blocking other
    /// requests. This is how tests produce out-of-order responses.
    Delayed(Duration, Value),
    /// Never answer.
    Silent,
}

/// Handle onto a running scripted server.
pub struct ServerHarness {
    /// Methods of every *request* received, in arrival order.
    /// Notifications are not recorded here.
    pub requests: Arc<Mutex<Vec<String>>>,
    transport: Arc<DuplexTransport>,
}

impl ServerHarness {
    pub fn count_of(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    /// Drop the server's end of the channel, as a crashed server would.
    pub async fn hangup(&self) {
        let _ = self.transport.disconnect().await;
    }
}

async fn send_frame(server: &DuplexTransport, frame: Value) {
    let _ = server.send(Bytes::from(frame.to_string())).await;
}

/// Opt-in log output while debugging a test: `TETHER_LOG=debug cargo test`.
fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TETHER_LOG"))
        .try_init();
}

/// Drive a scripted server on the given transport side.
pub fn run_server<F>(server: DuplexTransport, mut respond: F) -> ServerHarness
where
    F: FnMut(&str, Option<&Value>) -> Reply + Send + 'static,
{
    trace_init();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    let server = Arc::new(server);
    let transport = Arc::clone(&server);

    tokio::spawn(async move {
        while let Some(Ok(bytes)) = server.receive().await {
            let Ok(frame) = serde_json::from_slice::<Value>(&bytes) else {
                continue;
            };
            let method = frame["method"].as_str().unwrap_or_default().to_string();
            let Some(id) = frame.get("id").cloned() else {
                // Notification; nothing to answer.
                continue;
            };
            log.lock().unwrap().push(method.clone());

            match respond(&method, frame.get("params")) {
                Reply::Result(result) => {
                    send_frame(&server, json!({"jsonrpc": "2.0", "id": id, "result": result}))
                        .await;
                }
                Reply::Error { code, message } => {
                    send_frame(
                        &server,
                        json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {"code": code, "message": message}
                        }),
                    )
                    .await;
                }
                Reply::Delayed(delay, result) => {
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        send_frame(&server, json!({"jsonrpc": "2.0", "id": id, "result": result}))
                            .await;
                    });
                }
                Reply::Silent => {}
            }
        }
    });

    ServerHarness {
        requests,
        transport,
    }
}

/// A well-formed initialize result.
pub fn init_result() -> Value {
    json!({
        "protocolVersion": "2025-06-18",
        "serverInfo": {"name": "scripted-server", "version": "1.0.0"},
        "capabilities": {"tools": {}, "prompts": {}, "resources": {}}
    })
}

/// One search tool, the shape a web-search server would list.
pub fn search_tools() -> Value {
    json!({
        "tools": [{
            "name": "search",
            "description": "Web search",
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}}
            }
        }]
    })
}

/// The standard happy-path script.
pub fn standard_reply(method: &str, _params: Option<&Value>) -> Reply {
    match method {
        "initialize" => Reply::Result(init_result()),
        "ping" => Reply::Result(json!({})),
        "tools/list" => Reply::Result(search_tools()),
        "prompts/list" => Reply::Result(json!({"prompts": []})),
        "resources/list" => Reply::Result(json!({"resources": []})),
        "tools/call" => Reply::Result(json!({
            "content": [{"type": "text", "text": "3 results..."}],
            "isError": false
        })),
        _ => Reply::Error {
            code: -32601,
            message: "Method not found".into(),
        },
    }
}

/// Config for provided-transport sessions; the endpoint is never dialed.
pub fn test_config() -> ServerConfig {
    ServerConfig::tcp("127.0.0.1:1")
        .request_timeout(Duration::from_secs(2))
        .connect_timeout(Duration::from_millis(500))
        .build()
        .unwrap()
}

/// A connected client against a scripted server.
pub async fn connected_client<F>(respond: F) -> (Client, ServerHarness)
where
    F: FnMut(&str, Option<&Value>) -> Reply + Send + 'static,
{
    let (client_side, server_side) = DuplexTransport::pair();
    let harness = run_server(server_side, respond);
    let client = Client::with_transport(Arc::new(client_side), test_config())
        .await
        .expect("handshake against scripted server");
    (client, harness)
}
