//! The whole stack over a real TCP connection: endpoint config, framing,
//! handshake, discovery, invocation.

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LinesCodec};

use tether_client::{Client, ServerConfig, SessionState};

/// A minimal line-framed MCP server on a loopback socket.
async fn spawn_tcp_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, LinesCodec::new());
        while let Some(Ok(line)) = framed.next().await {
            let frame: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = frame.get("id").cloned() else {
                continue;
            };
            let result = match frame["method"].as_str().unwrap_or_default() {
                "initialize" => json!({
                    "protocolVersion": "2025-06-18",
                    "serverInfo": {"name": "tcp-tools", "version": "2.3.1"},
                    "capabilities": {"tools": {}}
                }),
                "tools/list" => json!({
                    "tools": [{
                        "name": "search",
                        "description": "Web search",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"query": {"type": "string"}}
                        }
                    }]
                }),
                "tools/call" => {
                    let query = frame["params"]["arguments"]["query"]
                        .as_str()
                        .unwrap_or_default();
                    json!({
                        "content": [{"type": "text", "text": format!("3 results for {query}...")}],
                        "isError": false
                    })
                }
                _ => json!({}),
            };
            let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
            if framed.send(reply.to_string()).await.is_err() {
                break;
            }
        }
    });

    addr
}

#[tokio::test]
async fn full_session_over_tcp() {
    let addr = spawn_tcp_server().await;

    let config = ServerConfig::tcp(addr.to_string())
        .identity("e2e-suite", "0.1.0")
        .request_timeout(Duration::from_secs(2))
        .connect_timeout(Duration::from_secs(3))
        .build()
        .unwrap();
    let client = Client::connect(config).await.unwrap();

    assert_eq!(client.state(), SessionState::Ready);
    assert_eq!(client.server_info().unwrap().name, "tcp-tools");
    let caps = client.capabilities().unwrap();
    assert!(caps.tools);
    assert!(!caps.prompts);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools[0].name, "search");

    let mut args = HashMap::new();
    args.insert("query".to_string(), json!("cats"));
    let result = client
        .call_tool_with_timeout("search", args, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text_lossy(), "3 results for cats...");

    client.close().await.unwrap();
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn connect_against_a_dead_endpoint_fails_within_the_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ServerConfig::tcp(addr.to_string())
        .request_timeout(Duration::from_secs(1))
        .connect_timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let err = Client::connect(config).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(
        err,
        tether_client::SessionError::Transport(_) | tether_client::SessionError::InitTimeout(_)
    ));
}
