//! Correlation, independent timeouts, and failure cascades, exercised
//! through the public façade.

mod support;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tether_client::{ClientError, SessionState};

use support::{Reply, connected_client, init_result};

/// A script whose `tools/call` echoes `arguments.tag` after
/// `arguments.delay_ms`, so tests can force arbitrary response orders.
fn echo_with_delay(method: &str, params: Option<&Value>) -> Reply {
    match method {
        "initialize" => Reply::Result(init_result()),
        "tools/call" => {
            let args = &params.expect("call params")["arguments"];
            let tag = args["tag"].as_str().unwrap_or_default().to_string();
            let delay = args["delay_ms"].as_u64().unwrap_or(0);
            Reply::Delayed(
                Duration::from_millis(delay),
                json!({"content": [{"type": "text", "text": tag}], "isError": false}),
            )
        }
        _ => Reply::Silent,
    }
}

fn call_args(tag: &str, delay_ms: u64) -> HashMap<String, Value> {
    let mut args = HashMap::new();
    args.insert("tag".into(), json!(tag));
    args.insert("delay_ms".into(), json!(delay_ms));
    args
}

#[tokio::test]
async fn concurrent_calls_resolve_by_id_not_arrival_order() {
    let (client, _harness) = connected_client(echo_with_delay).await;

    // Later calls answer sooner: responses arrive in reverse send order.
    let mut joins = Vec::new();
    for (i, delay) in [250u64, 200, 150, 100, 50].into_iter().enumerate() {
        let client = client.clone();
        let tag = format!("call-{i}");
        joins.push(tokio::spawn(async move {
            let result = client
                .call_tool("echo", call_args(&tag, delay))
                .await
                .unwrap();
            (tag, result.text_lossy())
        }));
    }

    for join in joins {
        let (tag, echoed) = join.await.unwrap();
        assert_eq!(tag, echoed);
    }
    assert_eq!(client.state(), SessionState::Ready);
}

#[tokio::test]
async fn a_slow_call_does_not_block_an_unrelated_one() {
    let (client, _harness) = connected_client(echo_with_delay).await;

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call_tool("echo", call_args("slow", 400)).await })
    };

    let started = Instant::now();
    let fast = client.call_tool("echo", call_args("fast", 0)).await.unwrap();
    assert_eq!(fast.text_lossy(), "fast");
    assert!(
        started.elapsed() < Duration::from_millis(250),
        "fast call waited on the slow one"
    );

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.text_lossy(), "slow");
}

#[tokio::test]
async fn timeouts_are_per_request_and_leave_the_session_usable() {
    let (client, _harness) = connected_client(echo_with_delay).await;

    let err = client
        .call_tool_with_timeout("echo", call_args("late", 500), Duration::from_millis(80))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));

    // The session survives an individual deadline miss.
    assert_eq!(client.state(), SessionState::Ready);
    let ok = client.call_tool("echo", call_args("after", 0)).await.unwrap();
    assert_eq!(ok.text_lossy(), "after");
}

#[tokio::test]
async fn server_hangup_drains_every_outstanding_call() {
    let (client, harness) = connected_client(|method, _| match method {
        "initialize" => Reply::Result(init_result()),
        // Accept calls but never answer them.
        _ => Reply::Silent,
    })
    .await;

    let mut joins = Vec::new();
    for i in 0..4 {
        let client = client.clone();
        joins.push(tokio::spawn(async move {
            client
                .call_tool_with_timeout(
                    "echo",
                    call_args(&format!("c{i}"), 0),
                    Duration::from_secs(30),
                )
                .await
        }));
    }
    // Let every call reach the server before it dies.
    while harness.count_of("tools/call") < 4 {
        tokio::task::yield_now().await;
    }

    let started = Instant::now();
    harness.hangup().await;

    for join in joins {
        let outcome = join.await.unwrap();
        assert!(matches!(outcome, Err(ClientError::SessionClosed)));
    }
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "pending calls lingered after session failure"
    );
    assert!(matches!(client.state(), SessionState::Failed { .. }));

    // New work is refused immediately.
    let err = client.call_tool("echo", HashMap::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Session(_) | ClientError::SessionClosed
    ));
}
