//! Discovery caching: single-flight, order preservation, invalidation.

mod support;

use std::time::Duration;

use serde_json::json;
use tether_client::{ClientError, SessionError};

use support::{Reply, connected_client, init_result};

fn three_tools() -> serde_json::Value {
    json!({
        "tools": [
            {"name": "zeta", "inputSchema": {"type": "object"}},
            {"name": "alpha", "inputSchema": {"type": "object"}},
            {"name": "midway", "inputSchema": {"type": "object"}}
        ]
    })
}

#[tokio::test]
async fn listing_is_cached_and_keeps_server_order() {
    let (client, harness) = connected_client(|method, _| match method {
        "initialize" => Reply::Result(init_result()),
        "tools/list" => Reply::Result(three_tools()),
        _ => Reply::Silent,
    })
    .await;

    let first = client.list_tools().await.unwrap();
    let second = client.list_tools().await.unwrap();

    // Server order, deliberately non-alphabetical, survives as-is.
    let names: Vec<&str> = first.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["zeta", "alpha", "midway"]);
    assert_eq!(first, second);
    assert_eq!(harness.count_of("tools/list"), 1);
}

#[tokio::test]
async fn concurrent_cold_listings_issue_one_upstream_request() {
    let (client, harness) = connected_client(|method, _| match method {
        "initialize" => Reply::Result(init_result()),
        // Slow enough that all callers are in flight together.
        "tools/list" => Reply::Delayed(Duration::from_millis(100), three_tools()),
        _ => Reply::Silent,
    })
    .await;

    let mut joins = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        joins.push(tokio::spawn(async move { client.list_tools().await }));
    }

    let mut listings = Vec::new();
    for join in joins {
        listings.push(join.await.unwrap().unwrap());
    }
    for listing in &listings {
        assert_eq!(listing, &listings[0]);
    }
    assert_eq!(harness.count_of("tools/list"), 1);
}

#[tokio::test]
async fn refresh_replaces_the_cache() {
    let mut serve_second_set = false;
    let (client, harness) = connected_client(move |method, _| match method {
        "initialize" => Reply::Result(init_result()),
        "tools/list" => {
            let tools = if serve_second_set {
                json!({"tools": [{"name": "brand-new", "inputSchema": {"type": "object"}}]})
            } else {
                three_tools()
            };
            serve_second_set = true;
            Reply::Result(tools)
        }
        _ => Reply::Silent,
    })
    .await;

    assert_eq!(client.list_tools().await.unwrap().len(), 3);
    let refreshed = client.refresh_tools().await.unwrap();
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].name, "brand-new");

    // Subsequent plain listings serve the replaced cache.
    assert_eq!(client.list_tools().await.unwrap(), refreshed);
    assert_eq!(harness.count_of("tools/list"), 2);
}

#[tokio::test]
async fn prompts_and_resources_list_in_server_order() {
    let (client, _harness) = connected_client(|method, _| match method {
        "initialize" => Reply::Result(init_result()),
        "prompts/list" => Reply::Result(json!({
            "prompts": [
                {"name": "summarize", "description": "Summarize a document"},
                {"name": "translate", "arguments": [{"name": "language", "required": true}]}
            ]
        })),
        "resources/list" => Reply::Result(json!({
            "resources": [
                {"name": "readme", "uri": "file:///README.md", "mimeType": "text/markdown"}
            ]
        })),
        _ => Reply::Silent,
    })
    .await;

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0].name, "summarize");
    let args = prompts[1].arguments.as_ref().unwrap();
    assert_eq!(args[0].name, "language");

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources[0].uri, "file:///README.md");
}

#[tokio::test]
async fn listing_after_failure_never_serves_stale_data() {
    let (client, harness) = connected_client(|method, _| match method {
        "initialize" => Reply::Result(init_result()),
        "tools/list" => Reply::Result(three_tools()),
        _ => Reply::Silent,
    })
    .await;

    assert_eq!(client.list_tools().await.unwrap().len(), 3);
    harness.hangup().await;

    // Wait for the reader to observe the dead transport.
    let mut state = client.session().subscribe_state();
    while *state.borrow_and_update() == tether_client::SessionState::Ready {
        state.changed().await.unwrap();
    }

    let err = client.list_tools().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Session(SessionError::NotReady { .. })
    ));
}
