//! Integration tests for the HTTP+SSE transport.
//!
//! Requests go straight into the axum router; no socket is bound.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::FakeFreeCad;
use freecad_mcp::config::ServerConfig;
use freecad_mcp::mcp::SseServer;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

const INITIALIZE: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"sse-test"}}}"#;

fn sse_server() -> SseServer {
    SseServer::new(&ServerConfig::default(), Arc::new(FakeFreeCad::new()), false).unwrap()
}

/// Reads the next SSE event and returns its `(event, data)` fields.
async fn next_event(body: &mut Body) -> (String, String) {
    let frame = body
        .frame()
        .await
        .expect("stream ended")
        .expect("stream failed")
        .into_data()
        .expect("not a data frame");
    let text = String::from_utf8(frame.to_vec()).unwrap();

    let mut event = String::new();
    let mut data = String::new();
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("event: ") {
            event = value.to_string();
        } else if let Some(value) = line.strip_prefix("data: ") {
            data = value.to_string();
        }
    }
    (event, data)
}

async fn open_stream(router: &Router) -> (Body, String) {
    let response = router
        .clone()
        .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let mut body = response.into_body();
    let (event, endpoint) = next_event(&mut body).await;
    assert_eq!(event, "endpoint");
    (body, endpoint)
}

async fn post(router: &Router, uri: &str, message: &str) -> StatusCode {
    router
        .clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(message.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_first_event_is_endpoint() {
    let server = sse_server();
    let router = server.router();

    let (_body, endpoint) = open_stream(&router).await;

    let session_id = endpoint
        .strip_prefix("/messages?session_id=")
        .expect("endpoint should point at the message path");
    assert!(!session_id.is_empty());
    assert_eq!(server.session_count().await, 1);
}

#[tokio::test]
async fn test_reply_arrives_as_message_event() {
    let server = sse_server();
    let router = server.router();
    let (mut body, endpoint) = open_stream(&router).await;

    assert_eq!(post(&router, &endpoint, INITIALIZE).await, StatusCode::ACCEPTED);

    let (event, data) = next_event(&mut body).await;
    assert_eq!(event, "message");
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_notification_is_accepted_without_event() {
    let server = sse_server();
    let router = server.router();
    let (mut body, endpoint) = open_stream(&router).await;

    assert_eq!(post(&router, &endpoint, INITIALIZE).await, StatusCode::ACCEPTED);
    next_event(&mut body).await;

    let initialized = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
    assert_eq!(post(&router, &endpoint, initialized).await, StatusCode::ACCEPTED);

    // The next event is the reply to this ping, not anything for the notification
    let ping = r#"{"jsonrpc":"2.0","id":"after","method":"ping"}"#;
    assert_eq!(post(&router, &endpoint, ping).await, StatusCode::ACCEPTED);
    let (_, data) = next_event(&mut body).await;
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["id"], "after");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let server = sse_server();
    let router = server.router();
    let (mut first, first_endpoint) = open_stream(&router).await;
    let (_second, second_endpoint) = open_stream(&router).await;
    assert_ne!(first_endpoint, second_endpoint);

    post(&router, &first_endpoint, INITIALIZE).await;
    next_event(&mut first).await;

    // The second session has not been initialised yet
    assert_eq!(post(&router, &second_endpoint, INITIALIZE).await, StatusCode::ACCEPTED);
    assert_eq!(server.session_count().await, 2);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let router = sse_server().router();

    let status = post(&router, "/messages?session_id=nope", INITIALIZE).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_session_id_is_bad_request() {
    let router = sse_server().router();

    let status = post(&router, "/messages", INITIALIZE).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_closed_stream_ends_session() {
    let server = sse_server();
    let router = server.router();
    let (body, endpoint) = open_stream(&router).await;
    drop(body);

    assert_eq!(server.session_count().await, 0);
    assert_eq!(post(&router, &endpoint, INITIALIZE).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disconnected_clients_leave_no_sessions() {
    let server = sse_server();
    let router = server.router();

    let mut streams = Vec::new();
    for _ in 0..3 {
        streams.push(open_stream(&router).await);
    }
    assert_eq!(server.session_count().await, 3);

    let (kept, endpoint) = streams.remove(1);
    drop(streams);
    assert_eq!(server.session_count().await, 1);

    // The remaining session is the one still connected
    assert_eq!(post(&router, &endpoint, INITIALIZE).await, StatusCode::ACCEPTED);
    drop(kept);
    assert_eq!(server.session_count().await, 0);
}

#[tokio::test]
async fn test_custom_paths() {
    let config = ServerConfig {
        sse_path: "mcp/events".to_string(),
        message_path: "/mcp/rpc/".to_string(),
        ..ServerConfig::default()
    };
    let server = SseServer::new(&config, Arc::new(FakeFreeCad::new()), false).unwrap();
    let router = server.router();

    let response = router
        .clone()
        .oneshot(Request::get("/mcp/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut body = response.into_body();
    let (_, endpoint) = next_event(&mut body).await;

    assert!(endpoint.starts_with("/mcp/rpc/?session_id="), "{endpoint}");
}
