//! Streamable HTTP transport tests against a local axum server
#![cfg(feature = "http")]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use mcp_http_client::transport::{HttpClientConfig, HttpClientTransport, Transport};
use mcp_http_client::{EchoSamplingHandler, Error, McpClient, SessionPhase, ToolInvocation};
use serde_json::{Value, json};

const SESSION_ID: &str = "sess-1";

#[derive(Default)]
struct ServerState {
    offer_event_stream: bool,
    sessions: Mutex<Vec<Option<String>>>,
    client_responses: Mutex<Vec<Value>>,
    deleted: Mutex<bool>,
    resumed_from: Mutex<Vec<Option<String>>>,
}

fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn sse_body(frame: &Value) -> String {
    format!(": keep-alive\n\nevent: message\ndata: {}\n\n", frame)
}

async fn post_mcp(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Ok(msg) = serde_json::from_str::<Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if headers.get("mcp-protocol-version").is_none() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let session = session_of(&headers);
    state.sessions.lock().unwrap().push(session.clone());

    let Some(method) = msg.get("method").and_then(Value::as_str) else {
        state.client_responses.lock().unwrap().push(msg.clone());
        return StatusCode::ACCEPTED.into_response();
    };
    let Some(id) = msg.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };

    match method {
        "initialize" => (
            [("mcp-session-id", SESSION_ID)],
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "axum-mcp", "version": "0.1.0"}
                }
            })),
        )
            .into_response(),
        "ping" => (
            [(header::CONTENT_TYPE, "text/event-stream")],
            sse_body(&json!({"jsonrpc": "2.0", "id": id, "result": {}})),
        )
            .into_response(),
        _ if session.as_deref() != Some(SESSION_ID) => StatusCode::BAD_REQUEST.into_response(),
        "tools/list" => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [
                {"name": "execute_query", "inputSchema": {"type": "object"}},
                {"name": "get_schema", "inputSchema": {"type": "object"}}
            ]}
        }))
        .into_response(),
        "tools/call" => {
            let authorized = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                == Some("Bearer secret");
            if !authorized {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            let query = msg["params"]["arguments"]["query"].as_str().unwrap_or("");
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": format!("ran {}", query)}]}
            }))
            .into_response()
        }
        other => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": format!("Method not found: {}", other)}
        }))
        .into_response(),
    }
}

async fn get_mcp(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !state.offer_event_stream {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    if session_of(&headers).as_deref() != Some(SESSION_ID) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.resumed_from.lock().unwrap().push(last_event_id);

    let request = json!({
        "jsonrpc": "2.0",
        "id": "srv-1",
        "method": "sampling/createMessage",
        "params": {
            "messages": [{"role": "user", "content": {"type": "text", "text": "list tables"}}],
            "maxTokens": 50
        }
    });
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        format!("id: ev-7\nevent: message\ndata: {}\n\n", request),
    )
        .into_response()
}

async fn delete_mcp(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> StatusCode {
    if session_of(&headers).as_deref() == Some(SESSION_ID) {
        *state.deleted.lock().unwrap() = true;
    }
    StatusCode::OK
}

async fn spawn_server(state: Arc<ServerState>) -> SocketAddr {
    let app = Router::new()
        .route("/mcp", post(post_mcp).get(get_mcp).delete(delete_mcp))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_session_over_streamable_http() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_server(state.clone()).await;

    let transport = Arc::new(
        HttpClientTransport::new(
            HttpClientConfig::new(format!("http://{}/mcp", addr)).bearer_token("secret"),
        )
        .unwrap(),
    );
    let client = McpClient::builder(transport.clone())
        .request_timeout(Duration::from_secs(5))
        .build();

    let init = client.initialize().await.unwrap();
    assert_eq!(init.server_info.name, "axum-mcp");
    assert_eq!(transport.session_id().as_deref(), Some(SESSION_ID));

    // 405 means the server has no standalone stream
    assert!(!transport.open_event_stream().await.unwrap());

    // Answered with an SSE body
    client.ping().await.unwrap();

    let tools = client.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["execute_query", "get_schema"]);

    let result = client
        .call_tool(ToolInvocation::new("execute_query").arg("query", "SELECT 1"))
        .await
        .unwrap();
    assert_eq!(result.first_text(), Some("ran SELECT 1"));

    // Everything after initialize carried the session id
    let sessions = state.sessions.lock().unwrap().clone();
    assert_eq!(sessions[0], None);
    assert!(sessions[1..].iter().all(|s| s.as_deref() == Some(SESSION_ID)));

    client.close().await.unwrap();
    assert_eq!(client.phase(), SessionPhase::Closed);
    assert!(*state.deleted.lock().unwrap());
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_sampling_request_from_event_stream() {
    let state = Arc::new(ServerState {
        offer_event_stream: true,
        ..Default::default()
    });
    let addr = spawn_server(state.clone()).await;

    let transport = Arc::new(
        HttpClientTransport::new(HttpClientConfig::new(format!("http://{}/mcp", addr))).unwrap(),
    );
    let client = McpClient::builder(transport.clone())
        .sampling_handler(EchoSamplingHandler)
        .build();
    client.initialize().await.unwrap();

    assert!(transport.open_event_stream().await.unwrap());

    let mut reply = None;
    for _ in 0..200 {
        reply = state
            .client_responses
            .lock()
            .unwrap()
            .iter()
            .find(|r| r["id"] == "srv-1")
            .cloned();
        if reply.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let reply = reply.expect("client answered the sampling request");
    assert_eq!(reply["result"]["role"], "assistant");
    assert_eq!(
        reply["result"]["content"]["text"],
        "Mock LLM response to: 'list tables'"
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_event_stream_resumes_from_last_event_id() {
    let state = Arc::new(ServerState {
        offer_event_stream: true,
        ..Default::default()
    });
    let addr = spawn_server(state.clone()).await;

    let transport = Arc::new(
        HttpClientTransport::new(HttpClientConfig::new(format!("http://{}/mcp", addr))).unwrap(),
    );
    let client = McpClient::builder(transport.clone())
        .sampling_handler(EchoSamplingHandler)
        .build();
    client.initialize().await.unwrap();

    assert!(transport.open_event_stream().await.unwrap());
    for _ in 0..200 {
        if transport.last_event_id().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.last_event_id().as_deref(), Some("ev-7"));

    // The first stream has ended; reopening picks up where it left off
    assert!(transport.open_event_stream().await.unwrap());
    let resumed_from = state.resumed_from.lock().unwrap().clone();
    assert_eq!(resumed_from, vec![None, Some("ev-7".to_string())]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_http_error_status_is_transport_error() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_server(state).await;

    let transport =
        HttpClientTransport::new(HttpClientConfig::new(format!("http://{}/missing", addr)))
            .unwrap();
    let err = transport
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(ref msg) if msg.contains("404")));
}

#[tokio::test]
async fn test_unreachable_server_fails_handshake() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport =
        HttpClientTransport::new(HttpClientConfig::new(format!("http://{}/mcp", addr))).unwrap();
    let client = McpClient::new(transport);

    let err = client.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Handshake(_)));
    assert_eq!(client.phase(), SessionPhase::Uninitialized);
}
