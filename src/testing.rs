//! Test utilities for MCP clients.
//!
//! [`MockServer`] is a scripted MCP server running in-process on the far end
//! of a [`ChannelTransport`]. It answers `initialize`, `ping`, `tools/list`
//! and `tools/call`, records every frame the client sends, and can push
//! requests of its own such as `sampling/createMessage`.
//!
//! # Quick Start
//!
//! ```rust
//! use mcp_http_client::testing::MockServer;
//! use mcp_http_client::{McpClient, ToolInvocation};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (transport, server) = MockServer::builder().demo_tools().build();
//! let client = McpClient::new(transport);
//! client.initialize().await.unwrap();
//!
//! let tools = client.list_tools().await.unwrap();
//! assert_eq!(tools[0].name, "execute_query");
//!
//! let result = client
//!     .call_tool(ToolInvocation::new("execute_query").arg("query", "SELECT 1"))
//!     .await
//!     .unwrap();
//! assert!(result.all_text().contains("SELECT 1"));
//!
//! assert!(server.received_methods().contains(&"notifications/initialized".to_string()));
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use tokio::sync::oneshot;

use crate::error::{Error, JsonRpcError, Result};
use crate::protocol::{
    CallToolResult, JsonRpcResponse, LATEST_PROTOCOL_VERSION, RequestId, ToolDefinition, methods,
};
use crate::transport::{ChannelTransport, Transport};

type ToolFn = Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, CallToolResult> + Send + Sync>;

struct MockTool {
    definition: ToolDefinition,
    handler: ToolFn,
}

/// Builder for [`MockServer`]
pub struct MockServerBuilder {
    server_name: String,
    server_version: String,
    protocol_version: String,
    tools: Vec<MockTool>,
    page_size: Option<usize>,
    fail_initialize: usize,
    silent: bool,
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self {
            server_name: "mock-server".to_string(),
            server_version: "1.0.0".to_string(),
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            tools: Vec::new(),
            page_size: None,
            fail_initialize: 0,
            silent: false,
        }
    }
}

impl MockServerBuilder {
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.server_name = name.into();
        self.server_version = version.into();
        self
    }

    /// Protocol version the server answers `initialize` with
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Register a tool backed by an async handler
    pub fn tool<F, Fut>(mut self, definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallToolResult> + Send + 'static,
    {
        let handler: ToolFn = Arc::new(move |args| -> BoxFuture<'static, CallToolResult> {
            Box::pin(handler(args))
        });
        self.tools.push(MockTool {
            definition,
            handler,
        });
        self
    }

    /// A tool that returns its arguments as JSON text
    pub fn echo_tool(self, name: &str) -> Self {
        self.tool(ToolDefinition::new(name, "Echo the arguments"), |args| async move {
            CallToolResult::text(Value::Object(args).to_string())
        })
    }

    /// A tool that always reports `isError`
    pub fn failing_tool(self, name: &str, message: &str) -> Self {
        let message = message.to_string();
        self.tool(ToolDefinition::new(name, "Always fails"), move |_| {
            let message = message.clone();
            async move { CallToolResult::error(message) }
        })
    }

    /// The database tools the demo binary expects: `execute_query` then
    /// `get_schema`
    pub fn demo_tools(self) -> Self {
        self.tool(
            ToolDefinition::new("execute_query", "Execute a SQL query"),
            |args| async move {
                let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                CallToolResult::json(json!({ "query": query, "rows": [] }))
            },
        )
        .tool(
            ToolDefinition::new("get_schema", "Describe the database schema"),
            |_| async move { CallToolResult::text("masterbranch(id INTEGER, name TEXT)") },
        )
    }

    /// Split `tools/list` into pages of this size
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Answer the first `times` initialize requests with an error
    pub fn fail_initialize(mut self, times: usize) -> Self {
        self.fail_initialize = times;
        self
    }

    /// Never answer client requests
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Start the server. Returns the client end of the transport.
    pub fn build(self) -> (ChannelTransport, MockServer) {
        let (client_end, server_end) = ChannelTransport::pair();

        let shared = Arc::new(Shared {
            transport: server_end,
            server_name: self.server_name,
            server_version: self.server_version,
            protocol_version: self.protocol_version,
            tools: self.tools,
            page_size: self.page_size,
            fail_initialize: AtomicUsize::new(self.fail_initialize),
            silent: AtomicBool::new(self.silent),
            received: Mutex::new(Vec::new()),
            awaiting: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        });

        tokio::spawn(run_server(shared.clone()));

        (client_end, MockServer { shared })
    }
}

struct Shared {
    transport: ChannelTransport,
    server_name: String,
    server_version: String,
    protocol_version: String,
    tools: Vec<MockTool>,
    page_size: Option<usize>,
    fail_initialize: AtomicUsize,
    silent: AtomicBool,
    received: Mutex<Vec<Value>>,
    awaiting: Mutex<HashMap<RequestId, oneshot::Sender<Value>>>,
    next_id: AtomicI64,
}

/// Scripted in-process MCP server
pub struct MockServer {
    shared: Arc<Shared>,
}

impl MockServer {
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::default()
    }

    /// Every frame received from the client, in arrival order
    pub fn received(&self) -> Vec<Value> {
        self.shared
            .received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Method names of received requests and notifications
    pub fn received_methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|m| m.get("method").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Stop (or resume) answering client requests
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::Release);
    }

    /// Send a server request without waiting for the reply.
    ///
    /// The receiver resolves with the client's full response object.
    pub async fn send_request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(RequestId, oneshot::Receiver<Value>)> {
        let id = RequestId::String(format!(
            "srv-{}",
            self.shared.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        let (tx, rx) = oneshot::channel();
        if let Ok(mut awaiting) = self.shared.awaiting.lock() {
            awaiting.insert(id.clone(), tx);
        }

        let frame = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.shared.transport.send(frame.to_string()).await?;
        Ok((id, rx))
    }

    /// Send `sampling/createMessage` and wait for the client's response
    pub async fn request_sampling(&self, params: Value) -> Result<Value> {
        let (_, rx) = self
            .send_request(methods::SAMPLING_CREATE_MESSAGE, params)
            .await?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn send_notification(&self, method: &str, params: Value) -> Result<()> {
        let frame = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.shared.transport.send(frame.to_string()).await
    }

    /// Send an arbitrary frame
    pub async fn send_raw(&self, frame: impl Into<String>) -> Result<()> {
        self.shared.transport.send(frame.into()).await
    }

    /// Drop the connection from the server side
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.transport.close().await
    }
}

async fn run_server(shared: Arc<Shared>) {
    while let Ok(Some(frame)) = shared.transport.receive().await {
        let Ok(message) = serde_json::from_str::<Value>(&frame) else {
            continue;
        };
        if let Ok(mut received) = shared.received.lock() {
            received.push(message.clone());
        }

        let id = message
            .get("id")
            .filter(|id| !id.is_null())
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
        let method = message.get("method").and_then(Value::as_str);

        match (method, id) {
            (Some(method), Some(id)) => {
                if shared.silent.load(Ordering::Acquire) {
                    continue;
                }
                let method = method.to_string();
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                tokio::spawn(answer(shared.clone(), id, method, params));
            }
            (None, Some(id)) => {
                let waiter = shared.awaiting.lock().ok().and_then(|mut a| a.remove(&id));
                if let Some(tx) = waiter {
                    let _ = tx.send(message);
                }
            }
            _ => {}
        }
    }
}

async fn answer(shared: Arc<Shared>, id: RequestId, method: String, params: Value) {
    let response = match handle(&shared, &method, params).await {
        Ok(result) => JsonRpcResponse::result(id, result),
        Err(error) => JsonRpcResponse::error(Some(id), error),
    };
    if let Ok(frame) = serde_json::to_string(&response) {
        let _ = shared.transport.send(frame).await;
    }
}

async fn handle(
    shared: &Shared,
    method: &str,
    params: Value,
) -> std::result::Result<Value, JsonRpcError> {
    match method {
        methods::INITIALIZE => {
            let remaining = shared.fail_initialize.load(Ordering::Acquire);
            if remaining > 0 {
                shared.fail_initialize.store(remaining - 1, Ordering::Release);
                return Err(JsonRpcError::internal_error("Server not ready"));
            }
            Ok(json!({
                "protocolVersion": shared.protocol_version,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": shared.server_name, "version": shared.server_version}
            }))
        }
        methods::PING => Ok(json!({})),
        methods::TOOLS_LIST => {
            let start = params
                .get("cursor")
                .and_then(Value::as_str)
                .and_then(|c| c.parse::<usize>().ok())
                .unwrap_or(0);
            let size = shared.page_size.unwrap_or(shared.tools.len().max(1));
            let end = (start + size).min(shared.tools.len());

            let tools: Vec<&ToolDefinition> = shared
                .tools
                .get(start..end)
                .unwrap_or_default()
                .iter()
                .map(|t| &t.definition)
                .collect();

            let mut result = json!({ "tools": tools });
            if end < shared.tools.len() {
                result["nextCursor"] = json!(end.to_string());
            }
            Ok(result)
        }
        methods::TOOLS_CALL => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let Some(tool) = shared.tools.iter().find(|t| t.definition.name == name) else {
                return Err(JsonRpcError::invalid_params(format!("Unknown tool: {}", name)));
            };
            let arguments = params
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let result = (tool.handler)(arguments).await;
            serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McpClient;

    #[tokio::test]
    async fn test_pages_follow_cursor() {
        let (transport, _server) = MockServer::builder()
            .echo_tool("a")
            .echo_tool("b")
            .echo_tool("c")
            .page_size(2)
            .build();

        let client = McpClient::new(transport);
        client.initialize().await.unwrap();

        let names: Vec<String> = client
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_records_client_frames() {
        let (transport, server) = MockServer::builder().build();
        let client = McpClient::new(transport);
        client.initialize().await.unwrap();
        client.ping().await.unwrap();

        assert_eq!(
            server.received_methods(),
            vec!["initialize", "notifications/initialized", "ping"]
        );
    }
}
