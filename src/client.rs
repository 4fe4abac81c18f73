//! MCP client session
//!
//! [`McpClient`] owns one session with one server over any [`Transport`]. A
//! spawned receive loop reads frames, resolves replies to outbound requests
//! by id and answers the server's own requests (`ping`,
//! `sampling/createMessage`). Any number of calls may be in flight at once.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_http_client::{McpClient, ToolInvocation};
//! use mcp_http_client::sampling::EchoSamplingHandler;
//! use mcp_http_client::transport::StdioClientTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = StdioClientTransport::spawn("my-mcp-server", &["--flag"]).await?;
//!     let client = McpClient::builder(transport)
//!         .client_info("my-client", "1.0.0")
//!         .sampling_handler(EchoSamplingHandler)
//!         .build();
//!
//!     let server = client.initialize().await?;
//!     println!("Connected to: {}", server.server_info.name);
//!
//!     for tool in client.list_tools().await? {
//!         println!("Tool: {}", tool.name);
//!     }
//!
//!     let result = client
//!         .call_tool(ToolInvocation::new("my-tool").arg("arg", "value"))
//!         .await?;
//!     println!("Result: {}", result.all_text());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_service::Service;

use crate::error::{Error, JsonRpcError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, CancelledParams, ClientCapabilities, CreateMessageParams,
    CreateMessageResult, EmptyResult, Implementation, IncomingMessage, InitializeParams,
    InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LATEST_PROTOCOL_VERSION,
    ListRootsResult, ListToolsParams, ListToolsResult, LogLevel, LoggingMessageParams,
    ProgressParams, RequestId, Root, SUPPORTED_PROTOCOL_VERSIONS, ToolDefinition, ToolInvocation, methods, notifications,
};
use crate::sampling::{SamplingHandler, validate_request};
use crate::session::{SessionPhase, SessionState};
use crate::transport::Transport;

/// Default deadline for outbound requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type PendingTable = Mutex<HashMap<RequestId, oneshot::Sender<Result<Value>>>>;
type InFlightTable = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// Builder for [`McpClient`]
pub struct McpClientBuilder {
    transport: Arc<dyn Transport>,
    client_info: Implementation,
    capabilities: ClientCapabilities,
    sampling: Option<Arc<dyn SamplingHandler>>,
    roots: Vec<Root>,
    request_timeout: Duration,
    protocol_version: String,
}

impl McpClientBuilder {
    /// Name and version sent as `clientInfo`
    pub fn client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_info = Implementation::new(name, version);
        self
    }

    pub fn capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Handle `sampling/createMessage` requests from the server.
    ///
    /// The `sampling` capability is advertised automatically once a handler
    /// is registered.
    pub fn sampling_handler(mut self, handler: impl SamplingHandler + 'static) -> Self {
        self.sampling = Some(Arc::new(handler));
        self
    }

    /// Roots returned for the server's `roots/list` requests.
    ///
    /// A non-empty list advertises the `roots` capability.
    pub fn roots(mut self, roots: impl IntoIterator<Item = Root>) -> Self {
        self.roots = roots.into_iter().collect();
        self
    }

    /// Deadline applied to every outbound request
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Protocol version offered in `initialize`
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Create the client and start its receive loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> McpClient {
        let shutdown = CancellationToken::new();
        let inner = Arc::new(Inner {
            transport: self.transport,
            state: SessionState::new(),
            pending: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicI64::new(1),
            request_timeout: self.request_timeout,
            client_info: self.client_info,
            capabilities: self.capabilities,
            protocol_version: self.protocol_version,
            sampling: self.sampling,
            roots: self.roots,
            server_info: RwLock::new(None),
            shutdown: shutdown.clone(),
            closing: AtomicBool::new(false),
            receive_loop: Mutex::new(None),
        });

        let handle = tokio::spawn(run_receive_loop(
            Arc::downgrade(&inner),
            inner.transport.clone(),
            shutdown,
        ));
        if let Ok(mut slot) = inner.receive_loop.lock() {
            *slot = Some(handle);
        }

        McpClient { inner }
    }
}

/// Handle to an MCP session. Clones share the same session.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("phase", &self.phase())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

impl McpClient {
    /// Start configuring a client over the given transport
    pub fn builder(transport: impl Transport + 'static) -> McpClientBuilder {
        McpClientBuilder {
            transport: Arc::new(transport),
            client_info: Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            capabilities: ClientCapabilities::default(),
            sampling: None,
            roots: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
        }
    }

    /// Create a client with default settings
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::builder(transport).build()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.phase()
    }

    /// The server's `initialize` reply, once the handshake has succeeded
    pub fn server_info(&self) -> Option<InitializeResult> {
        self.inner
            .server_info
            .read()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Number of outbound requests still waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.state.is_closed() && self.inner.transport.is_connected()
    }

    /// Perform the handshake with the configured client info and capabilities
    pub async fn initialize(&self) -> Result<InitializeResult> {
        self.initialize_with(
            self.inner.client_info.clone(),
            self.inner.capabilities.clone(),
        )
        .await
    }

    /// Perform the handshake with explicit client info and capabilities.
    ///
    /// On failure the session returns to `Uninitialized` and the handshake
    /// may be retried.
    pub async fn initialize_with(
        &self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult> {
        let state = &self.inner.state;
        if !state.begin_initialize() {
            return Err(match state.phase() {
                SessionPhase::Closed => Error::Closed,
                phase => Error::InvalidState {
                    operation: "initialize",
                    phase,
                },
            });
        }

        let mut capabilities = capabilities;
        if self.inner.sampling.is_some() && capabilities.sampling.is_none() {
            capabilities = capabilities.with_sampling();
        }
        if !self.inner.roots.is_empty() && capabilities.roots.is_none() {
            capabilities = capabilities.with_roots(false);
        }

        let params = InitializeParams {
            protocol_version: self.inner.protocol_version.clone(),
            capabilities,
            client_info,
        };

        match self.inner.handshake(params).await {
            Ok(result) => {
                if !state.complete_initialize() {
                    return Err(Error::Closed);
                }
                if let Ok(mut slot) = self.inner.server_info.write() {
                    *slot = Some(result.clone());
                }
                tracing::info!(
                    server = %result.server_info.name,
                    version = %result.server_info.version,
                    protocol_version = %result.protocol_version,
                    "Session initialized"
                );
                Ok(result)
            }
            Err(err) => {
                if !state.abort_initialize() {
                    return Err(Error::Closed);
                }
                tracing::warn!(error = %err, "Handshake failed");
                Err(match err {
                    Error::Handshake(_) => err,
                    other => Error::Handshake(other.to_string()),
                })
            }
        }
    }

    /// Check that the server is alive
    pub async fn ping(&self) -> Result<()> {
        self.inner.ensure_ready("ping")?;
        self.inner.request_value(methods::PING, None).await?;
        Ok(())
    }

    /// List every tool the server offers, following pagination
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        self.inner.ensure_ready("list tools")?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            let params = serde_json::to_value(ListToolsParams {
                cursor: cursor.clone(),
            })?;
            let value = self
                .inner
                .request_value(methods::TOOLS_LIST, Some(params))
                .await?;
            let page: ListToolsResult = serde_json::from_value(value)
                .map_err(|e| Error::Protocol(format!("Malformed tools/list result: {}", e)))?;

            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen_cursors.insert(next.clone()) {
                        return Err(Error::Protocol(format!(
                            "Server repeated pagination cursor '{}'",
                            next
                        )));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        tracing::debug!(count = tools.len(), "Listed tools");
        Ok(tools)
    }

    /// Call a tool.
    ///
    /// A result with `isError` set is returned as [`Error::ToolExecution`];
    /// the session stays usable.
    pub async fn call_tool(&self, invocation: ToolInvocation) -> Result<CallToolResult> {
        self.inner.ensure_ready("call tools")?;
        if invocation.name.is_empty() {
            return Err(Error::validation("tool name must not be empty"));
        }

        let tool = invocation.name.clone();
        let params = serde_json::to_value(CallToolParams::from(invocation))?;
        let value = self
            .inner
            .request_value(methods::TOOLS_CALL, Some(params))
            .await?;
        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("Malformed tools/call result: {}", e)))?;

        if result.is_error {
            return Err(Error::ToolExecution { tool, result });
        }
        Ok(result)
    }

    /// Send a raw request
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R> {
        self.inner.ensure_ready("send requests")?;
        let params = serde_json::to_value(params)?;
        let value = self.inner.request_value(method, Some(params)).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("Malformed {} result: {}", method, e)))
    }

    /// Send a notification
    pub async fn notify<P: Serialize>(&self, method: &str, params: &P) -> Result<()> {
        self.inner.ensure_ready("send notifications")?;
        let params = serde_json::to_value(params)?;
        self.inner.send_notification(method, Some(params)).await
    }

    /// End the session.
    ///
    /// Pending calls fail with [`Error::Closed`], in-flight sampling handlers
    /// are cancelled and the transport is closed. Later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let previous = self.inner.state.close();
        tracing::info!(previous = %previous, "Closing session");

        self.inner.shutdown.cancel();
        self.inner.fail_pending(|| Error::Closed);

        let handle = self
            .inner
            .receive_loop
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.inner.transport.close().await
    }
}

/// A raw request for the [`Service`] interface of [`McpClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

impl Service<RpcRequest> for McpClient {
    type Response = Value;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Value>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RpcRequest) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_ready("send requests")?;
            inner.request_value(&req.method, req.params).await
        })
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    state: SessionState,
    pending: PendingTable,
    in_flight: InFlightTable,
    next_id: AtomicI64,
    request_timeout: Duration,
    client_info: Implementation,
    capabilities: ClientCapabilities,
    protocol_version: String,
    sampling: Option<Arc<dyn SamplingHandler>>,
    roots: Vec<Root>,
    server_info: RwLock<Option<InitializeResult>>,
    shutdown: CancellationToken,
    closing: AtomicBool,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Inner {
    fn ensure_ready(&self, operation: &'static str) -> Result<()> {
        match self.state.phase() {
            SessionPhase::Ready => Ok(()),
            SessionPhase::Closed => Err(Error::Closed),
            phase => Err(Error::InvalidState { operation, phase }),
        }
    }

    async fn handshake(&self, params: InitializeParams) -> Result<InitializeResult> {
        let value = self
            .request_value(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| Error::Handshake(format!("Malformed initialize result: {}", e)))?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(Error::Handshake(format!(
                "Unsupported protocol version '{}'",
                result.protocol_version
            )));
        }

        self.send_notification(notifications::INITIALIZED, None)
            .await?;
        Ok(result)
    }

    /// Send a request and wait for its reply under the request deadline
    async fn request_value(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        let frame = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending_insert(id.clone(), tx);

        // close() may have drained the table before our insert
        if self.state.is_closed() {
            self.pending_remove(&id);
            return Err(Error::Closed);
        }

        tracing::debug!(method = %method, id = %id, "Sending request");

        // The deadline covers the write as well as the wait for the reply
        let delivered = AtomicBool::new(false);
        let exchange = async {
            match self.send_frame(frame).await {
                Ok(()) => {
                    delivered.store(true, Ordering::Release);
                    rx.await.unwrap_or(Err(Error::Closed))
                }
                Err(err) => Err(err),
            }
        };

        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => {
                self.pending_remove(&id);
                Err(err)
            }
            Err(_) => {
                self.pending_remove(&id);
                tracing::warn!(
                    method = %method,
                    id = %id,
                    timeout = ?self.request_timeout,
                    "Request timed out"
                );
                if delivered.load(Ordering::Acquire) {
                    self.notify_cancelled(id).await;
                }
                Err(Error::Timeout(self.request_timeout))
            }
        }
    }

    /// Write one frame, giving up once the session shuts down
    async fn send_frame(&self, frame: String) -> Result<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Closed),
            sent = self.transport.send(frame) => sent,
        }
    }

    async fn notify_cancelled(&self, request_id: RequestId) {
        let params = CancelledParams {
            request_id,
            reason: Some("timeout".to_string()),
        };
        let Ok(params) = serde_json::to_value(params) else {
            return;
        };
        if let Err(e) = self
            .send_notification(notifications::CANCELLED, Some(params))
            .await
        {
            tracing::debug!(error = %e, "Failed to send cancellation");
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let mut notification = JsonRpcNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(params);
        }
        let frame = serde_json::to_string(&notification)?;
        tracing::debug!(method = %method, "Sending notification");
        tokio::time::timeout(self.request_timeout, self.send_frame(frame))
            .await
            .unwrap_or(Err(Error::Timeout(self.request_timeout)))
    }

    async fn reply(&self, response: JsonRpcResponse) {
        send_response(&*self.transport, &self.shutdown, self.request_timeout, response).await;
    }

    fn pending_insert(&self, id: RequestId, tx: oneshot::Sender<Result<Value>>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }
    }

    fn pending_remove(&self, id: &RequestId) -> Option<oneshot::Sender<Result<Value>>> {
        self.pending.lock().ok().and_then(|mut p| p.remove(id))
    }

    /// Resolve every pending request with an error
    fn fail_pending(&self, err: impl Fn() -> Error) {
        let drained: Vec<_> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().collect(),
            Err(_) => return,
        };
        for (id, tx) in drained {
            tracing::debug!(id = %id, "Failing pending request");
            let _ = tx.send(Err(err()));
        }
    }

    fn connection_lost(&self) {
        if self.state.close() == SessionPhase::Closed {
            return;
        }
        tracing::warn!("Transport connection lost, session closed");
        self.shutdown.cancel();
        self.fail_pending(|| Error::Transport("Connection lost".to_string()));
    }

    async fn handle_frame(&self, frame: &str) {
        let messages = match IncomingMessage::parse_frame(frame) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, frame = %frame, "Dropping unparseable frame");
                let error = if serde_json::from_str::<Value>(frame).is_err() {
                    JsonRpcError::parse_error(e.to_string())
                } else {
                    JsonRpcError::invalid_request(e.to_string())
                };
                self.reply(JsonRpcResponse::error(None, error)).await;
                return;
            }
        };

        for message in messages {
            match message {
                IncomingMessage::Response(response) => self.handle_response(response),
                IncomingMessage::Request(request) => self.handle_request(request).await,
                IncomingMessage::Notification(notification) => {
                    self.handle_notification(notification)
                }
            }
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id().cloned() else {
            if let Err(e) = response.into_result() {
                tracing::warn!(error = %e, "Server reported an error without a request id");
            }
            return;
        };

        match self.pending_remove(&id) {
            Some(tx) => {
                tracing::debug!(id = %id, "Received response");
                let _ = tx.send(response.into_result());
            }
            None => {
                tracing::debug!(id = %id, "Discarding response for unknown request");
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) {
        let id = request.id.clone();
        if let Err(err) = request.validate() {
            self.reply(JsonRpcResponse::error(Some(id), err)).await;
            return;
        }

        tracing::debug!(method = %request.method, id = %id, "Received server request");

        match request.method.as_str() {
            methods::PING => {
                let result = serde_json::to_value(EmptyResult {}).unwrap_or_default();
                self.reply(JsonRpcResponse::result(id, result)).await;
            }
            methods::SAMPLING_CREATE_MESSAGE => self.handle_sampling(id, request.params).await,
            methods::ROOTS_LIST if !self.roots.is_empty() => {
                let listing = ListRootsResult {
                    roots: self.roots.clone(),
                };
                let response = match serde_json::to_value(listing) {
                    Ok(result) => JsonRpcResponse::result(id, result),
                    Err(e) => JsonRpcResponse::error(Some(id), JsonRpcError::internal_error(e.to_string())),
                };
                self.reply(response).await;
            }
            other => {
                tracing::debug!(method = %other, "Unsupported server request");
                self.reply(JsonRpcResponse::error(
                    Some(id),
                    JsonRpcError::method_not_found(other),
                ))
                .await;
            }
        }
    }

    async fn handle_sampling(&self, id: RequestId, params: Option<Value>) {
        let Some(handler) = self.sampling.clone() else {
            self.reply(JsonRpcResponse::error(
                Some(id),
                JsonRpcError::method_not_found(methods::SAMPLING_CREATE_MESSAGE),
            ))
            .await;
            return;
        };

        let params: CreateMessageParams =
            match serde_json::from_value(params.unwrap_or_else(|| Value::Object(Default::default())))
            {
                Ok(params) => params,
                Err(e) => {
                    self.reply(JsonRpcResponse::error(
                        Some(id),
                        JsonRpcError::invalid_params(e.to_string()),
                    ))
                    .await;
                    return;
                }
            };

        if let Err(err) = validate_request(&params) {
            tracing::warn!(id = %id, error = %err, "Rejecting sampling request");
            self.reply(JsonRpcResponse::error(Some(id), err.to_jsonrpc()))
                .await;
            return;
        }

        let token = self.shutdown.child_token();
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.insert(id.clone(), token.clone());
        }

        tokio::spawn(run_sampling(
            handler,
            self.transport.clone(),
            self.request_timeout,
            self.in_flight.clone(),
            id,
            token,
            params,
        ));
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        let params = notification.params.unwrap_or(Value::Null);

        match notification.method.as_str() {
            notifications::CANCELLED => {
                let Ok(cancelled) = serde_json::from_value::<CancelledParams>(params) else {
                    tracing::warn!("Malformed cancellation notification");
                    return;
                };
                let token = self
                    .in_flight
                    .lock()
                    .ok()
                    .and_then(|in_flight| in_flight.get(&cancelled.request_id).cloned());
                match token {
                    Some(token) => {
                        tracing::info!(
                            id = %cancelled.request_id,
                            reason = ?cancelled.reason,
                            "Server cancelled request"
                        );
                        token.cancel();
                    }
                    None => {
                        tracing::debug!(id = %cancelled.request_id, "Cancellation for unknown request");
                    }
                }
            }
            notifications::MESSAGE => match serde_json::from_value::<LoggingMessageParams>(params) {
                Ok(message) => log_server_message(&message),
                Err(e) => tracing::debug!(error = %e, "Malformed log notification"),
            },
            notifications::PROGRESS => {
                if let Ok(progress) = serde_json::from_value::<ProgressParams>(params) {
                    tracing::debug!(
                        progress = progress.progress,
                        total = ?progress.total,
                        message = ?progress.message,
                        "Progress"
                    );
                }
            }
            notifications::TOOLS_LIST_CHANGED
            | notifications::RESOURCES_LIST_CHANGED
            | notifications::PROMPTS_LIST_CHANGED => {
                tracing::info!(method = %notification.method, "Server list changed");
            }
            other => {
                tracing::debug!(method = %other, "Ignoring notification");
            }
        }
    }
}

async fn run_receive_loop(
    inner: Weak<Inner>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Receive loop stopped");
                return;
            }
            received = transport.receive() => received,
        };

        match received {
            Ok(Some(frame)) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                tracing::trace!(frame = %frame, "Received frame");
                inner.handle_frame(&frame).await;
            }
            Ok(None) => {
                tracing::info!("Transport closed");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Transport receive failed");
                break;
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.connection_lost();
    }
}

async fn run_sampling(
    handler: Arc<dyn SamplingHandler>,
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    in_flight: InFlightTable,
    id: RequestId,
    token: CancellationToken,
    params: CreateMessageParams,
) {
    let outcome = handler.create_message(token.clone(), params).await;

    if let Ok(mut in_flight) = in_flight.lock() {
        in_flight.remove(&id);
    }

    if token.is_cancelled() {
        tracing::info!(id = %id, "Sampling request cancelled, dropping reply");
        return;
    }

    let response = match outcome {
        Ok(reply) => match serde_json::to_value(CreateMessageResult::from(reply)) {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(e) => JsonRpcResponse::error(Some(id), JsonRpcError::internal_error(e.to_string())),
        },
        Err(err) => {
            tracing::warn!(id = %id, error = %err, "Sampling handler failed");
            JsonRpcResponse::error(Some(id), err.to_jsonrpc())
        }
    };

    send_response(&*transport, &token, send_timeout, response).await;
}

/// Write a response to a server request. The write is abandoned when
/// `stop` fires or `limit` elapses so a stalled transport cannot wedge the
/// receive loop.
async fn send_response(
    transport: &dyn Transport,
    stop: &CancellationToken,
    limit: Duration,
    response: JsonRpcResponse,
) {
    let frame = match serde_json::to_string(&response) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            return;
        }
    };
    let sent = tokio::select! {
        _ = stop.cancelled() => {
            tracing::debug!("Session closing, response dropped");
            return;
        }
        sent = tokio::time::timeout(limit, transport.send(frame)) => sent,
    };
    match sent {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to send response"),
        Err(_) => tracing::warn!(timeout = ?limit, "Timed out sending response"),
    }
}

fn log_server_message(message: &LoggingMessageParams) {
    let logger = message.logger.as_deref().unwrap_or("server");
    let data = message
        .data
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_default();

    match message.level {
        LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
            tracing::error!(logger = %logger, data = %data, "Server log")
        }
        LogLevel::Warning => tracing::warn!(logger = %logger, data = %data, "Server log"),
        LogLevel::Notice | LogLevel::Info => {
            tracing::info!(logger = %logger, data = %data, "Server log")
        }
        LogLevel::Debug => tracing::debug!(logger = %logger, data = %data, "Server log"),
    }
}
