//! Outbound RPC tracing middleware.
//!
//! [`RpcTracingLayer`] wraps any `Service<RpcRequest>` (normally an
//! [`McpClient`](crate::McpClient)) and records a span plus a completion
//! event for each request it issues.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_http_client::{McpClient, RpcRequest, RpcTracingLayer};
//! use mcp_http_client::transport::ChannelTransport;
//! use tower::{Layer, ServiceExt};
//!
//! # async fn run() -> mcp_http_client::Result<()> {
//! let (client_end, _server_end) = ChannelTransport::pair();
//! let client = McpClient::new(client_end);
//! client.initialize().await?;
//!
//! let traced = RpcTracingLayer::new().layer(client);
//! let tools = traced.oneshot(RpcRequest::new("tools/list")).await?;
//! # let _ = tools;
//! # Ok(())
//! # }
//! ```
//!
//! # Logged Information
//!
//! - Request method (e.g. `tools/call`)
//! - Tool name for `tools/call`
//! - Duration
//! - Error kind on failure
//!
//! # Log Levels
//!
//! - Configured level (default `INFO`): span and completion
//! - `WARN`: failed requests

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use serde_json::Value;
use tower::Layer;
use tower_service::Service;
use tracing::{Instrument, Level, Span};

use crate::client::RpcRequest;
use crate::error::Error;
use crate::protocol::methods;

/// Tower layer that adds structured tracing to outbound MCP requests.
#[derive(Debug, Clone, Copy)]
pub struct RpcTracingLayer {
    level: Level,
}

impl Default for RpcTracingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcTracingLayer {
    /// Create a new tracing layer at INFO level.
    pub fn new() -> Self {
        Self { level: Level::INFO }
    }

    /// Set the level for spans and completion events.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl<S> Layer<S> for RpcTracingLayer {
    type Service = RpcTracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RpcTracingService {
            inner,
            level: self.level,
        }
    }
}

/// Service created by [`RpcTracingLayer`].
#[derive(Debug, Clone)]
pub struct RpcTracingService<S> {
    inner: S,
    level: Level,
}

impl<S> Service<RpcRequest> for RpcTracingService<S>
where
    S: Service<RpcRequest, Response = Value, Error = Error> + Send + 'static,
    S::Future: Send,
{
    type Response = Value;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Value, Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RpcRequest) -> Self::Future {
        let method = req.method.clone();
        let tool = tool_name(&req);
        let span = create_span(self.level, &method, tool.as_deref());

        let start = Instant::now();
        let fut = self.inner.call(req);
        let level = self.level;

        Box::pin(
            async move {
                let result = fut.await;
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

                match &result {
                    Ok(_) => log_success(level, &method, duration_ms),
                    Err(err) => {
                        tracing::warn!(
                            method = %method,
                            error = %err,
                            duration_ms = duration_ms,
                            "MCP request failed"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

fn tool_name(req: &RpcRequest) -> Option<String> {
    if req.method != methods::TOOLS_CALL {
        return None;
    }
    req.params
        .as_ref()
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn create_span(level: Level, method: &str, tool: Option<&str>) -> Span {
    match level {
        Level::TRACE => tracing::trace_span!("mcp_request", method = %method, tool = tool),
        Level::DEBUG => tracing::debug_span!("mcp_request", method = %method, tool = tool),
        Level::INFO => tracing::info_span!("mcp_request", method = %method, tool = tool),
        Level::WARN => tracing::warn_span!("mcp_request", method = %method, tool = tool),
        Level::ERROR => tracing::error_span!("mcp_request", method = %method, tool = tool),
    }
}

fn log_success(level: Level, method: &str, duration_ms: f64) {
    match level {
        Level::TRACE => {
            tracing::trace!(method = %method, duration_ms = duration_ms, "MCP request completed")
        }
        Level::DEBUG => {
            tracing::debug!(method = %method, duration_ms = duration_ms, "MCP request completed")
        }
        Level::INFO => {
            tracing::info!(method = %method, duration_ms = duration_ms, "MCP request completed")
        }
        Level::WARN => {
            tracing::warn!(method = %method, duration_ms = duration_ms, "MCP request completed")
        }
        Level::ERROR => {
            tracing::error!(method = %method, duration_ms = duration_ms, "MCP request completed")
        }
    }
}
