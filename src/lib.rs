//! # mcp-http-client
//!
//! Model Context Protocol (MCP) client session core for Rust.
//!
//! The crate speaks JSON-RPC 2.0 to an MCP server over any [`Transport`],
//! performs the `initialize` handshake, issues `ping`, `tools/list` and
//! `tools/call`, and answers the server's `sampling/createMessage` requests
//! through a pluggable [`SamplingHandler`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_http_client::{McpClient, ToolInvocation};
//! use mcp_http_client::sampling::EchoSamplingHandler;
//! use mcp_http_client::transport::{HttpClientConfig, HttpClientTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpClientTransport::new(HttpClientConfig::new("http://localhost:8080/mcp"))?;
//!     let client = McpClient::builder(transport)
//!         .client_info("my-client", "1.0.0")
//!         .sampling_handler(EchoSamplingHandler)
//!         .build();
//!
//!     client.initialize().await?;
//!     client.ping().await?;
//!
//!     let result = client
//!         .call_tool(ToolInvocation::new("execute_query").arg("query", "SELECT 1"))
//!         .await?;
//!     println!("{}", result.all_text());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Key Types
//!
//! - [`McpClient`] - Session handle; cheap to clone
//! - [`Transport`] - Duplex frame channel (channel, stdio, HTTP)
//! - [`SamplingHandler`] - Produces messages for `sampling/createMessage`
//! - [`RpcTracingLayer`] - Tower middleware tracing outbound requests
//! - [`testing::MockServer`] - Scripted in-process server for tests
//!
//! ## Features
//!
//! - `http` (default) - Streamable HTTP transport built on reqwest

pub mod client;
pub mod error;
pub mod protocol;
pub mod sampling;
pub mod session;
pub mod testing;
pub mod tracing_layer;
pub mod transport;

pub use client::{DEFAULT_REQUEST_TIMEOUT, McpClient, McpClientBuilder, RpcRequest};
pub use error::{Error, ErrorCode, JsonRpcError, Result};
pub use protocol::{
    CallToolResult, ClientCapabilities, Content, CreateMessageParams, CreateMessageResult,
    Implementation, InitializeResult, Role, Root, SamplingContent, SamplingMessage, StopReason,
    ToolDefinition, ToolInvocation,
};
pub use sampling::{EchoSamplingHandler, FnSamplingHandler, SamplingHandler, SamplingReply};
pub use session::SessionPhase;
pub use tracing_layer::{RpcTracingLayer, RpcTracingService};
pub use transport::Transport;
