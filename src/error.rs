//! Error types for mcp-http-client

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::CallToolResult;
use crate::session::SessionPhase;

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Invalid JSON was received
    ParseError = -32700,
    /// The JSON sent is not a valid Request object
    InvalidRequest = -32600,
    /// The method does not exist / is not available
    MethodNotFound = -32601,
    /// Invalid method parameter(s)
    InvalidParams = -32602,
    /// Internal JSON-RPC error
    InternalError = -32603,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// mcp-http-client error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying channel failed. The session never retries these.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The initialize exchange failed; the session is still uninitialized.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server sent a reply the client could not make sense of.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The tool ran and reported a failure through `isError`.
    #[error("Tool '{tool}' reported an error: {}", .result.first_text().unwrap_or("(no message)"))]
    ToolExecution {
        tool: String,
        result: CallToolResult,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session closed")]
    Closed,

    #[error("Cannot {operation} while session is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("JSON-RPC error: {0}")]
    JsonRpc(JsonRpcError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Convert to the JSON-RPC error object sent back to the server when
    /// handling one of its requests fails.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            Error::JsonRpc(e) => e.clone(),
            Error::Validation(msg) => JsonRpcError::invalid_params(msg.clone()),
            Error::Serialization(e) => JsonRpcError::invalid_params(e.to_string()),
            other => JsonRpcError::internal_error(other.to_string()),
        }
    }
}

impl From<JsonRpcError> for Error {
    fn from(err: JsonRpcError) -> Self {
        Error::JsonRpc(err)
    }
}

/// Result type alias for mcp-http-client
pub type Result<T> = std::result::Result<T, Error>;
