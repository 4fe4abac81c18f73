//! MCP protocol types based on JSON-RPC 2.0
//!
//! These types follow the MCP specification (2025-06-18):
//! https://modelcontextprotocol.io/specification/2025-06-18
//!
//! Only the client side of the protocol is modelled: requests the client
//! sends (initialize, ping, tools), the replies it parses, and the
//! server-initiated requests it answers (sampling, ping).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, JsonRpcError, Result};

/// Value of the `jsonrpc` member on every frame
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision offered in `initialize`
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Revisions accepted back from a server, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Request method names
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    /// Server -> client request for an LLM completion
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
    /// Server -> client request for the client's filesystem roots
    pub const ROOTS_LIST: &str = "roots/list";
}

/// Notification method names
pub mod notifications {
    /// Client -> server, once the handshake reply is accepted
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Either direction; names the request id to abandon
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const PROGRESS: &str = "notifications/progress";
    /// Server log line
    pub const MESSAGE: &str = "notifications/message";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
}

fn check_version(version: &str) -> std::result::Result<(), JsonRpcError> {
    if version == JSONRPC_VERSION {
        Ok(())
    } else {
        Err(JsonRpcError::invalid_request(format!(
            "Unsupported jsonrpc version '{}'",
            version
        )))
    }
}

/// A request frame, in either direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(self, params: Value) -> Self {
        Self {
            params: Some(params),
            ..self
        }
    }

    /// Rejects frames whose `jsonrpc` member is not `"2.0"`
    pub fn validate(&self) -> std::result::Result<(), JsonRpcError> {
        check_version(&self.jsonrpc)
    }
}

/// The `result` or `error` half of a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseOutcome {
    Error { error: JsonRpcError },
    Result { result: Value },
}

/// A response frame. `id` is null only for errors that cannot be
/// attributed to a request, such as a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    pub fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id),
            outcome: ResponseOutcome::Result { result },
        }
    }

    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            outcome: ResponseOutcome::Error { error },
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Error { .. })
    }

    /// The result payload, or the error the peer reported
    pub fn into_result(self) -> Result<Value> {
        match self.outcome {
            ResponseOutcome::Result { result } => Ok(result),
            ResponseOutcome::Error { error } => Err(Error::JsonRpc(error)),
        }
    }
}

/// A notification frame; never answered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(self, params: Value) -> Self {
        Self {
            params: Some(params),
            ..self
        }
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Decode one transport frame, which holds a single message or a batch.
    pub fn parse_frame(frame: &str) -> Result<Vec<IncomingMessage>> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| Error::Protocol(format!("Invalid JSON frame: {}", e)))?;

        match value {
            Value::Array(items) => items.into_iter().map(Self::classify).collect(),
            single => Self::classify(single).map(|m| vec![m]),
        }
    }

    // `method` + non-null `id` is a request, `method` alone a notification;
    // anything else must carry `error`, or `result` with an id.
    fn classify(value: Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(Error::Protocol(
                "JSON-RPC message must be an object".to_string(),
            ));
        };

        let has_id = obj.get("id").is_some_and(|id| !id.is_null());
        let has_method = obj.contains_key("method");
        let is_response = obj.contains_key("error") || (has_id && obj.contains_key("result"));

        Ok(match (has_method, has_id) {
            (true, true) => IncomingMessage::Request(serde_json::from_value(value)?),
            (true, false) => IncomingMessage::Notification(serde_json::from_value(value)?),
            (false, _) if is_response => IncomingMessage::Response(serde_json::from_value(value)?),
            (false, _) => {
                return Err(Error::Protocol(
                    "Frame is not a request, response or notification".to_string(),
                ));
            }
        })
    }
}

/// JSON-RPC request id: a string or an integer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => f.write_str(s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        i64::from(n).into()
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Parameters for cancellation notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    /// The ID of the request to cancel
    pub request_id: RequestId,
    /// Optional reason for cancellation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Parameters for progress notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// The progress token from the original request
    pub progress_token: ProgressToken,
    /// Current progress value (must increase with each notification)
    pub progress: f64,
    /// Total expected value (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable progress message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Progress token - can be string or number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

/// Request metadata that can include progress token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Progress token for receiving progress notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

/// Log severity levels following RFC 5424 (syslog)
///
/// Levels are ordered from most severe (emergency) to least severe (debug).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    #[default]
    Info,
    Debug,
}

/// Parameters of a `notifications/message` log notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// =============================================================================
// Initialize
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

impl ClientCapabilities {
    /// Advertise sampling support
    pub fn with_sampling(mut self) -> Self {
        self.sampling = Some(SamplingCapability {});
        self
    }

    /// Advertise `roots/list` support
    pub fn with_roots(mut self, list_changed: bool) -> Self {
        self.roots = Some(RootsCapability { list_changed });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// A directory or file the client exposes to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    /// Must be a `file://` URI
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    pub roots: Vec<Root>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SamplingCapability {}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    /// Optional instructions describing how to use this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    /// Servers that emit log notifications declare this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

// =============================================================================
// Tools
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Tool definition as returned by tools/list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
    /// Clients MUST consider these untrusted unless from a trusted server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: serde_json::json!({ "type": "object" }),
            annotations: None,
        }
    }
}

/// A single tool call: the tool name plus its JSON arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    /// Add one argument
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Replace all arguments
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Request metadata including progress token
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

impl From<ToolInvocation> for CallToolParams {
    fn from(invocation: ToolInvocation) -> Self {
        Self {
            name: invocation.name,
            arguments: invocation.arguments,
            meta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
            structured_content: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            structured_content: None,
        }
    }

    pub fn json(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        Self {
            content: vec![Content::text(text)],
            is_error: false,
            structured_content: Some(value),
        }
    }

    /// Text of the first text block, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(Content::as_text)
    }

    /// All text blocks joined with newlines
    pub fn all_text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Content types for tool results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<Value>,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<Value>,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<Value>,
    },
    Resource {
        resource: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<Value>,
    },
    /// Pointer to a resource the client may fetch separately
    ResourceLink {
        uri: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<Value>,
    },
    /// A content type from a newer protocol revision
    #[serde(other)]
    Unknown,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text {
            text: text.into(),
            annotations: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

// =============================================================================
// Sampling
// =============================================================================

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Content of a sampling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplingContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl SamplingContent {
    pub fn text(text: impl Into<String>) -> Self {
        SamplingContent::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SamplingContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One role-tagged message in a sampling conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: SamplingContent,
}

impl SamplingMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: SamplingContent::text(text),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: SamplingContent::text(text),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: SamplingContent::text(text),
        }
    }
}

/// Hint used to select a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Server preferences for model selection, priorities in 0.0..=1.0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPreferences {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<ModelHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// Which MCP server context the client should attach to the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncludeContext {
    None,
    ThisServer,
    AllServers,
}

/// Parameters of a `sampling/createMessage` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// Conversation so far, oldest first
    #[serde(default)]
    pub messages: Vec<SamplingMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_context: Option<IncludeContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CreateMessageParams {
    pub fn new(messages: Vec<SamplingMessage>, max_tokens: u32) -> Self {
        Self {
            messages,
            model_preferences: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens: Some(max_tokens),
            stop_sequences: Vec::new(),
            metadata: None,
        }
    }

    /// The most recent message in the conversation
    pub fn last_message(&self) -> Option<&SamplingMessage> {
        self.messages.last()
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    Error,
}

/// Result of a `sampling/createMessage` request.
///
/// The role is always [`Role::Assistant`]; there is no way to build one
/// with any other role.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    role: Role,
    pub content: SamplingContent,
    pub model: String,
    pub stop_reason: StopReason,
}

impl CreateMessageResult {
    pub fn new(content: SamplingContent, model: impl Into<String>, stop_reason: StopReason) -> Self {
        Self {
            role: Role::Assistant,
            content,
            model: model.into(),
            stop_reason,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

// =============================================================================
// Common
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyResult {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_frame() {
        let frame = r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#;
        let messages = IncomingMessage::parse_frame(frame).unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            IncomingMessage::Response(resp) => {
                assert_eq!(resp.id(), Some(&RequestId::Number(7)));
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_response_with_null_id() {
        let frame = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"bad"}}"#;
        let messages = IncomingMessage::parse_frame(frame).unwrap();
        match &messages[0] {
            IncomingMessage::Response(resp) => {
                assert!(resp.id().is_none());
                assert!(resp.is_error());
                let err = resp.clone().into_result().unwrap_err();
                assert!(matches!(err, Error::JsonRpc(ref e) if e.code == -32700));
            }
            other => panic!("Expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_response_wire_shape() {
        let ok = serde_json::to_value(JsonRpcResponse::result(RequestId::from("a"), json!({}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": "a", "result": {}}));

        let err = serde_json::to_value(JsonRpcResponse::error(
            Some(RequestId::Number(3)),
            JsonRpcError::method_not_found("roots/list"),
        ))
        .unwrap();
        assert_eq!(err["id"], 3);
        assert_eq!(err["error"]["code"], -32601);
        assert!(err.get("result").is_none());

        let unattributed =
            serde_json::to_value(JsonRpcResponse::error(None, JsonRpcError::parse_error("bad"))).unwrap();
        assert!(unattributed["id"].is_null());
        assert!(unattributed.as_object().unwrap().contains_key("id"));
    }

    #[test]
    fn test_parse_request_and_notification() {
        let frame = json!([
            {"jsonrpc": "2.0", "id": "s-1", "method": "sampling/createMessage", "params": {"messages": []}},
            {"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}
        ])
        .to_string();

        let messages = IncomingMessage::parse_frame(&frame).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(
            matches!(&messages[0], IncomingMessage::Request(r) if r.method == methods::SAMPLING_CREATE_MESSAGE)
        );
        assert!(
            matches!(&messages[1], IncomingMessage::Notification(n) if n.method == notifications::TOOLS_LIST_CHANGED)
        );
    }

    #[test]
    fn test_parse_rejects_non_message() {
        assert!(IncomingMessage::parse_frame("42").is_err());
        assert!(IncomingMessage::parse_frame(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(IncomingMessage::parse_frame("not json").is_err());
    }

    #[test]
    fn test_tool_invocation_serializes_arguments() {
        let invocation = ToolInvocation::new("execute_query")
            .arg("query", "SELECT 1")
            .arg("limit", 10)
            .arg("dry_run", false)
            .arg("filters", json!({"region": null, "tags": ["a", "b"]}));

        let params = CallToolParams::from(invocation);
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["name"], "execute_query");
        assert_eq!(value["arguments"]["limit"], 10);
        assert_eq!(value["arguments"]["dry_run"], false);
        assert!(value["arguments"]["filters"]["region"].is_null());
        assert!(value.get("_meta").is_none());
    }

    #[test]
    fn test_tool_definition_requires_name() {
        let missing_name = json!({"description": "no name here", "inputSchema": {}});
        assert!(serde_json::from_value::<ToolDefinition>(missing_name).is_err());
    }

    #[test]
    fn test_create_message_result_wire_shape() {
        let result = CreateMessageResult::new(
            SamplingContent::text("hi"),
            "mock-model-v1",
            StopReason::EndTurn,
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "assistant",
                "content": {"type": "text", "text": "hi"},
                "model": "mock-model-v1",
                "stopReason": "endTurn"
            })
        );
    }

    #[test]
    fn test_initialize_params_wire_shape() {
        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default().with_sampling(),
            client_info: Implementation::new("mcp-http-client", "1.0.0"),
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["protocolVersion"], LATEST_PROTOCOL_VERSION);
        assert_eq!(value["capabilities"], json!({"sampling": {}}));
        assert_eq!(value["clientInfo"]["name"], "mcp-http-client");
    }

    #[test]
    fn test_call_tool_result_with_resource_link() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "ok"},
                {"type": "resource_link", "uri": "file:///r.csv", "name": "r.csv", "mimeType": "text/csv"},
                {"type": "hologram", "frames": 3}
            ],
            "isError": true
        }))
        .unwrap();

        assert!(result.is_error);
        assert_eq!(result.all_text(), "ok");
        match &result.content[1] {
            Content::ResourceLink { uri, name, mime_type, .. } => {
                assert_eq!(uri, "file:///r.csv");
                assert_eq!(name, "r.csv");
                assert_eq!(mime_type.as_deref(), Some("text/csv"));
            }
            other => panic!("Expected resource link, got {:?}", other),
        }
        assert_eq!(result.content[2], Content::Unknown);
    }

    #[test]
    fn test_call_tool_result_text_helpers() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "text", "text": "line two"}
            ]
        }))
        .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("line one"));
        assert_eq!(result.all_text(), "line one\nline two");
    }
}
