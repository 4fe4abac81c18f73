//! Sampling handlers
//!
//! When a server sends `sampling/createMessage`, the client forwards the
//! request to a [`SamplingHandler`]. The handler produces content, a model
//! name and a stop reason; the client stamps the `assistant` role itself, so
//! a handler cannot answer with any other role.
//!
//! # Example
//!
//! ```rust
//! use mcp_http_client::sampling::{FnSamplingHandler, SamplingReply};
//! use mcp_http_client::protocol::{SamplingContent, StopReason};
//!
//! let handler = FnSamplingHandler::new(|_cancel, params| async move {
//!     let turns = params.messages.len();
//!     Ok(SamplingReply::text(
//!         format!("seen {} messages", turns),
//!         "local-model",
//!         StopReason::EndTurn,
//!     ))
//! });
//! # let _ = handler;
//! ```

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{CreateMessageParams, CreateMessageResult, SamplingContent, StopReason};

/// Model name reported by [`EchoSamplingHandler`]
pub const ECHO_MODEL: &str = "mock-model-v1";

/// What a handler returns for one sampling request
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingReply {
    pub content: SamplingContent,
    pub model: String,
    pub stop_reason: StopReason,
}

impl SamplingReply {
    pub fn new(content: SamplingContent, model: impl Into<String>, stop_reason: StopReason) -> Self {
        Self {
            content,
            model: model.into(),
            stop_reason,
        }
    }

    /// Reply with a single text block
    pub fn text(text: impl Into<String>, model: impl Into<String>, stop_reason: StopReason) -> Self {
        Self::new(SamplingContent::text(text), model, stop_reason)
    }
}

impl From<SamplingReply> for CreateMessageResult {
    fn from(reply: SamplingReply) -> Self {
        CreateMessageResult::new(reply.content, reply.model, reply.stop_reason)
    }
}

/// Generates messages on behalf of the server.
///
/// `cancel` fires when the server sends `notifications/cancelled` for the
/// request or the session closes. Handlers should stop work and return
/// promptly once it does; whatever they return afterwards is dropped.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(
        &self,
        cancel: CancellationToken,
        params: CreateMessageParams,
    ) -> Result<SamplingReply>;
}

/// Reject sampling requests that carry no messages
pub fn validate_request(params: &CreateMessageParams) -> Result<()> {
    if params.messages.is_empty() {
        return Err(Error::validation("no messages provided"));
    }
    Ok(())
}

/// Adapts an async closure into a [`SamplingHandler`]
pub struct FnSamplingHandler<F> {
    f: F,
}

impl<F, Fut> FnSamplingHandler<F>
where
    F: Fn(CancellationToken, CreateMessageParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<SamplingReply>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> SamplingHandler for FnSamplingHandler<F>
where
    F: Fn(CancellationToken, CreateMessageParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<SamplingReply>> + Send,
{
    async fn create_message(
        &self,
        cancel: CancellationToken,
        params: CreateMessageParams,
    ) -> Result<SamplingReply> {
        (self.f)(cancel, params).await
    }
}

/// Stand-in for a real model: answers with the text of the last message
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoSamplingHandler;

#[async_trait]
impl SamplingHandler for EchoSamplingHandler {
    async fn create_message(
        &self,
        _cancel: CancellationToken,
        params: CreateMessageParams,
    ) -> Result<SamplingReply> {
        validate_request(&params)?;

        let user_text = params
            .last_message()
            .and_then(|m| m.content.as_text())
            .unwrap_or("");
        let response = format!("Mock LLM response to: '{}'", user_text);

        tracing::info!(response = %response, "Mock LLM generating response");

        Ok(SamplingReply::text(response, ECHO_MODEL, StopReason::EndTurn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Role, SamplingMessage};

    #[test]
    fn test_validate_rejects_empty_messages() {
        let params = CreateMessageParams::new(vec![], 100);
        let err = validate_request(&params).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "no messages provided"));
    }

    #[tokio::test]
    async fn test_echo_uses_last_message() {
        let params = CreateMessageParams::new(
            vec![
                SamplingMessage::user("first"),
                SamplingMessage::assistant("ok"),
                SamplingMessage::user("summarize the schema"),
            ],
            256,
        );

        let reply = EchoSamplingHandler
            .create_message(CancellationToken::new(), params)
            .await
            .unwrap();

        assert_eq!(
            reply.content.as_text(),
            Some("Mock LLM response to: 'summarize the schema'")
        );
        assert_eq!(reply.model, ECHO_MODEL);
        assert_eq!(reply.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn test_echo_non_text_message_yields_empty_quote() {
        let mut message = SamplingMessage::user("");
        message.content = SamplingContent::Image {
            data: "aGk=".to_string(),
            mime_type: "image/png".to_string(),
        };
        let params = CreateMessageParams::new(vec![message], 16);

        let reply = EchoSamplingHandler
            .create_message(CancellationToken::new(), params)
            .await
            .unwrap();
        assert_eq!(reply.content.as_text(), Some("Mock LLM response to: ''"));
    }

    #[tokio::test]
    async fn test_fn_handler_sees_cancellation() {
        let handler = FnSamplingHandler::new(|cancel: CancellationToken, _params| async move {
            cancel.cancelled().await;
            Err::<SamplingReply, Error>(Error::validation("cancelled"))
        });

        let token = CancellationToken::new();
        token.cancel();
        let result = handler
            .create_message(token, CreateMessageParams::new(vec![SamplingMessage::user("hi")], 8))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_converts_with_assistant_role() {
        let result: CreateMessageResult =
            SamplingReply::text("done", "m", StopReason::MaxTokens).into();
        assert_eq!(result.role(), Role::Assistant);
        assert_eq!(result.stop_reason, StopReason::MaxTokens);
    }
}
