//! Streamable HTTP client transport
//!
//! Implements the client half of the MCP Streamable HTTP transport:
//! - Every outbound frame is POSTed to a single endpoint
//! - `202 Accepted` carries no body (notifications, responses)
//! - `application/json` bodies are queued as one inbound frame
//! - `text/event-stream` bodies are decoded and each message event queued
//! - The `Mcp-Session-Id` header from the server is echoed on later requests
//! - [`HttpClientTransport::open_event_stream`] opens the optional GET stream
//!   the server uses for requests of its own (sampling); reopening it sends
//!   `Last-Event-ID` so the server can replay what was missed
//! - `close()` sends DELETE to end the server-side session
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_http_client::McpClient;
//! use mcp_http_client::transport::{HttpClientConfig, HttpClientTransport};
//!
//! # async fn run() -> mcp_http_client::Result<()> {
//! let transport = HttpClientTransport::new(
//!     HttpClientConfig::new("http://localhost:8080/mcp").bearer_token("secret"),
//! )?;
//! let client = McpClient::builder(transport).build();
//! client.initialize().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::Transport;
use super::sse::{SseDecoder, SseEvent};
use crate::error::{Error, Result};
use crate::protocol::LATEST_PROTOCOL_VERSION;

const SESSION_ID_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const ACCEPT_POST: &str = "application/json, text/event-stream";

type EventIdSlot = Arc<RwLock<Option<String>>>;

/// Configuration for [`HttpClientTransport`]
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub url: String,
    /// Sent as `MCP-Protocol-Version` on every request
    pub protocol_version: String,
    pub bearer_token: Option<String>,
    /// Extra headers added to every request
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            bearer_token: None,
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Client transport speaking MCP Streamable HTTP
pub struct HttpClientTransport {
    url: Url,
    http: reqwest::Client,
    base_headers: HeaderMap,
    session_id: RwLock<Option<String>>,
    last_event_id: EventIdSlot,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for HttpClientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientTransport")
            .field("url", &self.url.as_str())
            .field("session_id", &self.session_id())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl HttpClientTransport {
    /// Create a transport for the given endpoint.
    ///
    /// No connection is made until the first frame is sent.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::Transport(format!("Invalid URL '{}': {}", config.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Transport(format!(
                "Unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let base_headers = build_base_headers(&config)?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            url,
            http,
            base_headers,
            session_id: RwLock::new(None),
            last_event_id: Arc::new(RwLock::new(None)),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// The session ID assigned by the server, once known
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|guard| guard.clone())
    }

    /// Id of the last event seen on the GET stream
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.read().ok().and_then(|guard| guard.clone())
    }

    /// Open the GET event stream for server-initiated messages.
    ///
    /// Returns `Ok(false)` if the server does not offer one (405). Calling it
    /// again after the stream ended resumes from [`Self::last_event_id`].
    pub async fn open_event_stream(&self) -> Result<bool> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Transport("Transport closed".to_string()));
        }

        let mut headers = self.request_headers("text/event-stream");
        if let Some(last_id) = self.last_event_id()
            && let Ok(value) = HeaderValue::from_str(&last_id)
        {
            tracing::debug!(last_event_id = %last_id, "Resuming event stream");
            headers.insert(LAST_EVENT_ID_HEADER, value);
        }

        let response = self
            .http
            .get(self.url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("GET failed: {}", e)))?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            tracing::info!("Server does not offer a standalone event stream");
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "GET failed: {}",
                response.status()
            )));
        }

        tracing::info!(url = %self.url, "Event stream opened");
        tokio::spawn(pump_event_stream(
            response,
            self.inbound_tx.clone(),
            self.shutdown.clone(),
            Some(self.last_event_id.clone()),
        ));
        Ok(true)
    }

    fn request_headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = self.base_headers.clone();
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        if let Some(session_id) = self.session_id()
            && let Ok(value) = HeaderValue::from_str(&session_id)
        {
            headers.insert(SESSION_ID_HEADER, value);
        }
        headers
    }

    fn remember_session(&self, headers: &HeaderMap) {
        let Some(session_id) = headers
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };

        if let Ok(mut guard) = self.session_id.write()
            && guard.as_deref() != Some(session_id)
        {
            tracing::info!(session_id = %session_id, "Received session ID");
            *guard = Some(session_id.to_string());
        }
    }
}

fn build_base_headers(config: &HttpClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let version = HeaderValue::from_str(&config.protocol_version)
        .map_err(|e| Error::Transport(format!("Invalid protocol version header: {}", e)))?;
    headers.insert(PROTOCOL_VERSION_HEADER, version);

    if let Some(token) = &config.bearer_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Transport(format!("Invalid bearer token: {}", e)))?;
        headers.insert(header::AUTHORIZATION, value);
    }

    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Transport(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Transport(format!("Invalid value for header {}: {}", name, e)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Forward message events from an SSE body until it ends or we shut down.
/// Event ids are recorded in `resume` when given.
async fn pump_event_stream(
    response: reqwest::Response,
    inbound: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    resume: Option<EventIdSlot>,
) {
    let track = |event: &SseEvent| {
        if let (Some(slot), Some(id)) = (&resume, &event.id)
            && let Ok(mut guard) = slot.write()
        {
            *guard = Some(id.clone());
        }
    };

    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = tokio::select! {
            _ = shutdown.cancelled() => break,
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for event in decoder.push(&bytes) {
                    track(&event);
                    if event.is_message() && inbound.send(event.data).is_err() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Error reading event stream");
                break;
            }
            None => {
                if let Some(event) = decoder.finish() {
                    track(&event);
                    if event.is_message() {
                        let _ = inbound.send(event.data);
                    }
                }
                tracing::debug!("Event stream ended");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    async fn send(&self, frame: String) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Transport("Transport closed".to_string()));
        }

        tracing::debug!(url = %self.url, frame = %frame, "POST frame");
        let had_session = self.session_id().is_some();

        let response = self
            .http
            .post(self.url.clone())
            .headers(self.request_headers(ACCEPT_POST))
            .header(header::CONTENT_TYPE, "application/json")
            .body(frame)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("POST failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && had_session {
            return Err(Error::Transport("Session expired (404)".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("POST failed: {} {}", status, body)));
        }

        self.remember_session(response.headers());

        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("text/event-stream") {
            tokio::spawn(pump_event_stream(
                response,
                self.inbound_tx.clone(),
                self.shutdown.clone(),
                None,
            ));
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| Error::Transport(format!("Failed to read body: {}", e)))?;
            if !body.trim().is_empty() {
                self.inbound_tx
                    .send(body)
                    .map_err(|_| Error::Transport("Inbound queue closed".to_string()))?;
            }
        }

        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => Ok(None),
            frame = rx.recv() => Ok(frame),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.cancel();

        if self.session_id().is_some() {
            match self
                .http
                .delete(self.url.clone())
                .headers(self.request_headers(ACCEPT_POST))
                .send()
                .await
            {
                Ok(response) => {
                    tracing::info!(status = %response.status(), "Session terminated");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to terminate session");
                }
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(matches!(
            HttpClientTransport::new(HttpClientConfig::new("not a url")),
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            HttpClientTransport::new(HttpClientConfig::new("ftp://example.com/mcp")),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn test_base_headers() {
        let config = HttpClientConfig::new("http://localhost:8080/mcp")
            .bearer_token("abc")
            .header("x-tenant", "acme");
        let headers = build_base_headers(&config).unwrap();

        assert_eq!(headers[PROTOCOL_VERSION_HEADER], LATEST_PROTOCOL_VERSION);
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc");
        assert_eq!(headers["x-tenant"], "acme");
    }

    #[test]
    fn test_invalid_header_name() {
        let config = HttpClientConfig::new("http://localhost/mcp").header("bad header", "v");
        assert!(build_base_headers(&config).is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_without_session() {
        let transport =
            HttpClientTransport::new(HttpClientConfig::new("http://127.0.0.1:9/mcp")).unwrap();
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(!transport.is_connected());
        assert!(transport.receive().await.unwrap().is_none());
        assert!(transport.send("{}".to_string()).await.is_err());
    }
}
