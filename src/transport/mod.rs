//! MCP client transports
//!
//! A transport is an opaque duplex channel of JSON-RPC frames. The session
//! core never looks at how frames are carried:
//! - `channel` - In-memory pair, for tests and in-process servers
//! - `stdio` - Line-delimited JSON over a child process's stdin/stdout
//! - `http` - Streamable HTTP (requires `http` feature)
//!
//! ## Synchronization
//!
//! All methods take `&self`. The session's receive loop sits in
//! [`Transport::receive`] while any number of callers use
//! [`Transport::send`], so implementations keep their read and write halves
//! behind separate locks.

use async_trait::async_trait;

use crate::error::Result;

pub mod channel;
pub mod stdio;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod sse;

pub use channel::ChannelTransport;
pub use stdio::StdioClientTransport;

#[cfg(feature = "http")]
pub use http::{HttpClientConfig, HttpClientTransport};

/// Duplex frame channel to an MCP server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one serialized JSON-RPC message
    async fn send(&self, frame: String) -> Result<()>;

    /// Wait for the next inbound frame.
    ///
    /// Returns `Ok(None)` once the channel has closed in an orderly way.
    async fn receive(&self) -> Result<Option<String>>;

    /// Release the channel. Calling this more than once is a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the transport is still connected
    fn is_connected(&self) -> bool;
}

/// Lets a caller keep a handle on a transport it gave to a client
#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, frame: String) -> Result<()> {
        (**self).send(frame).await
    }

    async fn receive(&self) -> Result<Option<String>> {
        (**self).receive().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
