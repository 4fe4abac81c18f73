//! In-memory transport
//!
//! [`ChannelTransport::pair`] returns two connected ends. Frames sent on one
//! end are received on the other. Closing either end ends the stream for
//! both.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::error::{Error, Result};

/// One end of an in-memory duplex channel
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: CancellationToken,
    connected: AtomicBool,
}

impl ChannelTransport {
    /// Create two connected transport ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let a = Self {
            tx: a_tx,
            rx: Mutex::new(a_rx),
            closed: closed.clone(),
            connected: AtomicBool::new(true),
        };
        let b = Self {
            tx: b_tx,
            rx: Mutex::new(b_rx),
            closed,
            connected: AtomicBool::new(true),
        };
        (a, b)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: String) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::Transport("Channel closed".to_string()));
        }
        tracing::trace!(frame = %frame, "Channel send");
        self.tx
            .send(frame)
            .map_err(|_| Error::Transport("Peer dropped".to_string()))
    }

    async fn receive(&self) -> Result<Option<String>> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Ok(None),
            frame = rx.recv() => {
                if frame.is_none() {
                    self.connected.store(false, Ordering::Release);
                }
                Ok(frame)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        self.closed.cancel();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (client, server) = ChannelTransport::pair();

        client.send("ping".to_string()).await.unwrap();
        assert_eq!(server.receive().await.unwrap().as_deref(), Some("ping"));

        server.send("pong".to_string()).await.unwrap();
        assert_eq!(client.receive().await.unwrap().as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_close_ends_both_sides() {
        let (client, server) = ChannelTransport::pair();

        client.close().await.unwrap();
        client.close().await.unwrap();

        assert!(!client.is_connected());
        assert!(!server.is_connected());
        assert!(server.receive().await.unwrap().is_none());
        assert!(client.send("late".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_peer_ends_stream() {
        let (client, server) = ChannelTransport::pair();
        drop(server);

        assert!(client.receive().await.unwrap().is_none());
        assert!(client.send("nobody".to_string()).await.is_err());
    }
}
