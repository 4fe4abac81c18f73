//! Stdio client transport
//!
//! Spawns an MCP server as a subprocess and exchanges line-delimited JSON
//! over its stdin/stdout. Stderr is inherited so server logs stay visible.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::Transport;
use crate::error::{Error, Result};

const CHILD_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client transport that communicates with a subprocess via stdio
pub struct StdioClientTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    connected: AtomicBool,
}

impl StdioClientTransport {
    /// Spawn a new subprocess and connect to it
    pub async fn spawn(program: &str, args: &[&str]) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to spawn {}: {}", program, e)))?;

        tracing::info!(program = %program, "Spawned MCP server process");

        Self::from_child(child)
    }

    /// Create from an existing child process
    pub fn from_child(mut child: Child) -> Result<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("Failed to get child stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("Failed to get child stdout".to_string()))?;

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            connected: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn send(&self, frame: String) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| Error::Transport("Stdin already closed".to_string()))?;

        tracing::debug!(frame = %frame, "Writing frame to child");
        stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| Error::Transport(format!("Failed to write: {}", e)))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| Error::Transport(format!("Failed to write newline: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("Failed to flush: {}", e)))?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>> {
        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| Error::Transport(format!("Failed to read: {}", e)))?;

            if bytes_read == 0 {
                tracing::info!("Child stdout closed");
                self.connected.store(false, Ordering::Release);
                return Ok(None);
            }

            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);

        // Closing stdin signals EOF to the server
        drop(self.stdin.lock().await.take());

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(CHILD_EXIT_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(status = ?status, "Child process exited");
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Error waiting for child");
            }
            Err(_) => {
                tracing::warn!("Timeout waiting for child, killing");
                let _ = child.kill().await;
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = StdioClientTransport::spawn("definitely-not-an-mcp-server-binary", &[]).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_round_trip_through_cat() {
        // `cat` echoes every line back, which is enough to exercise framing
        let transport = StdioClientTransport::spawn("cat", &[]).await.unwrap();

        transport
            .send(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#.to_string())
            .await
            .unwrap();
        let echoed = transport.receive().await.unwrap();
        assert_eq!(
            echoed.as_deref(),
            Some(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#)
        );

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(transport.send("{}".to_string()).await.is_err());
    }
}
