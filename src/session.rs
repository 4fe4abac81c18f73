//! MCP session state management
//!
//! Tracks the lifecycle of a client session:
//! Uninitialized -> Initializing -> Ready -> Closed.
//! A failed handshake falls back from Initializing to Uninitialized.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// Initial state - only `initialize` may be sent
    Uninitialized = 0,
    /// `initialize` has been sent, waiting for the server's reply
    Initializing = 1,
    /// Handshake complete, normal operation
    Ready = 2,
    /// Closed locally or the transport was lost
    Closed = 3,
}

impl From<u8> for SessionPhase {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionPhase::Uninitialized,
            1 => SessionPhase::Initializing,
            2 => SessionPhase::Ready,
            _ => SessionPhase::Closed,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Uninitialized => write!(f, "uninitialized"),
            SessionPhase::Initializing => write!(f, "initializing"),
            SessionPhase::Ready => write!(f, "ready"),
            SessionPhase::Closed => write!(f, "closed"),
        }
    }
}

/// Shared session state that can be cloned across tasks.
///
/// Uses atomic operations for thread-safe state transitions.
#[derive(Clone)]
pub struct SessionState {
    phase: Arc<AtomicU8>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("phase", &self.phase())
            .finish()
    }
}

impl SessionState {
    /// Create a new session in the Uninitialized phase
    pub fn new() -> Self {
        Self {
            phase: Arc::new(AtomicU8::new(SessionPhase::Uninitialized as u8)),
        }
    }

    /// Get the current session phase
    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from(self.phase.load(Ordering::Acquire))
    }

    /// Check if the session is ready for normal operation
    pub fn is_ready(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    /// Check if the session has been closed
    pub fn is_closed(&self) -> bool {
        self.phase() == SessionPhase::Closed
    }

    /// Transition from Uninitialized to Initializing.
    /// Called before sending the `initialize` request.
    /// Returns true if the transition was successful.
    pub fn begin_initialize(&self) -> bool {
        self.transition(SessionPhase::Uninitialized, SessionPhase::Initializing)
    }

    /// Transition from Initializing to Ready.
    /// Returns true if the transition was successful.
    pub fn complete_initialize(&self) -> bool {
        self.transition(SessionPhase::Initializing, SessionPhase::Ready)
    }

    /// Transition from Initializing back to Uninitialized after a failed
    /// handshake. Returns true if the transition was successful.
    pub fn abort_initialize(&self) -> bool {
        self.transition(SessionPhase::Initializing, SessionPhase::Uninitialized)
    }

    /// Move to Closed from any phase, returning the phase that was left.
    pub fn close(&self) -> SessionPhase {
        SessionPhase::from(
            self.phase
                .swap(SessionPhase::Closed as u8, Ordering::AcqRel),
        )
    }

    fn transition(&self, from: SessionPhase, to: SessionPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let session = SessionState::new();

        // Initial state
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert!(!session.is_ready());

        // Transition to initializing
        assert!(session.begin_initialize());
        assert_eq!(session.phase(), SessionPhase::Initializing);

        // Can't begin initializing again
        assert!(!session.begin_initialize());

        // Transition to ready
        assert!(session.complete_initialize());
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.is_ready());

        // Ready can't go back through the handshake
        assert!(!session.begin_initialize());
        assert!(!session.abort_initialize());

        assert_eq!(session.close(), SessionPhase::Ready);
        assert!(session.is_closed());
        assert_eq!(session.close(), SessionPhase::Closed);
    }

    #[test]
    fn test_failed_handshake_is_retryable() {
        let session = SessionState::new();

        assert!(session.begin_initialize());
        assert!(session.abort_initialize());
        assert_eq!(session.phase(), SessionPhase::Uninitialized);

        assert!(session.begin_initialize());
        assert!(session.complete_initialize());
    }

    #[test]
    fn test_closed_blocks_handshake() {
        let session = SessionState::new();
        session.close();

        assert!(!session.begin_initialize());
        assert!(!session.complete_initialize());
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_session_clone_shares_state() {
        let session1 = SessionState::new();
        let session2 = session1.clone();

        session1.begin_initialize();
        assert_eq!(session2.phase(), SessionPhase::Initializing);

        session2.complete_initialize();
        assert_eq!(session1.phase(), SessionPhase::Ready);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SessionPhase::Uninitialized.to_string(), "uninitialized");
        assert_eq!(SessionPhase::Ready.to_string(), "ready");
    }
}
