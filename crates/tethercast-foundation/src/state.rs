use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

/// Why a capture session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    CleanShutdown,
    PipeBroken,
    DeviceLost(String),
}

/// Lifecycle of a single capture worker. Created `NotStarted`, moves to
/// `Running` once the first frame is flowing, and ends in `Terminated` on
/// every exit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Terminated(Termination),
}

/// Shared cell tracking the current session state, with transition
/// validation and a change feed for observers.
#[derive(Clone)]
pub struct SessionCell {
    state: Arc<RwLock<SessionState>>,
    tx: Sender<SessionState>,
    rx: Receiver<SessionState>,
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCell {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(SessionState::NotStarted)),
            tx,
            rx,
        }
    }

    /// Apply a transition. Invalid transitions are logged and ignored rather
    /// than propagated: the worker must keep tearing down regardless.
    pub fn transition(&self, next: SessionState) {
        let mut current = self.state.write();
        let valid = matches!(
            (&*current, &next),
            (SessionState::NotStarted, SessionState::Running)
                | (SessionState::NotStarted, SessionState::Terminated(_))
                | (SessionState::Running, SessionState::Terminated(_))
        );
        if !valid {
            tracing::warn!(from = ?*current, to = ?next, "invalid session transition ignored");
            return;
        }
        tracing::debug!(from = ?*current, to = ?next, "session transition");
        *current = next.clone();
        let _ = self.tx.send(next);
    }

    pub fn current(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<SessionState> {
        self.rx.clone()
    }
}
