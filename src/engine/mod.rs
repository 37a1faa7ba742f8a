// src/engine/mod.rs

//! Commit engine.
//!
//! This module ties together:
//! - the dependents queue (ordering + dedup of pending bindings)
//! - the commit session state machine that runs top-level subsystems and
//!   drains their dependents
//! - the cooperative cancel flag checked between pipelines

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod queue;
pub mod session;

pub use queue::DependentsQueue;
pub use session::{CommitSession, GraphSource};

/// Lifecycle of a [`CommitSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Ready,
    Running,
}

/// Whether a session is an ordinary commit driver or the host of the
/// daemon-owned queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionRole {
    #[default]
    Standalone,
    DaemonHost,
}

/// Result of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Display names in the order their pipelines completed.
    pub applied: Vec<String>,
}

/// Session-level cancel flag, checked before each drain step.
///
/// Clones share the same flag, so a signal handler can hold one while the
/// session holds another.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancel so the session can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
