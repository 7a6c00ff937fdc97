//! Run lifecycle and cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle of one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Collecting,
    Dispatched,
    Reducing,
    Complete,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Collecting, Self::Dispatched)
                | (Self::Collecting, Self::Failed)
                | (Self::Dispatched, Self::Reducing)
                | (Self::Dispatched, Self::Failed)
                | (Self::Reducing, Self::Complete)
                | (Self::Reducing, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Cooperative cancellation shared between a caller and a running evaluation.
///
/// Once cancelled, no further sub-tasks are dispatched; running ones finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
