//! Session bookkeeping.

use serde::{Deserialize, Serialize};

/// Where a confirmation session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Building,
    Dispatching,
    Aggregating,
    Done,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Building => write!(f, "Building"),
            Self::Dispatching => write!(f, "Dispatching"),
            Self::Aggregating => write!(f, "Aggregating"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Request counts for one confirmation attempt.
///
/// `started >= succeeded + failed` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Operations handed to the network.
    pub started: usize,
    /// Operations that succeeded.
    pub succeeded: usize,
    /// Operations that failed.
    pub failed: usize,
    /// Operations enqueued for this session.
    pub total: usize,
}

impl SessionCounters {
    /// Create counters for a session with `total` operations.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Record that an operation was launched.
    pub fn start(&mut self) {
        self.started += 1;
    }

    /// Record that an operation finished.
    pub fn finish(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        debug_assert!(self.started >= self.completed());
    }

    /// Operations that finished either way.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Operations launched but not finished.
    pub fn in_flight(&self) -> usize {
        self.started - self.completed()
    }

    /// Check if every enqueued operation finished.
    pub fn is_complete(&self) -> bool {
        self.completed() == self.total
    }

    /// Check if any operation failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        if self.failed == 0 {
            format!("{} of {} items done", self.succeeded, self.total)
        } else {
            format!(
                "{} of {} items done, {} failed",
                self.succeeded, self.total, self.failed
            )
        }
    }
}
