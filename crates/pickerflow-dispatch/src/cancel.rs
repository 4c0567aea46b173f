//! Cancellation mark shared by the dispatcher and its sessions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Position of a session relative to cancel requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionStamp(pub u64);

/// Records the most recent cancel request.
///
/// Each cancel advances a generation counter. A session captures the
/// generation when it starts and is cancelled once the counter has moved
/// past it. Clones share the same mark.
#[derive(Debug, Clone, Default)]
pub struct CancellationMark {
    generation: Arc<AtomicU64>,
}

impl CancellationMark {
    /// Create a mark with no cancellation recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp for a session starting now.
    pub fn stamp(&self) -> SessionStamp {
        SessionStamp(self.generation.load(Ordering::Acquire))
    }

    /// Record a cancel request. Every session stamped before it is cancelled.
    pub fn cancel(&self) -> SessionStamp {
        SessionStamp(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Check if a cancel was requested after the session started.
    pub fn is_cancelled(&self, stamp: SessionStamp) -> bool {
        self.generation.load(Ordering::Acquire) > stamp.0
    }
}
