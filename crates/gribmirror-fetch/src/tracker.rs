//! Join barrier signalling when all outstanding work has drained.

use std::sync::Arc;

use tokio::sync::watch;

/// Counts intents from submission until their attempt terminates.
///
/// A retry registers its successor before the failed attempt releases its
/// own registration, so the count cannot touch zero while a retry is in
/// transit.
#[derive(Clone, Debug)]
pub struct CompletionTracker {
    outstanding: Arc<watch::Sender<usize>>,
}

impl CompletionTracker {
    /// Tracker with nothing outstanding.
    #[must_use]
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(outstanding),
        }
    }

    /// Count one unit of work until the returned guard drops.
    #[must_use]
    pub fn register(&self) -> PendingGuard {
        self.outstanding.send_modify(|count| *count += 1);
        PendingGuard {
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Current number of registered units.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once the count reaches zero.
    pub async fn wait_idle(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration held by one unit of work; decrements exactly once on drop.
#[derive(Debug)]
pub struct PendingGuard {
    outstanding: Arc<watch::Sender<usize>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.outstanding
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}
