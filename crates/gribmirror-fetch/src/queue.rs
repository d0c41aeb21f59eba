//! Bounded multi-producer queue feeding the dispatcher.
//!
//! # Design
//! - Producers are the planner and failing fetch tasks; both hold clones of
//!   the same [`FetchQueue`].
//! - A full queue makes producers wait. Intents are never dropped.
//! - Each intent is registered with the [`CompletionTracker`] before it
//!   enters the channel and travels with its [`PendingGuard`].

use gribmirror_events::{Event, EventBus};
use gribmirror_telemetry::Metrics;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::intent::FetchIntent;
use crate::tracker::{CompletionTracker, PendingGuard};

/// An intent paired with its tracker registration.
#[derive(Debug)]
pub struct QueuedIntent {
    /// Work item.
    pub intent: FetchIntent,
    /// Registration released when the work terminates.
    pub pending: PendingGuard,
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct FetchQueue {
    sender: mpsc::Sender<QueuedIntent>,
    tracker: CompletionTracker,
    metrics: Metrics,
    events: EventBus,
}

/// Single consumer end, owned by the dispatcher.
pub struct FetchReceiver {
    receiver: mpsc::Receiver<QueuedIntent>,
    metrics: Metrics,
}

impl FetchQueue {
    /// Create a queue holding at most `capacity` intents.
    #[must_use]
    pub fn bounded(
        capacity: usize,
        tracker: CompletionTracker,
        metrics: Metrics,
        events: EventBus,
    ) -> (Self, FetchReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                tracker,
                metrics: metrics.clone(),
                events,
            },
            FetchReceiver { receiver, metrics },
        )
    }

    /// Enqueue `intent`, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::EmptyIntent`] for the sentinel intent and
    /// [`FetchError::QueueClosed`] once the dispatcher has stopped.
    pub async fn submit(&self, intent: FetchIntent) -> FetchResult<()> {
        if intent.is_empty() {
            return Err(FetchError::EmptyIntent);
        }
        let pending = self.tracker.register();
        let path = intent.local_path().display().to_string();
        let attempt = intent.attempt;
        // Published before the send: a start event never precedes its enqueue.
        self.events.publish(Event::FetchQueued { path: path.clone() });
        self.metrics.inc_queue_depth();
        if self
            .sender
            .send(QueuedIntent { intent, pending })
            .await
            .is_err()
        {
            self.metrics.dec_queue_depth();
            return Err(FetchError::QueueClosed);
        }
        debug!(local_path = %path, attempt, "intent queued");
        Ok(())
    }

    /// Tracker this queue registers intents with.
    #[must_use]
    pub const fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }
}

impl FetchReceiver {
    /// Next intent, or `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<QueuedIntent> {
        let queued = self.receiver.recv().await?;
        self.metrics.dec_queue_depth();
        Some(queued)
    }

    /// Stop accepting intents and return whatever is still buffered.
    pub fn close(&mut self) -> Vec<QueuedIntent> {
        self.receiver.close();
        let mut remaining = Vec::new();
        while let Ok(queued) = self.receiver.try_recv() {
            self.metrics.dec_queue_depth();
            remaining.push(queued);
        }
        remaining
    }
}
