//! Event payload types emitted by the fetch pipeline.

use chrono::{DateTime, Utc};

/// Identifier assigned to each event emitted by the pipeline.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed pipeline events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Discovery finished listing the remote tree.
    DiscoveryCompleted {
        /// Number of relevant folders found.
        folders: usize,
        /// Number of payload files found across all folders.
        files: usize,
    },
    /// An intent entered the fetch queue.
    FetchQueued {
        /// Local target path.
        path: String,
    },
    /// A fetch attempt acquired an admission slot.
    FetchStarted {
        /// Local target path.
        path: String,
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// A file was fully written to the local mirror.
    FetchCompleted {
        /// Local target path.
        path: String,
        /// Bytes written.
        bytes: u64,
    },
    /// An admitted intent found its target already complete.
    FetchSkipped {
        /// Local target path.
        path: String,
    },
    /// A fetch attempt failed and will be retried.
    FetchFailed {
        /// Local target path.
        path: String,
        /// Attempt number that failed.
        attempt: u32,
        /// Stage at which the attempt failed.
        stage: String,
        /// Rendered error chain.
        message: String,
    },
    /// An intent exhausted its attempts.
    FetchDeadLettered {
        /// Local target path.
        path: String,
        /// Attempts made.
        attempts: u32,
        /// Last error observed.
        message: String,
    },
    /// The pipeline drained all outstanding work.
    DrainCompleted {
        /// Files fetched during the run.
        completed: u64,
        /// Intents that exhausted their attempts.
        dead_lettered: u64,
    },
}

impl Event {
    /// Machine-friendly discriminator for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DiscoveryCompleted { .. } => "discovery_completed",
            Self::FetchQueued { .. } => "fetch_queued",
            Self::FetchStarted { .. } => "fetch_started",
            Self::FetchCompleted { .. } => "fetch_completed",
            Self::FetchSkipped { .. } => "fetch_skipped",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::FetchDeadLettered { .. } => "fetch_dead_lettered",
            Self::DrainCompleted { .. } => "drain_completed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}
