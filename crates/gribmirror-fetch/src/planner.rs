//! Dedup planner: compares discovered files against the local mirror.

use std::io::ErrorKind;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use gribmirror_remote::RemoteEntry;
use gribmirror_telemetry::Metrics;
use tracing::{debug, warn};

use crate::discovery::FileBatch;
use crate::error::FetchResult;
use crate::intent::FetchIntent;
use crate::queue::FetchQueue;

/// Outcome of comparing one remote entry with local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecision {
    /// No local file; fetch it.
    Fetch,
    /// A local file of the wrong size exists; delete and fetch it.
    Replace,
    /// The local file is complete.
    Skip,
}

impl PlanDecision {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "queued",
            Self::Replace => "replaced",
            Self::Skip => "skipped",
        }
    }
}

/// Decide what to do with `entry` given the local file size, if any.
#[must_use]
pub const fn plan_decision(entry: &RemoteEntry, local_size: Option<u64>) -> PlanDecision {
    match local_size {
        None => PlanDecision::Fetch,
        Some(size) if size == entry.size => PlanDecision::Skip,
        Some(_) => PlanDecision::Replace,
    }
}

/// Counts of planner decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanReport {
    /// Intents queued for files missing locally.
    pub queued: usize,
    /// Intents queued after deleting a stale local file.
    pub replaced: usize,
    /// Files already complete locally.
    pub skipped: usize,
}

impl PlanReport {
    /// Intents submitted to the queue.
    #[must_use]
    pub const fn submitted(&self) -> usize {
        self.queued + self.replaced
    }
}

impl AddAssign for PlanReport {
    fn add_assign(&mut self, other: Self) {
        self.queued += other.queued;
        self.replaced += other.replaced;
        self.skipped += other.skipped;
    }
}

/// Turns discovered batches into queued intents.
#[derive(Clone)]
pub struct Planner {
    base_dir: String,
    destination_root: PathBuf,
    metrics: Metrics,
}

impl Planner {
    /// Planner mirroring `base_dir` into `destination_root`.
    #[must_use]
    pub fn new(
        base_dir: impl Into<String>,
        destination_root: impl Into<PathBuf>,
        metrics: Metrics,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            destination_root: destination_root.into(),
            metrics,
        }
    }

    /// Plan every entry of `batch`, submitting intents in batch order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the queue stops accepting intents.
    pub async fn plan(&self, batch: &FileBatch, queue: &FetchQueue) -> FetchResult<PlanReport> {
        let mut report = PlanReport::default();
        for entry in &batch.entries {
            let intent = FetchIntent::new(
                self.base_dir.as_str(),
                batch.sub_dir.as_str(),
                entry.clone(),
                self.destination_root.as_path(),
            );
            let local_path = intent.local_path();
            let decision = plan_decision(entry, local_size(&local_path).await);
            self.metrics.inc_plan_decision(decision.as_str());
            match decision {
                PlanDecision::Skip => {
                    debug!(file = %entry.name, local_path = %local_path.display(), "already mirrored");
                    report.skipped += 1;
                    continue;
                }
                PlanDecision::Replace => {
                    remove_incomplete(&local_path).await;
                    report.replaced += 1;
                }
                PlanDecision::Fetch => report.queued += 1,
            }
            queue.submit(intent).await?;
        }
        Ok(report)
    }
}

/// Size of the local file, or `None` if it does not exist. Other stat errors
/// are logged and treated as missing.
pub async fn local_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Some(metadata.len()),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(local_path = %path.display(), error = %err, "stat failed; fetching anyway");
            None
        }
    }
}

/// Remove a local file that does not hold a verified copy. A missing file is
/// not an error; other failures are logged.
pub(crate) async fn remove_incomplete(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(local_path = %path.display(), "removed incomplete file"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(
            local_path = %path.display(),
            error = %err,
            "could not remove incomplete file; fetch will overwrite it"
        ),
    }
}
