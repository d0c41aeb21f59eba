//! Run statistics and the final drain report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::dead_letter::DeadLetter;
use crate::discovery::DiscoveryOutcome;
use crate::planner::PlanReport;

/// Counters updated by fetch tasks and the dispatcher.
#[derive(Debug, Default)]
pub struct RunStats {
    completed: AtomicU64,
    skipped_at_admission: AtomicU64,
    failed_attempts: AtomicU64,
    abandoned: AtomicU64,
}

impl RunStats {
    pub(crate) fn completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skipped(&self) {
        self.skipped_at_admission.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    /// Files fetched so far.
    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Summary of one discovery and drain pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    /// Relevant folders found.
    pub folders: usize,
    /// Payload files discovered.
    pub discovered: usize,
    /// Intents queued for missing files.
    pub queued: usize,
    /// Intents queued after deleting a stale local file.
    pub replaced: usize,
    /// Files already complete before the run.
    pub skipped: usize,
    /// Files fetched.
    pub completed: u64,
    /// Intents found complete at admission.
    pub skipped_at_admission: u64,
    /// Failed attempts, including ones later retried successfully.
    pub failed_attempts: u64,
    /// Intents that exhausted their attempts.
    pub dead_lettered: Vec<DeadLetter>,
    /// Sub-directories whose listing failed.
    pub skipped_partitions: Vec<String>,
    /// Whether the run was cancelled before draining.
    pub interrupted: bool,
    /// Intents dropped by cancellation.
    pub abandoned: u64,
    /// Wall time of the run, in milliseconds.
    pub elapsed_ms: u64,
}

impl DrainReport {
    pub(crate) fn assemble(
        discovery: &DiscoveryOutcome,
        plan: PlanReport,
        stats: &RunStats,
        dead_lettered: Vec<DeadLetter>,
        interrupted: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            folders: discovery.folders.len(),
            discovered: discovery.file_count(),
            queued: plan.queued,
            replaced: plan.replaced,
            skipped: plan.skipped,
            completed: stats.completed.load(Ordering::Relaxed),
            skipped_at_admission: stats.skipped_at_admission.load(Ordering::Relaxed),
            failed_attempts: stats.failed_attempts.load(Ordering::Relaxed),
            dead_lettered,
            skipped_partitions: discovery.skipped.clone(),
            interrupted,
            abandoned: stats.abandoned.load(Ordering::Relaxed),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Every planned intent finished and none was dead-lettered.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.interrupted && self.dead_lettered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_copies_counters() {
        let stats = RunStats::default();
        stats.completed();
        stats.completed();
        stats.failed();
        stats.skipped();
        stats.abandoned(2);

        let report = DrainReport::assemble(
            &DiscoveryOutcome {
                skipped: vec!["gfs.20240101/18".into()],
                ..DiscoveryOutcome::default()
            },
            PlanReport {
                queued: 2,
                replaced: 0,
                skipped: 1,
            },
            &stats,
            Vec::new(),
            false,
            Duration::from_millis(1_500),
        );
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed_attempts, 1);
        assert_eq!(report.skipped_at_admission, 1);
        assert_eq!(report.abandoned, 2);
        assert_eq!(report.skipped_partitions, ["gfs.20240101/18"]);
        assert_eq!(report.elapsed_ms, 1_500);
        assert!(report.is_clean());
    }
}
