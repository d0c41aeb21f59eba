//! Orchestrates one discovery and drain pass.
//!
//! # Design
//! - Discovery uses its own session and closes it before the pool starts, so
//!   the drain never holds more than `concurrency` remote sessions.
//! - The planner feeds the queue while the pool is already draining it; a
//!   full queue throttles planning instead of dropping intents.
//! - The run ends when the completion tracker reaches zero or the
//!   cancellation token fires. Either way every task settles before the
//!   report is assembled.

use std::sync::Arc;
use std::time::Instant;

use gribmirror_config::MirrorConfig;
use gribmirror_events::{Event, EventBus, NotificationSink};
use gribmirror_remote::RemoteTransport;
use gribmirror_telemetry::Metrics;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dead_letter::DeadLetterLog;
use crate::discovery::{Discovery, DiscoveryOutcome, RelevanceFilter};
use crate::error::{FetchError, FetchResult};
use crate::planner::{PlanReport, Planner};
use crate::pool::FetchPool;
use crate::queue::FetchQueue;
use crate::report::{DrainReport, RunStats};
use crate::retry::RetryPolicy;
use crate::task::FetchContext;
use crate::tracker::CompletionTracker;

/// Mirror pipeline bound to one configuration and transport.
pub struct MirrorPipeline {
    config: Arc<MirrorConfig>,
    transport: Arc<dyn RemoteTransport>,
    notifier: NotificationSink,
    metrics: Metrics,
    events: EventBus,
    cancel: CancellationToken,
}

impl MirrorPipeline {
    /// Pipeline with a private event bus and cancellation token.
    #[must_use]
    pub fn new(
        config: Arc<MirrorConfig>,
        transport: Arc<dyn RemoteTransport>,
        notifier: NotificationSink,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            transport,
            notifier,
            metrics,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Publish pipeline events on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Stop the run when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Event bus the pipeline publishes on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Token that interrupts the run.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Discover, plan, and drain every intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout patterns are invalid or the base
    /// directory cannot be listed. Per-file failures are reported in the
    /// [`DrainReport`] instead.
    pub async fn run(&self) -> FetchResult<DrainReport> {
        let started = Instant::now();
        let discovered = self.discover().await?;
        self.events.publish(Event::DiscoveryCompleted {
            folders: discovered.folders.len(),
            files: discovered.file_count(),
        });

        let pipeline = &self.config.pipeline;
        let tracker = CompletionTracker::new();
        let (queue, receiver) = FetchQueue::bounded(
            pipeline.queue_capacity,
            tracker.clone(),
            self.metrics.clone(),
            self.events.clone(),
        );
        let stats = Arc::new(RunStats::default());
        let dead_letters = DeadLetterLog::new(pipeline.dead_letter_path.clone());
        let retry = RetryPolicy::from_config(&pipeline.retry);
        debug!(
            concurrency = pipeline.concurrency,
            queue_capacity = pipeline.queue_capacity,
            max_attempts = ?retry.max_attempts(),
            "starting fetch pool"
        );
        let ctx = Arc::new(FetchContext {
            transport: Arc::clone(&self.transport),
            gate: Arc::new(Semaphore::new(pipeline.concurrency.max(1))),
            queue: queue.clone(),
            retry,
            attempt_timeout: pipeline.attempt_timeout,
            dead_letters: dead_letters.clone(),
            notifier: self.notifier.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            stats: Arc::clone(&stats),
            shutdown: self.cancel.child_token(),
        });
        let pool = FetchPool::spawn(ctx, receiver);

        let plan = match self.plan_all(&discovered, &queue).await {
            Ok(plan) => plan,
            Err(err) => {
                pool.shutdown().await;
                return Err(err);
            }
        };
        drop(queue);
        info!(
            queued = plan.queued,
            replaced = plan.replaced,
            skipped = plan.skipped,
            "planning finished"
        );

        let interrupted = tokio::select! {
            biased;
            () = tracker.wait_idle() => false,
            () = self.cancel.cancelled() => true,
        };
        if interrupted {
            warn!(outstanding = tracker.outstanding(), "run interrupted");
        }
        pool.shutdown().await;
        tracker.wait_idle().await;
        self.notifier.flush().await;
        if !dead_letters.is_empty() {
            warn!(count = dead_letters.len(), "files dead-lettered this run");
        }

        let report = DrainReport::assemble(
            &discovered,
            plan,
            &stats,
            dead_letters.entries(),
            interrupted,
            started.elapsed(),
        );
        self.events.publish(Event::DrainCompleted {
            completed: report.completed,
            dead_lettered: u64::try_from(report.dead_lettered.len()).unwrap_or(u64::MAX),
        });
        info!(
            completed = report.completed,
            dead_lettered = report.dead_lettered.len(),
            failed_attempts = report.failed_attempts,
            abandoned = report.abandoned,
            elapsed_ms = report.elapsed_ms,
            "drain finished"
        );
        Ok(report)
    }

    async fn discover(&self) -> FetchResult<DiscoveryOutcome> {
        let filter = RelevanceFilter::from_layout(&self.config.layout)?;
        let discovery = Discovery::new(filter, self.config.layout.partitions.clone());
        let base_dir = self.config.remote.base_dir.as_str();

        let mut session = self
            .transport
            .connect()
            .await
            .map_err(|source| FetchError::Discovery {
                remote_path: base_dir.to_string(),
                source,
            })?;
        let outcome = discovery.discover(session.as_mut(), base_dir).await;
        session.close().await;
        outcome
    }

    async fn plan_all(
        &self,
        discovered: &DiscoveryOutcome,
        queue: &FetchQueue,
    ) -> FetchResult<PlanReport> {
        let planner = Planner::new(
            self.config.remote.base_dir.as_str(),
            self.config.destination_root(),
            self.metrics.clone(),
        );
        let mut total = PlanReport::default();
        for batch in &discovered.batches {
            let planned = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                planned = planner.plan(batch, queue) => planned,
            };
            match planned {
                Ok(report) => total += report,
                // The dispatcher stopped because the run was cancelled.
                Err(FetchError::QueueClosed) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }
}
