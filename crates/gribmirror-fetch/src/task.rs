//! One fetch attempt, from admission to settlement.
//!
//! # Design
//! - A task waits for an admission permit before any remote I/O and drops it
//!   on every exit path.
//! - Resources are released in reverse order: retrieval stream, local file,
//!   remote session, permit, path claim, and finally the tracker
//!   registration.
//! - Failures never propagate. They are logged, counted, and either
//!   resubmitted after a backoff that holds no permit, or dead-lettered.
//! - A failed or interrupted attempt removes its local file while the path
//!   claim is still held, so a retry never mistakes unverified bytes for a
//!   finished copy.

use std::sync::Arc;
use std::time::Duration;

use gribmirror_events::{Event, EventBus, NotificationSink};
use gribmirror_remote::{RemoteError, RemoteSession, RemoteTransport};
use gribmirror_telemetry::Metrics;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dead_letter::{DeadLetter, DeadLetterLog};
use crate::error::{FetchError, FetchResult, FetchStage, render_chain};
use crate::inflight::PathClaim;
use crate::intent::FetchIntent;
use crate::planner::{local_size, remove_incomplete};
use crate::queue::{FetchQueue, QueuedIntent};
use crate::report::RunStats;
use crate::retry::{RetryDecision, RetryPolicy};

/// Shared collaborators for fetch tasks.
pub struct FetchContext {
    /// Remote session factory.
    pub transport: Arc<dyn RemoteTransport>,
    /// Admission gate bounding concurrent attempts.
    pub gate: Arc<Semaphore>,
    /// Queue used to resubmit failed intents.
    pub queue: FetchQueue,
    /// Backoff and attempt ceiling.
    pub retry: RetryPolicy,
    /// Upper bound for one attempt, if any.
    pub attempt_timeout: Option<Duration>,
    /// Sink for abandoned intents.
    pub dead_letters: DeadLetterLog,
    /// Completion notifications.
    pub notifier: NotificationSink,
    /// Pipeline events.
    pub events: EventBus,
    /// Prometheus counters.
    pub metrics: Metrics,
    /// Run counters for the drain report.
    pub stats: Arc<RunStats>,
    /// Cancelled on shutdown.
    pub shutdown: CancellationToken,
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The file was written and announced.
    Completed {
        /// Bytes written.
        bytes: u64,
    },
    /// The file was already complete at admission.
    Skipped,
    /// The attempt failed and a successor was queued.
    Retried {
        /// Backoff waited before resubmitting.
        delay: Duration,
    },
    /// The attempt failed and the intent was abandoned.
    DeadLettered,
    /// Shutdown stopped the task.
    Interrupted,
}

enum Attempt {
    Completed(u64),
    Skipped,
    Failed(FetchError),
    Interrupted,
}

/// Run one intent to settlement. The path claim is released before the
/// tracker registration.
pub async fn run_fetch(ctx: Arc<FetchContext>, queued: QueuedIntent, claim: PathClaim) -> TaskOutcome {
    let QueuedIntent { intent, pending } = queued;
    let attempt = admit_and_fetch(&ctx, &intent).await;
    drop(claim);
    let outcome = settle(&ctx, intent, attempt).await;
    drop(pending);
    outcome
}

async fn admit_and_fetch(ctx: &FetchContext, intent: &FetchIntent) -> Attempt {
    let permit = tokio::select! {
        biased;
        () = ctx.shutdown.cancelled() => return Attempt::Interrupted,
        permit = Arc::clone(&ctx.gate).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return Attempt::Interrupted,
        },
    };
    let _in_flight = InFlightGauge::enter(&ctx.metrics);

    let local_path = intent.local_path();
    if intent.attempt == 1 && local_size(&local_path).await == Some(intent.expected_size()) {
        return Attempt::Skipped;
    }

    ctx.metrics.inc_attempt();
    ctx.events.publish(Event::FetchStarted {
        path: local_path.display().to_string(),
        attempt: intent.attempt,
    });
    debug!(
        file = %intent.name(),
        remote_path = %intent.remote_path(),
        attempt = intent.attempt,
        "fetch admitted"
    );

    let bounded = async {
        match ctx.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch_once(ctx.transport.as_ref(), intent))
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::TimedOut {
                        path: local_path.clone(),
                        after: limit,
                    })
                }),
            None => fetch_once(ctx.transport.as_ref(), intent).await,
        }
    };
    let result = tokio::select! {
        biased;
        () = ctx.shutdown.cancelled() => None,
        result = bounded => Some(result),
    };
    drop(permit);

    match result {
        Some(Ok(bytes)) => Attempt::Completed(bytes),
        Some(Err(err)) => {
            remove_incomplete(&local_path).await;
            Attempt::Failed(err)
        }
        None => {
            remove_incomplete(&local_path).await;
            Attempt::Interrupted
        }
    }
}

async fn fetch_once(transport: &dyn RemoteTransport, intent: &FetchIntent) -> FetchResult<u64> {
    let local_dir = intent.local_dir();
    tokio::fs::create_dir_all(&local_dir)
        .await
        .map_err(|source| FetchError::Io {
            stage: FetchStage::Prepare,
            operation: "create_dir",
            path: local_dir.clone(),
            source,
        })?;

    let mut session = transport
        .connect()
        .await
        .map_err(|source| remote_error(FetchStage::Connect, intent, source))?;
    let result = transfer(session.as_mut(), intent).await;
    session.close().await;
    result
}

async fn transfer(session: &mut dyn RemoteSession, intent: &FetchIntent) -> FetchResult<u64> {
    session
        .change_dir(&intent.remote_dir())
        .await
        .map_err(|source| remote_error(FetchStage::ChangeDir, intent, source))?;
    let mut stream = session
        .retrieve(intent.name())
        .await
        .map_err(|source| remote_error(FetchStage::Retrieve, intent, source))?;

    let local_path = intent.local_path();
    let write_error = |operation: &'static str| {
        let path = local_path.clone();
        move |source| FetchError::Io {
            stage: FetchStage::Write,
            operation,
            path,
            source,
        }
    };
    let mut file = tokio::fs::File::create(&local_path)
        .await
        .map_err(write_error("create"))?;
    let written = tokio::io::copy(&mut stream, &mut file)
        .await
        .map_err(write_error("copy"))?;
    drop(stream);
    file.flush().await.map_err(write_error("flush"))?;
    drop(file);

    session
        .finish_retrieve()
        .await
        .map_err(|source| remote_error(FetchStage::Verify, intent, source))?;
    if written != intent.expected_size() {
        return Err(FetchError::SizeMismatch {
            path: local_path,
            expected: intent.expected_size(),
            actual: written,
        });
    }
    Ok(written)
}

fn remote_error(stage: FetchStage, intent: &FetchIntent, source: RemoteError) -> FetchError {
    FetchError::Remote {
        stage,
        remote_path: intent.remote_path(),
        source,
    }
}

async fn settle(ctx: &FetchContext, intent: FetchIntent, attempt: Attempt) -> TaskOutcome {
    let local_path = intent.local_path().display().to_string();
    match attempt {
        Attempt::Completed(bytes) => {
            ctx.stats.completed();
            ctx.metrics.record_completed(bytes);
            ctx.notifier.publish(&local_path).await;
            ctx.events.publish(Event::FetchCompleted {
                path: local_path.clone(),
                bytes,
            });
            info!(
                file = %intent.name(),
                local_path = %local_path,
                bytes,
                attempt = intent.attempt,
                "fetch completed"
            );
            TaskOutcome::Completed { bytes }
        }
        Attempt::Skipped => {
            ctx.stats.skipped();
            ctx.events.publish(Event::FetchSkipped {
                path: local_path.clone(),
            });
            debug!(local_path = %local_path, "already complete at admission");
            TaskOutcome::Skipped
        }
        Attempt::Interrupted => {
            ctx.stats.abandoned(1);
            debug!(local_path = %local_path, "fetch interrupted");
            TaskOutcome::Interrupted
        }
        Attempt::Failed(err) => handle_failure(ctx, intent, &err).await,
    }
}

async fn handle_failure(ctx: &FetchContext, intent: FetchIntent, err: &FetchError) -> TaskOutcome {
    let stage = err.stage();
    let stage_label = stage.map_or("unknown", FetchStage::as_str);
    let message = render_chain(err);
    let local_path = intent.local_path().display().to_string();
    let modified = intent
        .entry
        .as_ref()
        .map(|entry| entry.modified.to_rfc3339())
        .unwrap_or_default();

    ctx.stats.failed();
    ctx.metrics.inc_failure(stage_label);
    ctx.events.publish(Event::FetchFailed {
        path: local_path.clone(),
        attempt: intent.attempt,
        stage: stage_label.to_string(),
        message: message.clone(),
    });
    warn!(
        file = %intent.name(),
        modified = %modified,
        attempt = intent.attempt,
        stage = stage_label,
        error = %message,
        "fetch attempt failed"
    );

    match ctx.retry.decide(intent.attempt) {
        RetryDecision::RetryAfter(delay) => {
            let waited = tokio::select! {
                biased;
                () = ctx.shutdown.cancelled() => false,
                () = tokio::time::sleep(delay) => true,
            };
            if !waited {
                ctx.stats.abandoned(1);
                return TaskOutcome::Interrupted;
            }
            match ctx.queue.submit(intent.next_attempt()).await {
                Ok(()) => TaskOutcome::Retried { delay },
                Err(err) => {
                    ctx.stats.abandoned(1);
                    debug!(local_path = %local_path, error = %err, "retry not queued");
                    TaskOutcome::Interrupted
                }
            }
        }
        RetryDecision::GiveUp => {
            ctx.dead_letters
                .record(DeadLetter::new(&intent, stage, message.clone()))
                .await;
            ctx.metrics.inc_dead_letter();
            ctx.events.publish(Event::FetchDeadLettered {
                path: local_path.clone(),
                attempts: intent.attempt,
                message: message.clone(),
            });
            error!(
                file = %intent.name(),
                modified = %modified,
                attempts = intent.attempt,
                error = %message,
                "giving up on file"
            );
            TaskOutcome::DeadLettered
        }
    }
}

struct InFlightGauge<'a>(&'a Metrics);

impl<'a> InFlightGauge<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.inc_in_flight();
        Self(metrics)
    }
}

impl Drop for InFlightGauge<'_> {
    fn drop(&mut self) {
        self.0.dec_in_flight();
    }
}
