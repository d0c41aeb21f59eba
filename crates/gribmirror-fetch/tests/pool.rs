use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gribmirror_config::RetryConfig;
use gribmirror_events::EventBus;
use gribmirror_fetch::{
    CompletionTracker, DeadLetterLog, FetchContext, FetchIntent, FetchPool, FetchQueue,
    FetchReceiver, RetryPolicy, RunStats,
};
use gribmirror_remote::RemoteEntry;
use gribmirror_telemetry::Metrics;
use gribmirror_test_support::{BASE_DIR, MemoryRemote, RecordingPublisher, payload, ts};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

struct Harness {
    queue: FetchQueue,
    pool: FetchPool,
    stats: Arc<RunStats>,
    tracker: CompletionTracker,
    publisher: Arc<RecordingPublisher>,
}

fn harness(remote: &MemoryRemote, concurrency: usize) -> Result<Harness> {
    let tracker = CompletionTracker::new();
    let metrics = Metrics::new()?;
    let events = EventBus::new();
    let (queue, receiver): (FetchQueue, FetchReceiver) =
        FetchQueue::bounded(16, tracker.clone(), metrics.clone(), events.clone());
    let stats = Arc::new(RunStats::default());
    let publisher = RecordingPublisher::new();
    let ctx = Arc::new(FetchContext {
        transport: Arc::new(remote.clone()),
        gate: Arc::new(Semaphore::new(concurrency)),
        queue: queue.clone(),
        retry: RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        }),
        attempt_timeout: None,
        dead_letters: DeadLetterLog::new(None),
        notifier: publisher.sink("leia.noaa.files"),
        events,
        metrics,
        stats: Arc::clone(&stats),
        shutdown: CancellationToken::new(),
    });
    Ok(Harness {
        queue,
        pool: FetchPool::spawn(ctx, receiver),
        stats,
        tracker,
        publisher,
    })
}

fn intent(destination: &std::path::Path, name: &str, size: u64) -> FetchIntent {
    FetchIntent::new(
        BASE_DIR,
        "gfs.20240101",
        RemoteEntry::file(name, size, ts(1)),
        destination,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_intents_for_one_path_run_one_at_a_time() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    let name = "gfs.t00z.pgrb2.1p00.f000";
    let body = payload(name, 128);
    remote.add_file(&format!("{BASE_DIR}/gfs.20240101/{name}"), body.clone(), ts(1));
    remote.set_transfer_delay(Duration::from_millis(30));

    let harness = harness(&remote, 4)?;
    let size = u64::try_from(body.len())?;
    harness.queue.submit(intent(dest.path(), name, size)).await?;
    harness.queue.submit(intent(dest.path(), name, size)).await?;

    tokio::time::timeout(Duration::from_secs(5), harness.tracker.wait_idle()).await?;
    harness.pool.shutdown().await;

    assert_eq!(remote.retrievals().len(), 1);
    assert_eq!(remote.max_concurrent_sessions(), 1);
    assert_eq!(harness.stats.completed_count(), 1);
    assert_eq!(harness.publisher.payloads().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_paths_share_the_gate() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    remote.set_transfer_delay(Duration::from_millis(20));
    let harness = harness(&remote, 2)?;

    for hour in 0..6 {
        let name = format!("gfs.t00z.pgrb2.1p00.f{hour:03}");
        let body = payload(&name, 40);
        remote.add_file(&format!("{BASE_DIR}/gfs.20240101/{name}"), body, ts(1));
        harness.queue.submit(intent(dest.path(), &name, 40)).await?;
    }

    tokio::time::timeout(Duration::from_secs(5), harness.tracker.wait_idle()).await?;
    harness.pool.shutdown().await;

    assert_eq!(harness.stats.completed_count(), 6);
    assert!(remote.max_concurrent_sessions() <= 2);
    assert_eq!(harness.tracker.outstanding(), 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_releases_every_registration() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    remote.set_transfer_delay(Duration::from_secs(30));
    let harness = harness(&remote, 1)?;

    for hour in 0..3 {
        let name = format!("gfs.t00z.pgrb2.1p00.f{hour:03}");
        remote.add_file(&format!("{BASE_DIR}/gfs.20240101/{name}"), payload(&name, 8), ts(1));
        harness.queue.submit(intent(dest.path(), &name, 8)).await?;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness.pool.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), harness.tracker.wait_idle()).await?;
    assert_eq!(harness.stats.completed_count(), 0);
    assert!(harness.publisher.payloads().is_empty());
    Ok(())
}
