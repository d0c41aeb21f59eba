use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gribmirror_config::MirrorConfig;
use gribmirror_events::{Event, EventBus};
use gribmirror_fetch::{DeadLetter, FetchError, FetchStage, MirrorPipeline};
use gribmirror_telemetry::Metrics;
use gribmirror_test_support::{
    BASE_DIR, MemoryRemote, RecordingPublisher, SCENARIO_PAYLOAD, gfs_scenario, payload,
    scenario_config, ts,
};
use tokio_util::sync::CancellationToken;

const SUBJECT: &str = "leia.noaa.files";
const SCENARIO_FILE: &str = "gfs.t00z.pgrb2.1p00.f000";

fn pipeline(
    remote: &MemoryRemote,
    config: MirrorConfig,
    publisher: &Arc<RecordingPublisher>,
) -> Result<MirrorPipeline> {
    Ok(MirrorPipeline::new(
        Arc::new(config),
        Arc::new(remote.clone()),
        publisher.sink(SUBJECT),
        Metrics::new()?,
    ))
}

fn scenario_remote_path() -> String {
    format!("{BASE_DIR}/gfs.20240101/{SCENARIO_FILE}")
}

#[tokio::test]
async fn scenario_mirrors_payload_and_notifies_once() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    let publisher = RecordingPublisher::new();

    let report = pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .run()
        .await?;

    let local = dest.path().join("gfs.20240101").join(SCENARIO_FILE);
    assert_eq!(tokio::fs::read(&local).await?, SCENARIO_PAYLOAD);
    assert_eq!(
        publisher.messages(),
        [(SUBJECT.to_string(), local.display().to_string())]
    );
    assert_eq!(remote.retrievals(), [scenario_remote_path()]);
    assert_eq!(report.folders, 1);
    assert_eq!(report.discovered, 1);
    assert_eq!(report.queued, 1);
    assert_eq!(report.completed, 1);
    assert!(report.is_clean());
    assert_eq!(remote.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn second_run_against_complete_mirror_does_nothing() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    let publisher = RecordingPublisher::new();
    let config = scenario_config(dest.path(), &[]);

    pipeline(&remote, config.clone(), &publisher)?.run().await?;
    let second = pipeline(&remote, config, &publisher)?.run().await?;

    assert_eq!(second.queued, 0);
    assert_eq!(second.replaced, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.completed, 0);
    assert_eq!(remote.retrievals().len(), 1);
    assert_eq!(publisher.payloads().len(), 1);
    Ok(())
}

#[tokio::test]
async fn stale_local_file_is_replaced() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let local_dir = dest.path().join("gfs.20240101");
    tokio::fs::create_dir_all(&local_dir).await?;
    tokio::fs::write(local_dir.join(SCENARIO_FILE), b"GRIB2").await?;

    let remote = gfs_scenario();
    let publisher = RecordingPublisher::new();
    let report = pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .run()
        .await?;

    assert_eq!(report.replaced, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(
        tokio::fs::read(local_dir.join(SCENARIO_FILE)).await?,
        SCENARIO_PAYLOAD
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn open_sessions_never_exceed_concurrency() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    let folder = format!("{BASE_DIR}/gfs.20240101");
    remote.add_dir(&folder, ts(6));
    for hour in 0..12 {
        let name = format!("gfs.t00z.pgrb2.1p00.f{hour:03}");
        remote.add_file(&format!("{folder}/{name}"), payload(&name, 64), ts(hour));
    }
    remote.set_transfer_delay(Duration::from_millis(20));

    let mut config = scenario_config(dest.path(), &[]);
    config.pipeline.concurrency = 3;
    config.pipeline.queue_capacity = 2;
    let publisher = RecordingPublisher::new();
    let report = pipeline(&remote, config, &publisher)?.run().await?;

    assert_eq!(report.completed, 12);
    assert!(remote.max_concurrent_sessions() <= 3);
    assert!(remote.max_concurrent_sessions() >= 2);
    assert_eq!(publisher.payloads().len(), 12);
    Ok(())
}

#[tokio::test]
async fn transient_failures_converge_to_one_notification() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    remote.fail_retrievals(&scenario_remote_path(), 3);
    let publisher = RecordingPublisher::new();

    let report = pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .run()
        .await?;

    assert_eq!(report.completed, 1);
    assert_eq!(report.failed_attempts, 3);
    assert!(report.dead_lettered.is_empty());
    assert_eq!(remote.retrieval_count(&scenario_remote_path()), 4);
    assert_eq!(publisher.payloads().len(), 1);
    Ok(())
}

#[tokio::test]
async fn truncated_transfer_is_retried() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    remote.truncate_retrievals(&scenario_remote_path(), 1);
    let publisher = RecordingPublisher::new();

    let report = pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .run()
        .await?;

    assert_eq!(report.failed_attempts, 1);
    assert_eq!(report.completed, 1);
    let local = dest.path().join("gfs.20240101").join(SCENARIO_FILE);
    assert_eq!(tokio::fs::read(local).await?, SCENARIO_PAYLOAD);
    Ok(())
}

#[tokio::test]
async fn rejected_final_reply_refetches_and_notifies() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    remote.fail_finishing(&scenario_remote_path(), 1);
    let publisher = RecordingPublisher::new();

    let report = pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .run()
        .await?;

    assert_eq!(report.failed_attempts, 1);
    assert_eq!(report.skipped_at_admission, 0);
    assert_eq!(report.completed, 1);
    assert_eq!(remote.retrieval_count(&scenario_remote_path()), 2);
    let local = dest.path().join("gfs.20240101").join(SCENARIO_FILE);
    assert_eq!(tokio::fs::read(&local).await?, SCENARIO_PAYLOAD);
    assert_eq!(publisher.payloads(), [local.display().to_string()]);
    Ok(())
}

#[tokio::test]
async fn slow_attempt_times_out_and_frees_its_permit() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    let folder = format!("{BASE_DIR}/gfs.20240101");
    let slow = format!("{folder}/gfs.t00z.pgrb2.1p00.f003");
    let fast = format!("{folder}/gfs.t00z.pgrb2.1p00.f000");
    remote.add_dir(&folder, ts(6));
    remote.add_file(&slow, payload("slow", 32), ts(4));
    remote.add_file(&fast, payload("fast", 32), ts(2));
    remote.delay_retrievals(&slow, Duration::from_secs(2));

    let mut config = scenario_config(dest.path(), &[]);
    config.pipeline.concurrency = 1;
    config.pipeline.retry.max_attempts = 2;
    config.pipeline.attempt_timeout = Some(Duration::from_millis(50));
    let publisher = RecordingPublisher::new();
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline(&remote, config, &publisher)?.run(),
    )
    .await??;

    assert_eq!(report.completed, 1);
    assert_eq!(report.failed_attempts, 2);
    assert_eq!(report.dead_lettered.len(), 1);
    let letter = &report.dead_lettered[0];
    assert_eq!(letter.remote_path, slow);
    assert_eq!(letter.stage, Some(FetchStage::Timeout));
    assert_eq!(remote.retrieval_count(&slow), 2);
    assert_eq!(remote.retrieval_count(&fast), 1);
    assert!(
        !dest
            .path()
            .join("gfs.20240101")
            .join("gfs.t00z.pgrb2.1p00.f003")
            .exists()
    );
    assert_eq!(publisher.payloads().len(), 1);
    assert_eq!(remote.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn exhausted_intent_is_dead_lettered() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let dead_letter_file = dest.path().join("state").join("dead-letters.jsonl");
    let remote = gfs_scenario();
    remote.fail_retrievals(&scenario_remote_path(), 10);

    let mut config = scenario_config(&dest.path().join("mirror"), &[]);
    config.pipeline.retry.max_attempts = 3;
    config.pipeline.dead_letter_path = Some(dead_letter_file.clone());
    let publisher = RecordingPublisher::new();
    let report = pipeline(&remote, config, &publisher)?.run().await?;

    assert!(!report.is_clean());
    assert_eq!(report.completed, 0);
    assert_eq!(report.failed_attempts, 3);
    assert_eq!(report.dead_lettered.len(), 1);
    let letter = &report.dead_lettered[0];
    assert_eq!(letter.attempts, 3);
    assert_eq!(letter.stage, Some(FetchStage::Retrieve));
    assert_eq!(letter.remote_path, scenario_remote_path());
    assert_eq!(letter.modified, Some(ts(5)));
    assert_eq!(remote.retrieval_count(&scenario_remote_path()), 3);
    assert!(publisher.payloads().is_empty());

    let persisted = tokio::fs::read_to_string(&dead_letter_file).await?;
    let lines: Vec<DeadLetter> = persisted
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].remote_path, letter.remote_path);
    Ok(())
}

#[tokio::test]
async fn size_mismatch_fails_verification() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    remote.set_reported_size(&scenario_remote_path(), 4_096);

    let mut config = scenario_config(dest.path(), &[]);
    config.pipeline.retry.max_attempts = 2;
    let publisher = RecordingPublisher::new();
    let report = pipeline(&remote, config, &publisher)?.run().await?;

    assert_eq!(report.completed, 0);
    assert_eq!(report.dead_lettered.len(), 1);
    assert_eq!(report.dead_lettered[0].stage, Some(FetchStage::Verify));
    assert!(publisher.payloads().is_empty());
    Ok(())
}

#[tokio::test]
async fn newest_folders_and_files_are_fetched_first() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    let older = format!("{BASE_DIR}/gfs.20240101");
    let newer = format!("{BASE_DIR}/gfs.20240102");
    remote.add_dir(&older, ts(1));
    remote.add_dir(&newer, ts(30));
    remote.add_file(&format!("{older}/gfs.t00z.pgrb2.1p00.f000"), payload("a", 8), ts(2));
    remote.add_file(&format!("{newer}/gfs.t00z.pgrb2.1p00.f000"), payload("b", 8), ts(25));
    remote.add_file(&format!("{newer}/gfs.t00z.pgrb2.1p00.f003"), payload("c", 8), ts(28));

    let mut config = scenario_config(dest.path(), &[]);
    config.pipeline.concurrency = 1;
    let publisher = RecordingPublisher::new();
    pipeline(&remote, config, &publisher)?.run().await?;

    assert_eq!(
        remote.retrievals(),
        [
            format!("{newer}/gfs.t00z.pgrb2.1p00.f003"),
            format!("{newer}/gfs.t00z.pgrb2.1p00.f000"),
            format!("{older}/gfs.t00z.pgrb2.1p00.f000"),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn failed_partition_listing_is_skipped() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    let folder = format!("{BASE_DIR}/gfs.20240101");
    remote.add_dir(&format!("{folder}/00"), ts(1));
    remote.add_dir(&format!("{folder}/06"), ts(7));
    remote.add_file(&format!("{folder}/00/{SCENARIO_FILE}"), payload("p", 16), ts(2));
    remote.break_listing(&format!("{folder}/06"));

    let publisher = RecordingPublisher::new();
    let report = pipeline(&remote, scenario_config(dest.path(), &["00", "06"]), &publisher)?
        .run()
        .await?;

    assert_eq!(report.skipped_partitions, ["gfs.20240101/06"]);
    assert_eq!(report.completed, 1);
    assert!(
        dest.path()
            .join("gfs.20240101")
            .join("00")
            .join(SCENARIO_FILE)
            .exists()
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_base_directory_is_fatal() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    remote.break_listing(BASE_DIR);
    let publisher = RecordingPublisher::new();

    let result = pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .run()
        .await;
    assert!(matches!(result, Err(FetchError::Discovery { .. })));

    let refused = gfs_scenario();
    refused.fail_connects(1);
    let result = pipeline(&refused, scenario_config(dest.path(), &[]), &publisher)?
        .run()
        .await;
    assert!(matches!(result, Err(FetchError::Discovery { .. })));
    assert!(publisher.payloads().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancellation_abandons_outstanding_work() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    let folder = format!("{BASE_DIR}/gfs.20240101");
    remote.add_dir(&folder, ts(6));
    for hour in 0..3 {
        let name = format!("gfs.t00z.pgrb2.1p00.f{hour:03}");
        remote.add_file(&format!("{folder}/{name}"), payload(&name, 32), ts(hour));
    }
    remote.set_transfer_delay(Duration::from_secs(30));

    let mut config = scenario_config(dest.path(), &[]);
    config.pipeline.concurrency = 1;
    let cancel = CancellationToken::new();
    let publisher = RecordingPublisher::new();
    let pipeline = pipeline(&remote, config, &publisher)?.with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = tokio::time::timeout(Duration::from_secs(5), pipeline.run()).await??;
    trigger.await?;

    assert!(report.interrupted);
    assert!(!report.is_clean());
    assert_eq!(report.completed, 0);
    assert_eq!(report.abandoned, 3);
    assert!(publisher.payloads().is_empty());
    assert_eq!(remote.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn events_bracket_the_run() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = gfs_scenario();
    let events = EventBus::new();
    let publisher = RecordingPublisher::new();

    pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .with_events(events.clone())
        .run()
        .await?;

    let kinds: Vec<_> = events
        .backlog_since(0)
        .into_iter()
        .map(|envelope| envelope.event.kind())
        .collect();
    assert_eq!(
        kinds,
        [
            "discovery_completed",
            "fetch_queued",
            "fetch_started",
            "fetch_completed",
            "drain_completed",
        ]
    );
    let last = events.backlog_since(0).pop().map(|envelope| envelope.event);
    assert_eq!(
        last,
        Some(Event::DrainCompleted {
            completed: 1,
            dead_lettered: 0,
        })
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_file_is_queued_before_it_starts() -> Result<()> {
    let dest = tempfile::tempdir()?;
    let remote = MemoryRemote::new();
    let folder = format!("{BASE_DIR}/gfs.20240101");
    remote.add_dir(&folder, ts(6));
    for hour in 0..8 {
        let name = format!("gfs.t00z.pgrb2.1p00.f{hour:03}");
        remote.add_file(&format!("{folder}/{name}"), payload(&name, 16), ts(hour));
    }
    let events = EventBus::new();
    let publisher = RecordingPublisher::new();

    let report = pipeline(&remote, scenario_config(dest.path(), &[]), &publisher)?
        .with_events(events.clone())
        .run()
        .await?;
    assert_eq!(report.completed, 8);

    let backlog: Vec<Event> = events
        .backlog_since(0)
        .into_iter()
        .map(|envelope| envelope.event)
        .collect();
    for (index, event) in backlog.iter().enumerate() {
        if let Event::FetchStarted { path, .. } = event {
            let queued_earlier = backlog[..index].iter().any(|earlier| {
                matches!(earlier, Event::FetchQueued { path: queued } if queued == path)
            });
            assert!(queued_earlier, "{path} started before it was queued");
        }
    }
    Ok(())
}
