//! Wires configuration, telemetry, transport and notifications into one run.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use gribmirror_config::{ConfigLayer, MirrorConfig};
use gribmirror_events::NotificationSink;
use gribmirror_fetch::{DrainReport, MirrorPipeline};
use gribmirror_remote::{FtpTransport, RemoteTransport};
use gribmirror_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha, init_logging};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::error::{AppError, AppResult};

/// Exit status for a run that drained with dead-lettered files.
pub const EXIT_DEAD_LETTERS: u8 = 2;
/// Exit status for a run stopped by Ctrl-C.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Install logging as requested on the command line.
///
/// # Errors
///
/// Returns an error if the log format is unknown or a subscriber is already
/// installed.
pub fn init_telemetry(cli: &Cli) -> AppResult<()> {
    let format: LogFormat = cli
        .log_format
        .parse()
        .map_err(|err| AppError::telemetry("telemetry.log_format", err))?;
    init_logging(&LoggingConfig {
        level: &cli.log_level,
        format,
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))
}

/// Resolve the effective configuration.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be read or the merged
/// result fails validation.
pub fn load_config(file: Option<&Path>, overrides: ConfigLayer) -> AppResult<MirrorConfig> {
    MirrorConfig::load(file, overrides).map_err(|err| AppError::config("config.load", err))
}

/// Run one mirror pass against the configured FTP server.
///
/// # Errors
///
/// Returns an error if configuration is invalid or discovery fails.
pub async fn run_app(cli: &Cli, cancel: CancellationToken) -> AppResult<DrainReport> {
    let config = Arc::new(load_config(cli.config.as_deref(), cli.overrides())?);
    info!(
        host = %config.remote.host,
        base_dir = %config.remote.base_dir,
        destination = %config.destination_root.display(),
        concurrency = config.pipeline.concurrency,
        "configuration loaded"
    );
    let notifier = NotificationSink::connect(&config.notify).await;
    let transport: Arc<dyn RemoteTransport> = Arc::new(FtpTransport::new(config.remote.clone()));
    run_with(config, transport, notifier, cancel).await
}

/// Run one mirror pass with injected collaborators.
///
/// # Errors
///
/// Returns an error if metrics cannot be registered or discovery fails.
pub async fn run_with(
    config: Arc<MirrorConfig>,
    transport: Arc<dyn RemoteTransport>,
    notifier: NotificationSink,
    cancel: CancellationToken,
) -> AppResult<DrainReport> {
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let pipeline = MirrorPipeline::new(config, transport, notifier, metrics.clone())
        .with_cancellation(cancel);
    let report = pipeline
        .run()
        .await
        .map_err(|err| AppError::pipeline("pipeline.run", err))?;

    let snapshot = metrics.snapshot();
    info!(
        attempts = snapshot.fetch_attempts_total,
        completed = snapshot.fetch_completed_total,
        failures = snapshot.fetch_failures_total,
        dead_letters = snapshot.fetch_dead_letters_total,
        bytes = snapshot.fetch_bytes_total,
        "metrics snapshot"
    );
    match metrics.render() {
        Ok(exposition) => debug!(metrics = %exposition, "metrics exposition"),
        Err(err) => warn!(error = %err, "metrics could not be rendered"),
    }
    for letter in &report.dead_lettered {
        warn!(
            remote_path = %letter.remote_path,
            attempts = letter.attempts,
            error = %letter.error,
            "file left unmirrored"
        );
    }
    Ok(report)
}

/// Process exit status for a finished run.
#[must_use]
pub fn exit_code(report: &DrainReport) -> ExitCode {
    if report.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if !report.dead_lettered.is_empty() {
        ExitCode::from(EXIT_DEAD_LETTERS)
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gribmirror_test_support::{RecordingPublisher, gfs_scenario, scenario_config};

    #[tokio::test]
    async fn run_with_mirrors_scenario() -> anyhow::Result<()> {
        let dest = tempfile::tempdir()?;
        let remote = gfs_scenario();
        let publisher = RecordingPublisher::new();

        let report = run_with(
            Arc::new(scenario_config(dest.path(), &[])),
            Arc::new(remote.clone()),
            publisher.sink("leia.noaa.files"),
            CancellationToken::new(),
        )
        .await?;

        assert_eq!(report.completed, 1);
        assert_eq!(exit_code(&report), ExitCode::SUCCESS);
        assert_eq!(publisher.payloads().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn discovery_failure_is_tagged() -> anyhow::Result<()> {
        let dest = tempfile::tempdir()?;
        let remote = gfs_scenario();
        remote.fail_connects(1);

        let result = run_with(
            Arc::new(scenario_config(dest.path(), &[])),
            Arc::new(remote),
            NotificationSink::disconnected("test"),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::Pipeline {
                operation: "pipeline.run",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn exit_codes_follow_outcome() {
        let clean = DrainReport::default();
        assert_eq!(exit_code(&clean), ExitCode::SUCCESS);

        let interrupted = DrainReport {
            interrupted: true,
            ..DrainReport::default()
        };
        assert_eq!(exit_code(&interrupted), ExitCode::from(EXIT_INTERRUPTED));
    }

    #[test]
    fn invalid_overrides_are_config_errors() {
        let result = load_config(
            None,
            ConfigLayer {
                concurrency: Some(0),
                ..ConfigLayer::default()
            },
        );
        assert!(matches!(
            result,
            Err(AppError::Config {
                operation: "config.load",
                ..
            })
        ));
    }
}
