//! Command-line flags mapped onto the configuration override layer.

use std::path::PathBuf;

use clap::Parser;
use gribmirror_config::ConfigLayer;

/// Mirror GFS GRIB files from the NOAA FTP server.
///
/// One invocation performs a single discovery and drain pass.
#[derive(Debug, Parser)]
#[command(name = "gribmirror", version)]
pub struct Cli {
    /// FTP host.
    #[arg(long, env = "GRIBMIRROR_HOST")]
    pub host: Option<String>,
    /// FTP port.
    #[arg(long, env = "GRIBMIRROR_PORT")]
    pub port: Option<u16>,
    /// Remote directory holding the dated folders.
    #[arg(long, env = "GRIBMIRROR_BASE_DIR")]
    pub base_dir: Option<String>,
    /// FTP user name.
    #[arg(long, env = "GRIBMIRROR_USER")]
    pub user: Option<String>,
    /// FTP password.
    #[arg(long, env = "GRIBMIRROR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Local mirror root.
    #[arg(long, env = "GRIBMIRROR_DESTINATION")]
    pub destination: Option<PathBuf>,
    /// JSON configuration file applied beneath command-line flags.
    #[arg(long, env = "GRIBMIRROR_CONFIG")]
    pub config: Option<PathBuf>,
    /// Maximum concurrent fetches.
    #[arg(long, env = "GRIBMIRROR_CONCURRENCY")]
    pub concurrency: Option<usize>,
    /// Fetch queue capacity.
    #[arg(long, env = "GRIBMIRROR_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,
    /// Attempts per file before giving up; 0 retries forever.
    #[arg(long, env = "GRIBMIRROR_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,
    /// Delay before the first retry, in milliseconds.
    #[arg(long, env = "GRIBMIRROR_INITIAL_BACKOFF_MS")]
    pub initial_backoff_ms: Option<u64>,
    /// Upper bound for retry delays, in milliseconds.
    #[arg(long, env = "GRIBMIRROR_MAX_BACKOFF_MS")]
    pub max_backoff_ms: Option<u64>,
    /// Time limit for one fetch attempt, in seconds; 0 disables it.
    #[arg(long, env = "GRIBMIRROR_ATTEMPT_TIMEOUT_SECS")]
    pub attempt_timeout_secs: Option<u64>,
    /// File receiving dead-lettered files as JSON lines.
    #[arg(long, env = "GRIBMIRROR_DEAD_LETTER")]
    pub dead_letter: Option<PathBuf>,
    /// NATS server for completion notifications.
    #[arg(long, env = "GRIBMIRROR_NATS_URL")]
    pub nats_url: Option<String>,
    /// NATS subject for completion notifications.
    #[arg(long, env = "GRIBMIRROR_SUBJECT")]
    pub subject: Option<String>,
    /// Do not publish completion notifications.
    #[arg(long, env = "GRIBMIRROR_NO_NOTIFY")]
    pub no_notify: bool,
    /// Comma-separated partition names; an empty value lists folders directly.
    #[arg(long, env = "GRIBMIRROR_PARTITIONS")]
    pub partitions: Option<String>,
    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, env = "GRIBMIRROR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    /// Log output: `json`, `pretty`, or `auto`.
    #[arg(long, env = "GRIBMIRROR_LOG_FORMAT", default_value = "auto")]
    pub log_format: String,
}

impl Cli {
    /// Configuration overrides expressed by the flags.
    #[must_use]
    pub fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone(),
            password: self.password.clone(),
            base_dir: self.base_dir.clone(),
            destination_root: self.destination.clone(),
            partitions: self.partitions.as_deref().map(split_partitions),
            concurrency: self.concurrency,
            queue_capacity: self.queue_capacity,
            attempt_timeout_secs: self.attempt_timeout_secs,
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            dead_letter_path: self.dead_letter.clone(),
            nats_url: self.nats_url.clone(),
            subject: self.subject.clone(),
            notify_enabled: self.no_notify.then_some(false),
            ..ConfigLayer::default()
        }
    }
}

fn split_partitions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}
