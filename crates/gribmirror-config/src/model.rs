//! Typed configuration sections.
//!
//! # Design
//! - Pure data carriers built once at startup and shared behind an `Arc`.
//! - Every component reads the same immutable value; nothing mutates it after
//!   validation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::defaults;

/// Fully resolved configuration for one mirror run.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorConfig {
    /// Remote server coordinates and credentials.
    pub remote: RemoteConfig,
    /// Naming rules used to select folders and payload files.
    pub layout: LayoutConfig,
    /// Concurrency, queueing and retry settings for the fetch pipeline.
    pub pipeline: PipelineConfig,
    /// Completion notification settings.
    pub notify: NotifyConfig,
    /// Local directory that mirrors the remote tree.
    pub destination_root: PathBuf,
}

impl MirrorConfig {
    /// Local mirror root.
    #[must_use]
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            layout: LayoutConfig::default(),
            pipeline: PipelineConfig::default(),
            notify: NotifyConfig::default(),
            destination_root: PathBuf::from(defaults::DESTINATION_ROOT),
        }
    }
}

/// Remote server coordinates and credentials.
#[derive(Clone, Serialize)]
pub struct RemoteConfig {
    /// Host name or address of the remote server.
    pub host: String,
    /// Control-channel port.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Login password.
    #[serde(skip_serializing)]
    pub password: String,
    /// Remote directory holding the dated folders.
    pub base_dir: String,
    /// Timeout applied when dialing the server.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl RemoteConfig {
    /// `host:port` pair used when dialing.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_dir", &self.base_dir)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            username: defaults::USERNAME.to_string(),
            password: defaults::PASSWORD.to_string(),
            base_dir: defaults::BASE_DIR.to_string(),
            connect_timeout: defaults::CONNECT_TIMEOUT,
        }
    }
}

/// Naming rules that decide which remote entries are mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutConfig {
    /// Regex a directory name must match to be considered a relevant folder.
    pub folder_pattern: String,
    /// Regex a file name must match to be considered a payload file.
    pub payload_pattern: String,
    /// File names containing this substring are never fetched.
    pub exclude_substring: String,
    /// Named sub-partitions listed beneath each relevant folder. Empty means
    /// payload files live directly inside the folder.
    pub partitions: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            folder_pattern: defaults::FOLDER_PATTERN.to_string(),
            payload_pattern: defaults::PAYLOAD_PATTERN.to_string(),
            exclude_substring: defaults::EXCLUDE_SUBSTRING.to_string(),
            partitions: defaults::PARTITIONS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Fetch pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Maximum number of fetches holding a remote connection at once.
    pub concurrency: usize,
    /// Capacity of the fetch queue; producers wait when it is full.
    pub queue_capacity: usize,
    /// Upper bound for a single fetch attempt, if any.
    #[serde(with = "duration_ms::option")]
    pub attempt_timeout: Option<Duration>,
    /// Retry behaviour for failed attempts.
    pub retry: RetryConfig,
    /// File receiving dead-lettered intents as JSON lines.
    pub dead_letter_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            queue_capacity: defaults::QUEUE_CAPACITY,
            attempt_timeout: None,
            retry: RetryConfig::default(),
            dead_letter_path: None,
        }
    }
}

/// Exponential backoff settings for failed fetch attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryConfig {
    /// Attempts allowed per intent; `0` retries without limit.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    /// Upper bound for the retry delay.
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
}

impl RetryConfig {
    /// Whether attempts are bounded.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.max_attempts > 0
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            initial_backoff: defaults::INITIAL_BACKOFF,
            max_backoff: defaults::MAX_BACKOFF,
            multiplier: defaults::BACKOFF_MULTIPLIER,
        }
    }
}

/// Completion notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyConfig {
    /// NATS server URL; `None` disables publishing.
    pub nats_url: Option<String>,
    /// Subject each completed file path is published on.
    pub subject: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            nats_url: Some(defaults::NATS_URL.to_string()),
            subject: defaults::SUBJECT.to_string(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(millis(*value))
    }

    pub(super) fn millis(value: Duration) -> u64 {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
    }

    pub(super) mod option {
        use std::time::Duration;

        use serde::Serializer;

        #[allow(clippy::ref_option)]
        pub(in super::super) fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&super::millis(*duration)),
                None => serializer.serialize_none(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_password() {
        let remote = RemoteConfig {
            password: "hunter2".into(),
            ..RemoteConfig::default()
        };
        let rendered = format!("{remote:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn serialized_config_omits_password() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(MirrorConfig::default())?;
        assert!(value["remote"].get("password").is_none());
        assert_eq!(value["remote"]["connect_timeout"], 15_000);
        assert_eq!(value["pipeline"]["attempt_timeout"], serde_json::Value::Null);
        Ok(())
    }

    #[test]
    fn defaults_follow_gfs_deployment() {
        let config = MirrorConfig::default();
        assert_eq!(config.remote.address(), "ftp.ncep.noaa.gov:21");
        assert_eq!(config.layout.partitions, vec!["00", "06", "12", "18"]);
        assert_eq!(config.pipeline.concurrency, 16);
        assert!(config.pipeline.retry.is_bounded());
    }
}
