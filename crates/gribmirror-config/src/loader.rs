//! Layered configuration loading.
//!
//! # Design
//! - Built-in defaults are overlaid by an optional JSON file, then by explicit
//!   overrides (CLI flags and environment). Later layers win per field.
//! - The result is validated once and never mutated afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::model::MirrorConfig;
use crate::validate::validate;

/// Sparse configuration layer; `None` fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// Remote host name.
    pub host: Option<String>,
    /// Remote control port.
    pub port: Option<u16>,
    /// Login name.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Remote base directory.
    pub base_dir: Option<String>,
    /// Dial timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Local mirror root.
    pub destination_root: Option<PathBuf>,
    /// Relevant folder regex.
    pub folder_pattern: Option<String>,
    /// Payload file regex.
    pub payload_pattern: Option<String>,
    /// Substring excluding sidecar files.
    pub exclude_substring: Option<String>,
    /// Partition names beneath each folder.
    pub partitions: Option<Vec<String>>,
    /// Concurrent fetch ceiling.
    pub concurrency: Option<usize>,
    /// Fetch queue capacity.
    pub queue_capacity: Option<usize>,
    /// Per-attempt timeout in seconds; `0` disables the timeout.
    pub attempt_timeout_secs: Option<u64>,
    /// Attempts per intent; `0` retries without limit.
    pub max_attempts: Option<u32>,
    /// First retry delay in milliseconds.
    pub initial_backoff_ms: Option<u64>,
    /// Retry delay ceiling in milliseconds.
    pub max_backoff_ms: Option<u64>,
    /// Backoff growth factor.
    pub backoff_multiplier: Option<f64>,
    /// Dead-letter JSON lines file.
    pub dead_letter_path: Option<PathBuf>,
    /// NATS server URL.
    pub nats_url: Option<String>,
    /// Notification subject.
    pub subject: Option<String>,
    /// Whether completion notifications are published at all.
    pub notify_enabled: Option<bool>,
}

impl ConfigLayer {
    /// Read a layer from a JSON document on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains unknown or
    /// mistyped fields.
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            operation: "config.read",
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
            base_dir: other.base_dir.or(self.base_dir),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            destination_root: other.destination_root.or(self.destination_root),
            folder_pattern: other.folder_pattern.or(self.folder_pattern),
            payload_pattern: other.payload_pattern.or(self.payload_pattern),
            exclude_substring: other.exclude_substring.or(self.exclude_substring),
            partitions: other.partitions.or(self.partitions),
            concurrency: other.concurrency.or(self.concurrency),
            queue_capacity: other.queue_capacity.or(self.queue_capacity),
            attempt_timeout_secs: other.attempt_timeout_secs.or(self.attempt_timeout_secs),
            max_attempts: other.max_attempts.or(self.max_attempts),
            initial_backoff_ms: other.initial_backoff_ms.or(self.initial_backoff_ms),
            max_backoff_ms: other.max_backoff_ms.or(self.max_backoff_ms),
            backoff_multiplier: other.backoff_multiplier.or(self.backoff_multiplier),
            dead_letter_path: other.dead_letter_path.or(self.dead_letter_path),
            nats_url: other.nats_url.or(self.nats_url),
            subject: other.subject.or(self.subject),
            notify_enabled: other.notify_enabled.or(self.notify_enabled),
        }
    }

    /// Apply this layer to `base`, returning the updated configuration.
    #[must_use]
    pub fn apply(self, mut base: MirrorConfig) -> MirrorConfig {
        let remote = &mut base.remote;
        set(&mut remote.host, self.host);
        set(&mut remote.port, self.port);
        set(&mut remote.username, self.username);
        set(&mut remote.password, self.password);
        set(&mut remote.base_dir, self.base_dir);
        set(
            &mut remote.connect_timeout,
            self.connect_timeout_ms.map(Duration::from_millis),
        );

        set(&mut base.destination_root, self.destination_root);

        let layout = &mut base.layout;
        set(&mut layout.folder_pattern, self.folder_pattern);
        set(&mut layout.payload_pattern, self.payload_pattern);
        set(&mut layout.exclude_substring, self.exclude_substring);
        set(&mut layout.partitions, self.partitions);

        let pipeline = &mut base.pipeline;
        set(&mut pipeline.concurrency, self.concurrency);
        set(&mut pipeline.queue_capacity, self.queue_capacity);
        if let Some(secs) = self.attempt_timeout_secs {
            pipeline.attempt_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if self.dead_letter_path.is_some() {
            pipeline.dead_letter_path = self.dead_letter_path;
        }

        let retry = &mut pipeline.retry;
        set(&mut retry.max_attempts, self.max_attempts);
        set(
            &mut retry.initial_backoff,
            self.initial_backoff_ms.map(Duration::from_millis),
        );
        set(
            &mut retry.max_backoff,
            self.max_backoff_ms.map(Duration::from_millis),
        );
        set(&mut retry.multiplier, self.backoff_multiplier);

        let notify = &mut base.notify;
        if self.nats_url.is_some() {
            notify.nats_url = self.nats_url;
        }
        set(&mut notify.subject, self.subject);
        if self.notify_enabled == Some(false) {
            notify.nats_url = None;
        }

        base
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl MirrorConfig {
    /// Resolve configuration from defaults, an optional JSON file and explicit
    /// overrides, then validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the merged
    /// configuration fails validation.
    pub fn load(file: Option<&Path>, overrides: ConfigLayer) -> ConfigResult<Self> {
        let file_layer = match file {
            Some(path) => ConfigLayer::from_json_file(path)?,
            None => ConfigLayer::default(),
        };
        Self::from_layer(file_layer.merge(overrides))
    }

    /// Apply a single layer on top of the defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration fails validation.
    pub fn from_layer(layer: ConfigLayer) -> ConfigResult<Self> {
        let config = layer.apply(Self::default());
        validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layer_wins_per_field() {
        let file = ConfigLayer {
            host: Some("file.example".into()),
            concurrency: Some(4),
            ..ConfigLayer::default()
        };
        let cli = ConfigLayer {
            concurrency: Some(8),
            ..ConfigLayer::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.host.as_deref(), Some("file.example"));
        assert_eq!(merged.concurrency, Some(8));
    }

    #[test]
    fn zero_attempt_timeout_disables_the_timeout() -> ConfigResult<()> {
        let config = MirrorConfig::from_layer(ConfigLayer {
            attempt_timeout_secs: Some(0),
            ..ConfigLayer::default()
        })?;
        assert_eq!(config.pipeline.attempt_timeout, None);

        let config = MirrorConfig::from_layer(ConfigLayer {
            attempt_timeout_secs: Some(90),
            ..ConfigLayer::default()
        })?;
        assert_eq!(
            config.pipeline.attempt_timeout,
            Some(Duration::from_secs(90))
        );
        Ok(())
    }

    #[test]
    fn disabling_notifications_clears_the_url() -> ConfigResult<()> {
        let config = MirrorConfig::from_layer(ConfigLayer {
            nats_url: Some("nats://localhost:4222".into()),
            notify_enabled: Some(false),
            ..ConfigLayer::default()
        })?;
        assert_eq!(config.notify.nats_url, None);
        Ok(())
    }

    #[test]
    fn empty_partition_list_selects_single_level_layout() -> ConfigResult<()> {
        let config = MirrorConfig::from_layer(ConfigLayer {
            partitions: Some(Vec::new()),
            ..ConfigLayer::default()
        })?;
        assert!(config.layout.partitions.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_override_is_rejected() {
        let result = MirrorConfig::from_layer(ConfigLayer {
            concurrency: Some(0),
            ..ConfigLayer::default()
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField {
                field: "concurrency",
                ..
            })
        ));
    }
}
