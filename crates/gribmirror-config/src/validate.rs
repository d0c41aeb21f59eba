//! Validation helpers for resolved configuration values.

use regex::Regex;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{LayoutConfig, MirrorConfig, NotifyConfig, PipelineConfig, RemoteConfig};

/// Validate every section of a resolved configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered.
pub fn validate(config: &MirrorConfig) -> ConfigResult<()> {
    validate_remote(&config.remote)?;
    validate_layout(&config.layout)?;
    validate_pipeline(&config.pipeline)?;
    validate_notify(&config.notify)?;
    if config.destination_root.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "mirror",
            "destination_root",
            "empty",
            None,
        ));
    }
    Ok(())
}

fn validate_remote(remote: &RemoteConfig) -> ConfigResult<()> {
    if remote.host.trim().is_empty() {
        return Err(ConfigError::invalid("remote", "host", "empty", None));
    }
    if remote.port == 0 {
        return Err(ConfigError::invalid(
            "remote",
            "port",
            "zero",
            Some(remote.port.to_string()),
        ));
    }
    if remote.base_dir.trim().is_empty() {
        return Err(ConfigError::invalid("remote", "base_dir", "empty", None));
    }
    if remote.connect_timeout.is_zero() {
        return Err(ConfigError::invalid(
            "remote",
            "connect_timeout",
            "zero",
            None,
        ));
    }
    Ok(())
}

fn validate_layout(layout: &LayoutConfig) -> ConfigResult<()> {
    compile_pattern("folder_pattern", &layout.folder_pattern)?;
    compile_pattern("payload_pattern", &layout.payload_pattern)?;
    for partition in &layout.partitions {
        if partition.trim().is_empty() {
            return Err(ConfigError::invalid(
                "layout",
                "partitions",
                "empty_entry",
                None,
            ));
        }
        if partition.contains('/') {
            return Err(ConfigError::invalid(
                "layout",
                "partitions",
                "contains_separator",
                Some(partition.clone()),
            ));
        }
    }
    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> ConfigResult<()> {
    if pipeline.concurrency == 0 {
        return Err(ConfigError::invalid(
            "pipeline",
            "concurrency",
            "zero",
            Some("0".to_string()),
        ));
    }
    if pipeline.queue_capacity == 0 {
        return Err(ConfigError::invalid(
            "pipeline",
            "queue_capacity",
            "zero",
            Some("0".to_string()),
        ));
    }
    if pipeline.attempt_timeout.is_some_and(|timeout| timeout.is_zero()) {
        return Err(ConfigError::invalid(
            "pipeline",
            "attempt_timeout",
            "zero",
            None,
        ));
    }

    let retry = &pipeline.retry;
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        return Err(ConfigError::invalid(
            "retry",
            "multiplier",
            "below_one",
            Some(retry.multiplier.to_string()),
        ));
    }
    if retry.initial_backoff > retry.max_backoff {
        return Err(ConfigError::invalid(
            "retry",
            "initial_backoff",
            "exceeds_max_backoff",
            Some(format!("{}ms", retry.initial_backoff.as_millis())),
        ));
    }
    Ok(())
}

fn validate_notify(notify: &NotifyConfig) -> ConfigResult<()> {
    if notify.subject.trim().is_empty() {
        return Err(ConfigError::invalid("notify", "subject", "empty", None));
    }
    if let Some(url) = &notify.nats_url
        && url.trim().is_empty()
    {
        return Err(ConfigError::invalid("notify", "nats_url", "empty", None));
    }
    Ok(())
}

/// Compile a configured regex, mapping failures onto [`ConfigError::InvalidPattern`].
///
/// # Errors
///
/// Returns an error when the pattern is not a valid regular expression.
pub fn compile_pattern(field: &'static str, pattern: &str) -> ConfigResult<Regex> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        field,
        pattern: pattern.to_string(),
        source,
    })
}
