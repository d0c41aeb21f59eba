//! # Design
//!
//! - Centralize application-level errors for bootstrap and the mirror run.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: gribmirror_config::ConfigError,
    },
    /// Telemetry setup failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: gribmirror_telemetry::TelemetryError,
    },
    /// The mirror run failed before draining.
    #[error("mirror run failed")]
    Pipeline {
        /// Operation identifier.
        operation: &'static str,
        /// Source pipeline error.
        source: gribmirror_fetch::FetchError,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: gribmirror_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: gribmirror_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn pipeline(
        operation: &'static str,
        source: gribmirror_fetch::FetchError,
    ) -> Self {
        Self::Pipeline { operation, source }
    }

    /// Operation tag carried by every variant.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Config { operation, .. }
            | Self::Telemetry { operation, .. }
            | Self::Pipeline { operation, .. } => operation,
        }
    }
}
