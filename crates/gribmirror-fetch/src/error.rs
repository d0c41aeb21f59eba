//! # Design
//!
//! - Constant-message errors for the fetch pipeline.
//! - Context (stage, paths, sizes) lives in fields so logs and dead letters
//!   can report it without parsing messages.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use gribmirror_config::ConfigError;
use gribmirror_remote::RemoteError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for fetch pipeline operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Step of a fetch attempt at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    /// Preparing the local destination directory.
    Prepare,
    /// Dialling and authenticating.
    Connect,
    /// Entering the remote subdirectory.
    ChangeDir,
    /// Requesting the retrieval stream.
    Retrieve,
    /// Copying bytes into the local file.
    Write,
    /// Confirming the transfer and its size.
    Verify,
    /// The attempt exceeded its time budget.
    Timeout,
}

impl FetchStage {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Connect => "connect",
            Self::ChangeDir => "change_dir",
            Self::Retrieve => "retrieve",
            Self::Write => "write",
            Self::Verify => "verify",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the fetch pipeline.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A remote operation failed during a fetch attempt.
    #[error("remote operation failed")]
    Remote {
        /// Stage of the attempt.
        stage: FetchStage,
        /// Remote path involved.
        remote_path: String,
        /// Underlying remote error.
        #[source]
        source: RemoteError,
    },
    /// A local filesystem operation failed.
    #[error("local filesystem operation failed")]
    Io {
        /// Stage of the attempt.
        stage: FetchStage,
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The transfer ended with a different size than the listing reported.
    #[error("transferred size does not match listing")]
    SizeMismatch {
        /// Local target path.
        path: PathBuf,
        /// Size reported by the remote listing.
        expected: u64,
        /// Bytes actually written.
        actual: u64,
    },
    /// The attempt did not finish within the configured bound.
    #[error("fetch attempt timed out")]
    TimedOut {
        /// Local target path.
        path: PathBuf,
        /// Configured bound.
        after: Duration,
    },
    /// Listing the remote tree failed before any work was planned.
    #[error("remote discovery failed")]
    Discovery {
        /// Remote path being listed.
        remote_path: String,
        /// Underlying remote error.
        #[source]
        source: RemoteError,
    },
    /// The layout patterns could not be compiled.
    #[error("invalid layout configuration")]
    Layout {
        /// Underlying configuration error.
        #[source]
        source: ConfigError,
    },
    /// The sentinel intent was submitted as work.
    #[error("empty fetch intent submitted")]
    EmptyIntent,
    /// The fetch queue no longer accepts work.
    #[error("fetch queue closed")]
    QueueClosed,
}

impl FetchError {
    /// Stage label for attempt failures; `None` for pipeline-level errors.
    #[must_use]
    pub const fn stage(&self) -> Option<FetchStage> {
        match self {
            Self::Remote { stage, .. } | Self::Io { stage, .. } => Some(*stage),
            Self::SizeMismatch { .. } => Some(FetchStage::Verify),
            Self::TimedOut { .. } => Some(FetchStage::Timeout),
            Self::Discovery { .. }
            | Self::Layout { .. }
            | Self::EmptyIntent
            | Self::QueueClosed => None,
        }
    }
}

/// Render an error and its source chain on one line.
#[must_use]
pub fn render_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
