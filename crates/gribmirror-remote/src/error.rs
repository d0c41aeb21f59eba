//! Error types for remote transfers.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors raised by remote transports and sessions.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The control connection could not be established.
    #[error("remote connect failed")]
    Connect {
        /// Address that was dialled.
        address: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },
    /// The server rejected the credentials.
    #[error("remote login failed")]
    Login {
        /// Account used.
        username: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },
    /// A protocol command failed.
    #[error("remote command failed")]
    Command {
        /// Command being executed.
        operation: &'static str,
        /// Remote path involved.
        path: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },
    /// Moving payload bytes failed or stopped short.
    #[error("remote transfer failed")]
    Transfer {
        /// Remote file involved.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The session was used after it was closed or while busy.
    #[error("remote session unavailable")]
    SessionUnavailable {
        /// Operation that could not run.
        operation: &'static str,
    },
    /// A blocking worker running a remote command panicked or was cancelled.
    #[error("remote worker failed")]
    Worker {
        /// Operation that was running.
        operation: &'static str,
        /// Join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl RemoteError {
    /// Build a [`RemoteError::Command`] from any error type.
    pub fn command(
        operation: &'static str,
        path: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Command {
            operation,
            path: path.into(),
            source: source.into(),
        }
    }

    /// Short stage label used in logs.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Login { .. } => "login",
            Self::Command { operation, .. }
            | Self::SessionUnavailable { operation }
            | Self::Worker { operation, .. } => operation,
            Self::Transfer { .. } => "transfer",
        }
    }
}

/// Convenience alias for remote results.
pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_reports_command_tag() {
        let err = RemoteError::command("list", "/pub/data", io::Error::other("550"));
        assert_eq!(err.operation(), "list");
        assert_eq!(err.to_string(), "remote command failed");
        assert!(err.source().is_some());

        let closed = RemoteError::SessionUnavailable {
            operation: "retrieve",
        };
        assert_eq!(closed.operation(), "retrieve");
    }
}
