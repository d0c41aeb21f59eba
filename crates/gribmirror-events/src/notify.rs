//! Completion notification sink.
//!
//! # Design
//! - The sink is chosen once at startup: either a connected publisher bound
//!   to a subject, or a disconnected placeholder that only logs.
//! - Publishing never fails the caller. Errors are logged and the completed
//!   file stays on disk.

use std::sync::Arc;

use async_trait::async_trait;
use gribmirror_config::NotifyConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::nats::NatsPublisher;

/// Errors raised by notification publishers.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Connecting to the notification server failed.
    #[error("notification connect failed")]
    Connect {
        /// Server URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Connecting did not complete within the allotted time.
    #[error("notification connect timed out")]
    ConnectTimeout {
        /// Server URL.
        url: String,
    },
    /// Publishing a message failed.
    #[error("notification publish failed")]
    Publish {
        /// Subject published to.
        subject: String,
        /// Underlying client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Flushing buffered messages failed.
    #[error("notification flush failed")]
    Flush {
        /// Underlying client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Convenience alias for notification results.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Message transport used by a connected sink.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `subject`.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> NotifyResult<()>;

    /// Push any buffered messages to the server.
    async fn flush(&self) -> NotifyResult<()> {
        Ok(())
    }
}

/// Fire-and-forget sink announcing completed files.
#[derive(Clone)]
pub enum NotificationSink {
    /// Messages are published on `subject`.
    Connected {
        /// Transport used for publishing.
        publisher: Arc<dyn Publisher>,
        /// Subject every completion is published on.
        subject: Arc<str>,
    },
    /// Notifications are disabled or the server was unreachable.
    Disconnected {
        /// Why the sink is inert.
        reason: Arc<str>,
    },
}

impl NotificationSink {
    /// Select a sink from configuration. A missing URL or an unreachable
    /// server yields a disconnected sink rather than an error.
    pub async fn connect(config: &NotifyConfig) -> Self {
        let Some(url) = config.nats_url.as_deref() else {
            info!("completion notifications disabled");
            return Self::disconnected("notifications disabled");
        };
        match NatsPublisher::connect(url).await {
            Ok(publisher) => {
                info!(url, subject = %config.subject, "notification sink connected");
                Self::connected(Arc::new(publisher), &config.subject)
            }
            Err(err) => {
                warn!(
                    url,
                    error = %err,
                    error_source = ?std::error::Error::source(&err).map(ToString::to_string),
                    "notification sink unavailable; continuing without notifications"
                );
                Self::disconnected(err.to_string())
            }
        }
    }

    /// Build a sink around an existing publisher.
    #[must_use]
    pub fn connected(publisher: Arc<dyn Publisher>, subject: &str) -> Self {
        Self::Connected {
            publisher,
            subject: Arc::from(subject),
        }
    }

    /// Build an inert sink.
    #[must_use]
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: Arc::from(reason.into()),
        }
    }

    /// Whether messages will actually be published.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Announce a completed file. Failures are logged and swallowed.
    pub async fn publish(&self, name: &str) {
        match self {
            Self::Connected { publisher, subject } => {
                if let Err(err) = publisher.publish(subject, name.as_bytes().to_vec()).await {
                    warn!(subject = %subject, file = name, error = %err, "completion notification failed");
                }
            }
            Self::Disconnected { reason } => {
                debug!(file = name, reason = %reason, "completion notification skipped");
            }
        }
    }

    /// Flush pending messages before shutdown.
    pub async fn flush(&self) {
        if let Self::Connected { publisher, .. } = self
            && let Err(err) = publisher.flush().await
        {
            warn!(error = %err, "notification flush failed");
        }
    }
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected { subject, .. } => f
                .debug_struct("Connected")
                .field("subject", subject)
                .finish_non_exhaustive(),
            Self::Disconnected { reason } => f
                .debug_struct("Disconnected")
                .field("reason", reason)
                .finish(),
        }
    }
}
