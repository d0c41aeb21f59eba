//! Notification publisher that records every message.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use gribmirror_events::{NotificationSink, NotifyError, NotifyResult, Publisher};

/// Publisher capturing `(subject, payload)` pairs in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingPublisher {
    /// A publisher that accepts every message.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A publisher that rejects every message.
    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// Wrap this publisher in a connected sink on `subject`.
    #[must_use]
    pub fn sink(self: &Arc<Self>, subject: &str) -> NotificationSink {
        NotificationSink::connected(self.clone(), subject)
    }

    /// Payloads published so far, in order.
    #[must_use]
    pub fn payloads(&self) -> Vec<String> {
        self.lock().iter().map(|(_, payload)| payload.clone()).collect()
    }

    /// Subjects and payloads published so far, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<(String, String)> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, String)>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> NotifyResult<()> {
        if self.fail {
            return Err(NotifyError::Publish {
                subject: subject.to_string(),
                source: "publisher configured to fail".into(),
            });
        }
        self.lock().push((
            subject.to_string(),
            String::from_utf8_lossy(&payload).into_owned(),
        ));
        Ok(())
    }
}
