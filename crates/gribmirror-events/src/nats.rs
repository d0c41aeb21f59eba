//! NATS-backed publisher.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::notify::{NotifyError, NotifyResult, Publisher};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Publisher writing to a NATS server.
#[derive(Debug, Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    /// Connect to the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or does not answer in
    /// time.
    pub async fn connect(url: &str) -> NotifyResult<Self> {
        let client = tokio::time::timeout(CONNECT_TIMEOUT, async_nats::connect(url))
            .await
            .map_err(|_| NotifyError::ConnectTimeout {
                url: url.to_string(),
            })?
            .map_err(|source| NotifyError::Connect {
                url: url.to_string(),
                source: Box::new(source),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> NotifyResult<()> {
        self.client
            .publish(subject.to_string(), Bytes::from(payload))
            .await
            .map_err(|source| NotifyError::Publish {
                subject: subject.to_string(),
                source: Box::new(source),
            })
    }

    async fn flush(&self) -> NotifyResult<()> {
        self.client
            .flush()
            .await
            .map_err(|source| NotifyError::Flush {
                source: Box::new(source),
            })
    }
}
