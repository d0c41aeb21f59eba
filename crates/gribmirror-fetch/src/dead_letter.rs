//! Record of intents that exhausted their attempts.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::FetchStage;
use crate::intent::FetchIntent;

/// One abandoned intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Remote source path.
    pub remote_path: String,
    /// Local target path.
    pub local_path: PathBuf,
    /// Remote modification time, as listed.
    pub modified: Option<DateTime<Utc>>,
    /// Attempts made.
    pub attempts: u32,
    /// Stage of the final failure.
    pub stage: Option<FetchStage>,
    /// Rendered final error.
    pub error: String,
    /// When the intent was abandoned.
    pub recorded_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Describe `intent` abandoned after its last failure.
    #[must_use]
    pub fn new(intent: &FetchIntent, stage: Option<FetchStage>, error: String) -> Self {
        Self {
            remote_path: intent.remote_path(),
            local_path: intent.local_path(),
            modified: intent.entry.as_ref().map(|entry| entry.modified),
            attempts: intent.attempt,
            stage,
            error,
            recorded_at: Utc::now(),
        }
    }
}

/// In-memory dead-letter list, optionally mirrored to a JSON lines file.
#[derive(Clone, Debug, Default)]
pub struct DeadLetterLog {
    entries: Arc<Mutex<Vec<DeadLetter>>>,
    file: Option<PathBuf>,
}

impl DeadLetterLog {
    /// Log appending to `file` when set.
    #[must_use]
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            entries: Arc::default(),
            file,
        }
    }

    /// Store `letter`. File write failures are logged; the in-memory record
    /// is kept regardless.
    pub async fn record(&self, letter: DeadLetter) {
        if let Some(path) = &self.file
            && let Err(err) = append_line(path, &letter).await
        {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to persist dead letter"
            );
        }
        self.lock().push(letter);
    }

    /// Entries recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.lock().clone()
    }

    /// Number of entries recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeadLetter>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn append_line(path: &Path, letter: &DeadLetter) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(letter).map_err(std::io::Error::other)?;
    line.push(b'\n');
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use gribmirror_remote::RemoteEntry;

    fn intent() -> FetchIntent {
        let entry = RemoteEntry::file("gfs.t00z.pgrb2.1p00.f000", 10, Utc::now());
        FetchIntent {
            attempt: 3,
            ..FetchIntent::new("/base", "gfs.20240101", entry, "/mirror")
        }
    }

    #[tokio::test]
    async fn records_are_appended_as_json_lines() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state/dead-letters.jsonl");
        let log = DeadLetterLog::new(Some(path.clone()));

        log.record(DeadLetter::new(
            &intent(),
            Some(FetchStage::Connect),
            "connection refused".into(),
        ))
        .await;
        log.record(DeadLetter::new(&intent(), None, "queue closed".into()))
            .await;

        assert_eq!(log.len(), 2);
        let raw = tokio::fs::read_to_string(&path).await?;
        let lines: Vec<DeadLetter> = raw
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].attempts, 3);
        assert_eq!(lines[0].stage, Some(FetchStage::Connect));
        assert_eq!(
            lines[0].remote_path,
            "/base/gfs.20240101/gfs.t00z.pgrb2.1p00.f000"
        );
        Ok(())
    }

    #[tokio::test]
    async fn memory_only_log_keeps_entries() {
        let log = DeadLetterLog::default();
        assert!(log.is_empty());
        log.record(DeadLetter::new(&intent(), None, "boom".into()))
            .await;
        assert_eq!(log.entries()[0].error, "boom");
    }
}
