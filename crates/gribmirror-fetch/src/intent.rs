//! The unit of work flowing through the pipeline.

use std::path::{Path, PathBuf};

use gribmirror_remote::RemoteEntry;

/// A fully specified, not yet executed fetch.
///
/// The remote source is `base_dir/sub_dir/name` and the local target is
/// `destination_root/sub_dir/name`. Retries resubmit the same intent with
/// only `attempt` advanced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchIntent {
    /// Remote base directory.
    pub base_dir: String,
    /// Folder (and optional partition) relative to both roots.
    pub sub_dir: String,
    /// Listed remote file.
    pub entry: Option<RemoteEntry>,
    /// Local mirror root.
    pub destination_root: PathBuf,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl FetchIntent {
    /// Build a first-attempt intent.
    #[must_use]
    pub fn new(
        base_dir: impl Into<String>,
        sub_dir: impl Into<String>,
        entry: RemoteEntry,
        destination_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            sub_dir: sub_dir.into(),
            entry: Some(entry),
            destination_root: destination_root.into(),
            attempt: 1,
        }
    }

    /// Whether this is the "no intent" sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
            && self.base_dir.is_empty()
            && self.sub_dir.is_empty()
            && self.destination_root.as_os_str().is_empty()
    }

    /// File name of the listed entry.
    #[must_use]
    pub fn name(&self) -> &str {
        self.entry.as_ref().map_or("", |entry| entry.name.as_str())
    }

    /// Size reported by the listing.
    #[must_use]
    pub fn expected_size(&self) -> u64 {
        self.entry.as_ref().map_or(0, |entry| entry.size)
    }

    /// Remote directory holding the file.
    #[must_use]
    pub fn remote_dir(&self) -> String {
        join_remote(&self.base_dir, &self.sub_dir)
    }

    /// Remote path of the file.
    #[must_use]
    pub fn remote_path(&self) -> String {
        join_remote(&self.remote_dir(), self.name())
    }

    /// Local directory receiving the file.
    #[must_use]
    pub fn local_dir(&self) -> PathBuf {
        join_local(&self.destination_root, &self.sub_dir)
    }

    /// Local target path.
    #[must_use]
    pub fn local_path(&self) -> PathBuf {
        self.local_dir().join(self.name())
    }

    /// The same intent, one attempt later.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Join remote path segments with exactly one `/` between them.
#[must_use]
pub fn join_remote(base: &str, child: &str) -> String {
    let child = child.trim_matches('/');
    if child.is_empty() {
        return base.to_string();
    }
    let base = base.trim_end_matches('/');
    format!("{base}/{child}")
}

fn join_local(root: &Path, sub_dir: &str) -> PathBuf {
    sub_dir
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
