//! Remote directory listing entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a listed remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file.
    File,
    /// A symbolic link.
    Link,
}

/// Immutable metadata for one remote entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Entry name, without any directory component.
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes as reported by the remote.
    pub size: u64,
    /// Modification time as reported by the remote.
    pub modified: DateTime<Utc>,
}

impl RemoteEntry {
    /// Build a file entry.
    #[must_use]
    pub fn file(name: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            modified,
        }
    }

    /// Build a directory entry.
    #[must_use]
    pub fn directory(name: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
            modified,
        }
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Whether the entry is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}
