//! Remote discovery of relevant folders and payload files.
//!
//! # Design
//! - One session lists the base directory, then each relevant folder (or
//!   each of its partitions).
//! - Folders and files are ordered newest-first so recent data is queued
//!   ahead of backlog.
//! - A failed partition listing is skipped and reported; a failed base
//!   listing aborts the run.

use gribmirror_config::LayoutConfig;
use gribmirror_config::validate::compile_pattern;
use gribmirror_remote::{RemoteEntry, RemoteSession};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchResult};
use crate::intent::join_remote;

/// Predicates selecting folders and payload files.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    folder: Regex,
    payload: Regex,
    exclude: String,
}

impl RelevanceFilter {
    /// Compile the layout patterns.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Layout`] if a pattern does not compile.
    pub fn from_layout(layout: &LayoutConfig) -> FetchResult<Self> {
        let folder = compile_pattern("folder_pattern", &layout.folder_pattern)
            .map_err(|source| FetchError::Layout { source })?;
        let payload = compile_pattern("payload_pattern", &layout.payload_pattern)
            .map_err(|source| FetchError::Layout { source })?;
        Ok(Self {
            folder,
            payload,
            exclude: layout.exclude_substring.clone(),
        })
    }

    /// Directory whose name matches the folder pattern.
    #[must_use]
    pub fn is_relevant_folder(&self, entry: &RemoteEntry) -> bool {
        entry.is_directory() && self.folder.is_match(&entry.name)
    }

    /// File whose name matches the payload pattern and does not contain the
    /// exclusion substring.
    #[must_use]
    pub fn is_payload(&self, entry: &RemoteEntry) -> bool {
        entry.is_file()
            && self.payload.is_match(&entry.name)
            && (self.exclude.is_empty() || !entry.name.contains(&self.exclude))
    }
}

/// Payload files found in one folder or partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBatch {
    /// Path relative to the base directory, e.g. `gfs.20240101/06`.
    pub sub_dir: String,
    /// Payload files, newest first.
    pub entries: Vec<RemoteEntry>,
}

/// Everything discovery found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Relevant folders, newest first.
    pub folders: Vec<RemoteEntry>,
    /// One batch per listed folder or partition.
    pub batches: Vec<FileBatch>,
    /// Sub-directories whose listing failed.
    pub skipped: Vec<String>,
}

impl DiscoveryOutcome {
    /// Total payload files across all batches.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.entries.len()).sum()
    }
}

/// Lists the remote tree through a [`RelevanceFilter`].
#[derive(Debug, Clone)]
pub struct Discovery {
    filter: RelevanceFilter,
    partitions: Vec<String>,
}

impl Discovery {
    /// Discovery over the given partition layout; an empty list means files
    /// live directly in each folder.
    #[must_use]
    pub const fn new(filter: RelevanceFilter, partitions: Vec<String>) -> Self {
        Self { filter, partitions }
    }

    /// Walk `base_dir` and collect payload batches.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Discovery`] if the base directory cannot be
    /// listed.
    pub async fn discover(
        &self,
        session: &mut dyn RemoteSession,
        base_dir: &str,
    ) -> FetchResult<DiscoveryOutcome> {
        let listing = session
            .list(base_dir)
            .await
            .map_err(|source| FetchError::Discovery {
                remote_path: base_dir.to_string(),
                source,
            })?;
        let mut folders: Vec<RemoteEntry> = listing
            .into_iter()
            .filter(|entry| self.filter.is_relevant_folder(entry))
            .collect();
        sort_newest_first(&mut folders);
        info!(
            remote_path = base_dir,
            folders = folders.len(),
            "listed relevant folders"
        );

        let mut outcome = DiscoveryOutcome::default();
        for folder in &folders {
            for sub_dir in self.sub_dirs(&folder.name) {
                let remote_dir = join_remote(base_dir, &sub_dir);
                match session.list(&remote_dir).await {
                    Ok(listing) => {
                        let batch = self.batch(sub_dir, listing);
                        debug!(
                            remote_path = %remote_dir,
                            files = batch.entries.len(),
                            "listed payload files"
                        );
                        outcome.batches.push(batch);
                    }
                    Err(err) => {
                        warn!(
                            remote_path = %remote_dir,
                            error = %err,
                            "listing failed; skipping"
                        );
                        outcome.skipped.push(sub_dir);
                    }
                }
            }
        }
        outcome.folders = folders;
        Ok(outcome)
    }

    fn sub_dirs(&self, folder: &str) -> Vec<String> {
        if self.partitions.is_empty() {
            return vec![folder.to_string()];
        }
        self.partitions
            .iter()
            .map(|partition| format!("{folder}/{partition}"))
            .collect()
    }

    fn batch(&self, sub_dir: String, listing: Vec<RemoteEntry>) -> FileBatch {
        let mut entries = Vec::with_capacity(listing.len());
        for entry in listing {
            if self.filter.is_payload(&entry) {
                entries.push(entry);
            } else {
                debug!(file = %entry.name, sub_dir = %sub_dir, "ignoring entry");
            }
        }
        sort_newest_first(&mut entries);
        FileBatch { sub_dir, entries }
    }
}

/// Stable sort by modification time, most recent first.
fn sort_newest_first(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn at(hours: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_200 + hours * 3_600, 0).unwrap_or_default()
    }

    fn filter() -> RelevanceFilter {
        RelevanceFilter::from_layout(&LayoutConfig::default()).expect("default layout compiles")
    }

    #[test]
    fn folder_filter_requires_directories() {
        let filter = filter();
        assert!(filter.is_relevant_folder(&RemoteEntry::directory("gfs.20240101", at(0))));
        assert!(!filter.is_relevant_folder(&RemoteEntry::directory("gdas.20240101", at(0))));
        assert!(!filter.is_relevant_folder(&RemoteEntry::file("gfs.20240101", 1, at(0))));
    }

    #[test]
    fn payload_filter_excludes_sidecars() {
        let filter = filter();
        assert!(filter.is_payload(&RemoteEntry::file("gfs.t00z.pgrb2.1p00.f000", 1, at(0))));
        assert!(!filter.is_payload(&RemoteEntry::file(
            "gfs.t00z.pgrb2.1p00.f000.idx",
            1,
            at(0)
        )));
        assert!(!filter.is_payload(&RemoteEntry::file("other.txt", 1, at(0))));
        assert!(!filter.is_payload(&RemoteEntry::directory("gfs.t00z.pgrb2.1p00.f000", at(0))));
    }

    #[test]
    fn invalid_pattern_is_a_layout_error() {
        let layout = LayoutConfig {
            folder_pattern: "gfs.(".into(),
            ..LayoutConfig::default()
        };
        assert!(matches!(
            RelevanceFilter::from_layout(&layout),
            Err(FetchError::Layout { .. })
        ));
    }

    #[test]
    fn sort_is_newest_first_and_stable() {
        let mut entries = vec![
            RemoteEntry::file("old", 1, at(1)),
            RemoteEntry::file("tie-a", 1, at(2)),
            RemoteEntry::file("new", 1, at(3)),
            RemoteEntry::file("tie-b", 1, at(2)),
        ];
        sort_newest_first(&mut entries);
        let names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["new", "tie-a", "tie-b", "old"]);
    }

    #[test]
    fn partitions_expand_each_folder() {
        let discovery = Discovery::new(filter(), vec!["00".into(), "06".into()]);
        assert_eq!(
            discovery.sub_dirs("gfs.20240101"),
            ["gfs.20240101/00", "gfs.20240101/06"]
        );
        let single = Discovery::new(filter(), Vec::new());
        assert_eq!(single.sub_dirs("gfs.20240101"), ["gfs.20240101"]);
    }
}
