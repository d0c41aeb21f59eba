//! In-memory remote file server.
//!
//! # Design
//! - Directories and files live in a shared tree keyed by absolute path, so
//!   every session sees the same state.
//! - Failures are injected per operation with a remaining-count budget.
//! - Open sessions are counted so tests can assert the admission bound.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gribmirror_remote::{
    RemoteEntry, RemoteError, RemoteResult, RemoteSession, RemoteStream, RemoteTransport,
};

/// Shared in-memory remote implementing [`RemoteTransport`].
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    connects: AtomicUsize,
    active_sessions: AtomicUsize,
    max_sessions: AtomicUsize,
}

#[derive(Default)]
struct State {
    dirs: BTreeMap<String, Vec<RemoteEntry>>,
    files: HashMap<String, Vec<u8>>,
    connect_failures: u32,
    retrieve_failures: HashMap<String, u32>,
    truncations: HashMap<String, u32>,
    finish_failures: HashMap<String, u32>,
    path_delays: HashMap<String, Duration>,
    broken_listings: HashSet<String>,
    transfer_delay: Duration,
    retrievals: Vec<String>,
}

impl MemoryRemote {
    /// Empty remote containing only the root directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory (and any missing parents) at `path`.
    pub fn add_dir(&self, path: &str, modified: DateTime<Utc>) {
        let path = normalize(path);
        let mut state = self.state();
        ensure_dir(&mut state, &path, modified);
    }

    /// Create or replace a file at `path`. Missing parents are created with
    /// the same timestamp.
    pub fn add_file(&self, path: &str, contents: impl Into<Vec<u8>>, modified: DateTime<Utc>) {
        let path = normalize(path);
        let contents = contents.into();
        let (parent, name) = split(&path);
        let mut state = self.state();
        ensure_dir(&mut state, &parent, modified);
        let entry = RemoteEntry::file(
            name,
            u64::try_from(contents.len()).unwrap_or(u64::MAX),
            modified,
        );
        upsert(&mut state, &parent, entry);
        state.files.insert(path, contents);
    }

    /// Make the listing report `size` for `path` regardless of its contents.
    pub fn set_reported_size(&self, path: &str, size: u64) {
        let path = normalize(path);
        let (parent, name) = split(&path);
        let mut state = self.state();
        if let Some(entry) = state
            .dirs
            .get_mut(&parent)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.name == name))
        {
            entry.size = size;
        }
    }

    /// Fail the next `times` connection attempts.
    pub fn fail_connects(&self, times: u32) {
        self.state().connect_failures = times;
    }

    /// Fail the next `times` retrievals of `path`.
    pub fn fail_retrievals(&self, path: &str, times: u32) {
        self.state()
            .retrieve_failures
            .insert(normalize(path), times);
    }

    /// Deliver only half of `path` on the next `times` retrievals and report
    /// the short transfer when the retrieval is finished.
    pub fn truncate_retrievals(&self, path: &str, times: u32) {
        self.state().truncations.insert(normalize(path), times);
    }

    /// Deliver all of `path` on the next `times` retrievals, then reject the
    /// final transfer reply.
    pub fn fail_finishing(&self, path: &str, times: u32) {
        self.state().finish_failures.insert(normalize(path), times);
    }

    /// Hold retrievals of `path` open for `delay`, overriding the shared
    /// transfer delay.
    pub fn delay_retrievals(&self, path: &str, delay: Duration) {
        self.state().path_delays.insert(normalize(path), delay);
    }

    /// Make every listing of `path` fail.
    pub fn break_listing(&self, path: &str) {
        self.state().broken_listings.insert(normalize(path));
    }

    /// Hold each retrieval open for `delay` before returning its stream.
    pub fn set_transfer_delay(&self, delay: Duration) {
        self.state().transfer_delay = delay;
    }

    /// Successful and failed connection attempts so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Sessions currently open.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.inner.active_sessions.load(Ordering::SeqCst)
    }

    /// Highest number of sessions observed open at once.
    #[must_use]
    pub fn max_concurrent_sessions(&self) -> usize {
        self.inner.max_sessions.load(Ordering::SeqCst)
    }

    /// Absolute paths requested for retrieval, in request order.
    #[must_use]
    pub fn retrievals(&self) -> Vec<String> {
        self.state().retrievals.clone()
    }

    /// Number of retrieval requests for `path`.
    #[must_use]
    pub fn retrieval_count(&self, path: &str) -> usize {
        let path = normalize(path);
        self.state()
            .retrievals
            .iter()
            .filter(|requested| **requested == path)
            .count()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteTransport for MemoryRemote {
    async fn connect(&self) -> RemoteResult<Box<dyn RemoteSession>> {
        tokio::task::yield_now().await;
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state();
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(RemoteError::Connect {
                    address: "memory".into(),
                    source: "connection refused".into(),
                });
            }
        }
        let active = self.inner.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_sessions.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            remote: self.clone(),
            cwd: "/".into(),
            truncated: None,
            rejected: None,
            _slot: SessionSlot(self.inner.clone()),
        }))
    }
}

struct SessionSlot(Arc<Inner>);

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemorySession {
    remote: MemoryRemote,
    cwd: String,
    truncated: Option<String>,
    rejected: Option<String>,
    _slot: SessionSlot,
}

impl MemorySession {
    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            normalize(path)
        } else {
            normalize(&format!("{}/{path}", self.cwd))
        }
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn list(&mut self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let path = self.resolve(path);
        tokio::task::yield_now().await;
        let state = self.remote.state();
        if state.broken_listings.contains(&path) {
            return Err(RemoteError::command("list", path, "421 service not available"));
        }
        state
            .dirs
            .get(&path)
            .cloned()
            .ok_or_else(|| RemoteError::command("list", path, "550 no such directory"))
    }

    async fn change_dir(&mut self, path: &str) -> RemoteResult<()> {
        let path = self.resolve(path);
        if self.remote.state().dirs.contains_key(&path) {
            self.cwd = path;
            Ok(())
        } else {
            Err(RemoteError::command("change_dir", path, "550 no such directory"))
        }
    }

    async fn retrieve(&mut self, name: &str) -> RemoteResult<RemoteStream> {
        let path = self.resolve(name);
        let (mut bytes, delay) = {
            let mut state = self.remote.state();
            state.retrievals.push(path.clone());
            if let Some(remaining) = state.retrieve_failures.get_mut(&path)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(RemoteError::command("retrieve", path, "451 local error"));
            }
            let Some(bytes) = state.files.get(&path).cloned() else {
                return Err(RemoteError::command("retrieve", path, "550 no such file"));
            };
            if let Some(remaining) = state.truncations.get_mut(&path)
                && *remaining > 0
            {
                *remaining -= 1;
                self.truncated = Some(path.clone());
            }
            if let Some(remaining) = state.finish_failures.get_mut(&path)
                && *remaining > 0
            {
                *remaining -= 1;
                self.rejected = Some(path.clone());
            }
            let delay = state
                .path_delays
                .get(&path)
                .copied()
                .unwrap_or(state.transfer_delay);
            (bytes, delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        if self.truncated.is_some() {
            bytes.truncate(bytes.len() / 2);
        }
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn finish_retrieve(&mut self) -> RemoteResult<()> {
        match self.truncated.take() {
            Some(path) => Err(RemoteError::Transfer {
                path,
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "426 transfer aborted"),
            }),
            None => match self.rejected.take() {
                Some(path) => Err(RemoteError::command(
                    "finish_retrieve",
                    path,
                    "451 requested action aborted",
                )),
                None => Ok(()),
            },
        }
    }

    async fn close(&mut self) {
        self.truncated = None;
        self.rejected = None;
    }
}

fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn split(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (normalize(parent), name.to_string()),
        None => ("/".to_string(), path.to_string()),
    }
}

fn ensure_dir(state: &mut State, path: &str, modified: DateTime<Utc>) {
    if state.dirs.contains_key(path) {
        return;
    }
    state.dirs.insert(path.to_string(), Vec::new());
    if path == "/" {
        return;
    }
    let (parent, name) = split(path);
    ensure_dir(state, &parent, modified);
    upsert(state, &parent, RemoteEntry::directory(name, modified));
}

fn upsert(state: &mut State, dir: &str, entry: RemoteEntry) {
    let entries = state.dirs.entry(dir.to_string()).or_default();
    match entries.iter_mut().find(|existing| existing.name == entry.name) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}
