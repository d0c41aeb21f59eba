//! Per-path exclusion for local targets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

/// Set of local paths currently owned by a fetch task.
///
/// Dropping a [`PathClaim`] removes the path and reports it on the release
/// channel so the dispatcher can start the next deferred intent.
#[derive(Clone, Debug)]
pub struct InFlightPaths {
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
    released: mpsc::UnboundedSender<PathBuf>,
}

impl InFlightPaths {
    /// Registry reporting releases on `released`.
    #[must_use]
    pub fn new(released: mpsc::UnboundedSender<PathBuf>) -> Self {
        Self {
            claimed: Arc::new(Mutex::new(HashSet::new())),
            released,
        }
    }

    /// Claim `path`, or `None` if another task owns it.
    #[must_use]
    pub fn try_claim(&self, path: &Path) -> Option<PathClaim> {
        let mut claimed = self.lock();
        if !claimed.insert(path.to_path_buf()) {
            return None;
        }
        Some(PathClaim {
            path: path.to_path_buf(),
            registry: self.clone(),
        })
    }

    /// Whether `path` is currently claimed.
    #[cfg(test)]
    #[must_use]
    pub fn is_claimed(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive ownership of one local target path.
#[derive(Debug)]
pub struct PathClaim {
    path: PathBuf,
    registry: InFlightPaths,
}

impl PathClaim {
    /// Claimed path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.path);
        // The dispatcher may already be gone during shutdown.
        let _ = self.registry.released.send(self.path.clone());
    }
}
