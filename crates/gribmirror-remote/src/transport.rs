//! Remote transport and session traits.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::entry::RemoteEntry;
use crate::error::RemoteResult;

/// Byte stream yielded by a retrieval.
pub type RemoteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Factory for authenticated remote sessions.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Dial the remote and authenticate, returning a fresh session.
    async fn connect(&self) -> RemoteResult<Box<dyn RemoteSession>>;
}

/// One authenticated conversation with the remote.
///
/// Sessions are single-threaded in use: at most one retrieval may be open at
/// a time, and it must be finished before the next command.
#[async_trait]
pub trait RemoteSession: Send {
    /// List the entries of `path`.
    async fn list(&mut self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// Change the working directory.
    async fn change_dir(&mut self, path: &str) -> RemoteResult<()>;

    /// Open a byte stream for `name` in the working directory.
    async fn retrieve(&mut self, name: &str) -> RemoteResult<RemoteStream>;

    /// Confirm the last retrieval completed. The stream must have been
    /// drained or dropped first.
    async fn finish_retrieve(&mut self) -> RemoteResult<()>;

    /// Log out and release the connection. Best effort.
    async fn close(&mut self);
}
