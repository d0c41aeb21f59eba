//! FTP transport over `suppaftp`.
//!
//! # Design
//! - The blocking client runs on tokio's blocking pool; each command moves the
//!   control connection into a blocking task and back.
//! - Retrieval copies the data connection into a `tokio::io::duplex` pipe
//!   through `SyncIoBridge`, so callers read an ordinary `AsyncRead`. The
//!   worker finalises the transfer once the copy ends and reports the outcome
//!   through [`RemoteSession::finish_retrieve`].

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gribmirror_config::RemoteConfig;
use suppaftp::FtpStream;
use suppaftp::list::File;
use suppaftp::types::FileType;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, spawn_blocking};
use tokio_util::io::SyncIoBridge;
use tracing::debug;

use crate::entry::{EntryKind, RemoteEntry};
use crate::error::{RemoteError, RemoteResult};
use crate::transport::{RemoteSession, RemoteStream, RemoteTransport};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Transport dialling an FTP server described by [`RemoteConfig`].
#[derive(Debug, Clone)]
pub struct FtpTransport {
    config: RemoteConfig,
}

impl FtpTransport {
    /// Build a transport for the given remote.
    #[must_use]
    pub const fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteTransport for FtpTransport {
    async fn connect(&self) -> RemoteResult<Box<dyn RemoteSession>> {
        let config = self.config.clone();
        let stream = spawn_blocking(move || open(&config))
            .await
            .map_err(|source| RemoteError::Worker {
                operation: "connect",
                source,
            })??;
        Ok(Box::new(FtpSession {
            stream: Some(stream),
            pending: None,
        }))
    }
}

fn open(config: &RemoteConfig) -> RemoteResult<FtpStream> {
    let address = config.address();
    let socket = resolve(&address)?;
    let mut stream = FtpStream::connect_timeout(socket, config.connect_timeout).map_err(|err| {
        RemoteError::Connect {
            address: address.clone(),
            source: Box::new(err),
        }
    })?;
    stream
        .login(config.username.as_str(), config.password.as_str())
        .map_err(|err| RemoteError::Login {
            username: config.username.clone(),
            source: Box::new(err),
        })?;
    stream
        .transfer_type(FileType::Binary)
        .map_err(|err| RemoteError::command("type", "", err))?;
    debug!(address = %address, "remote session opened");
    Ok(stream)
}

fn resolve(address: &str) -> RemoteResult<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|source| RemoteError::Connect {
            address: address.to_string(),
            source: Box::new(source),
        })?
        .next()
        .ok_or_else(|| RemoteError::Connect {
            address: address.to_string(),
            source: "address resolved to nothing".into(),
        })
}

type RetrieveWorker = JoinHandle<(FtpStream, RemoteResult<()>)>;

struct FtpSession {
    stream: Option<FtpStream>,
    pending: Option<RetrieveWorker>,
}

impl FtpSession {
    fn take(&mut self, operation: &'static str) -> RemoteResult<FtpStream> {
        if self.pending.is_some() {
            return Err(RemoteError::SessionUnavailable { operation });
        }
        self.stream
            .take()
            .ok_or(RemoteError::SessionUnavailable { operation })
    }

    async fn run<T, F>(&mut self, operation: &'static str, command: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> RemoteResult<T> + Send + 'static,
    {
        let mut stream = self.take(operation)?;
        let (stream, result) = spawn_blocking(move || {
            let result = command(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|source| RemoteError::Worker { operation, source })?;
        self.stream = Some(stream);
        result
    }

    async fn join_pending(&mut self) -> RemoteResult<()> {
        let Some(worker) = self.pending.take() else {
            return Ok(());
        };
        let (stream, result) = worker.await.map_err(|source| RemoteError::Worker {
            operation: "finish_retrieve",
            source,
        })?;
        self.stream = Some(stream);
        result
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn list(&mut self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let path = path.to_string();
        self.run("list", move |ftp| {
            let lines = ftp
                .list(Some(path.as_str()))
                .map_err(|err| RemoteError::command("list", path.as_str(), err))?;
            Ok(parse_listing(&path, &lines))
        })
        .await
    }

    async fn change_dir(&mut self, path: &str) -> RemoteResult<()> {
        let path = path.to_string();
        self.run("change_dir", move |ftp| {
            ftp.cwd(path.as_str())
                .map_err(|err| RemoteError::command("change_dir", path.as_str(), err))
        })
        .await
    }

    async fn retrieve(&mut self, name: &str) -> RemoteResult<RemoteStream> {
        let mut ftp = self.take("retrieve")?;
        let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
        let mut bridge = SyncIoBridge::new(writer);
        let (opened_tx, opened_rx) = oneshot::channel();
        let name = name.to_string();

        let worker: RetrieveWorker = spawn_blocking(move || {
            let mut data = match ftp.retr_as_stream(name.as_str()) {
                Ok(data) => {
                    let _ = opened_tx.send(Ok(()));
                    data
                }
                Err(err) => {
                    let _ = opened_tx.send(Err(RemoteError::command("retrieve", name, err)));
                    return (ftp, Ok(()));
                }
            };
            let copied = io::copy(&mut data, &mut bridge).and_then(|_| bridge.shutdown());
            drop(bridge);
            let finalized = ftp.finalize_retr_stream(data);
            let result = match (copied, finalized) {
                (Err(source), _) => Err(RemoteError::Transfer { path: name, source }),
                (Ok(()), Err(err)) => Err(RemoteError::command("finish_retrieve", name, err)),
                (Ok(()), Ok(())) => Ok(()),
            };
            (ftp, result)
        });

        match opened_rx.await {
            Ok(Ok(())) => {
                self.pending = Some(worker);
                Ok(Box::new(reader))
            }
            Ok(Err(err)) => {
                if let Ok((stream, _)) = worker.await {
                    self.stream = Some(stream);
                }
                Err(err)
            }
            Err(_) => {
                self.pending = Some(worker);
                self.join_pending().await?;
                Err(RemoteError::SessionUnavailable {
                    operation: "retrieve",
                })
            }
        }
    }

    async fn finish_retrieve(&mut self) -> RemoteResult<()> {
        self.join_pending().await
    }

    async fn close(&mut self) {
        if let Err(err) = self.join_pending().await {
            debug!(error = %err, "discarding unfinished retrieval on close");
        }
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        match spawn_blocking(move || stream.quit()).await {
            Ok(Ok(())) => debug!("remote session closed"),
            Ok(Err(err)) => debug!(error = %err, "remote logout failed"),
            Err(err) => debug!(error = %err, "remote logout worker failed"),
        }
    }
}

/// Parse raw LIST output. Lines the parser does not understand are skipped.
pub(crate) fn parse_listing(path: &str, lines: &[String]) -> Vec<RemoteEntry> {
    lines
        .iter()
        .filter_map(|line| match line.parse::<File>() {
            Ok(file) => Some(to_entry(&file)),
            Err(err) => {
                debug!(remote_path = path, line = %line, error = ?err, "skipping unparsable listing line");
                None
            }
        })
        .collect()
}

fn to_entry(file: &File) -> RemoteEntry {
    let kind = if file.is_directory() {
        EntryKind::Directory
    } else if file.is_symlink() {
        EntryKind::Link
    } else {
        EntryKind::File
    };
    RemoteEntry {
        name: file.name().to_string(),
        kind,
        size: u64::try_from(file.size()).unwrap_or(u64::MAX),
        modified: DateTime::<Utc>::from(file.modified()),
    }
}
