#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Remote file-transfer capability used by the fetch pipeline.
//!
//! A [`RemoteTransport`] opens independent, authenticated sessions. Sessions
//! are never shared between concurrent fetches; each attempt connects, works,
//! and closes its own.
//!
//! Layout: `entry.rs` (listing entries), `transport.rs` (capability traits),
//! `ftp.rs` (FTP implementation), `error.rs` (error types).

pub mod entry;
pub mod error;
pub mod ftp;
pub mod transport;

pub use entry::{EntryKind, RemoteEntry};
pub use error::{RemoteError, RemoteResult};
pub use ftp::FtpTransport;
pub use transport::{RemoteSession, RemoteStream, RemoteTransport};
