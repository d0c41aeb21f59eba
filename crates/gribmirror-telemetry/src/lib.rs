#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Telemetry primitives for the gribmirror workspace.
//!
//! This crate centralises logging and metrics so the pipeline and the binary
//! share one observability story.
//!
//! Layout: `init.rs` (subscriber setup), `context.rs` (run span),
//! `metrics.rs` (Prometheus registry), `error.rs` (error types).

pub mod context;
pub mod error;
pub mod init;
pub mod metrics;

pub use context::GlobalContextGuard;
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
