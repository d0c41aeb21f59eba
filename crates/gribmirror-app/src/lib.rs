#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! gribmirror application wiring.
//!
//! Layout: `cli.rs` (flags and environment), `bootstrap.rs` (service wiring
//! and exit status), `error.rs` (application errors).

/// Command-line interface.
pub mod cli;
/// Service wiring for one mirror run.
pub mod bootstrap;
/// Application error types.
pub mod error;

pub use bootstrap::{exit_code, init_telemetry, load_config, run_app, run_with};
pub use cli::Cli;
pub use error::{AppError, AppResult};
