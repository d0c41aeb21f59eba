#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Bounded concurrent fetch pipeline for mirroring a remote GRIB tree.
//!
//! Discovery lists relevant folders and payload files, the planner compares
//! them with the local mirror, and every missing file becomes a
//! [`FetchIntent`] on a bounded [`FetchQueue`]. A single dispatcher spawns one
//! task per intent; an admission semaphore caps how many hold a remote
//! session at once, and per-path claims keep two tasks off the same local
//! file. Failed attempts back off and re-enter the queue until they succeed
//! or exhaust their attempts, at which point they are dead-lettered. The
//! [`CompletionTracker`] tells the orchestrator when everything has drained.
//!
//! Layout: `discovery.rs`, `planner.rs`, `intent.rs`, `queue.rs`,
//! `tracker.rs`, `inflight.rs`, `pool.rs` (dispatcher), `task.rs` (one
//! attempt), `retry.rs`, `dead_letter.rs`, `report.rs`, `pipeline.rs`
//! (orchestrator), `error.rs`.

pub mod dead_letter;
pub mod discovery;
pub mod error;
pub mod inflight;
pub mod intent;
pub mod pipeline;
pub mod planner;
pub mod pool;
pub mod queue;
pub mod report;
pub mod retry;
pub mod task;
pub mod tracker;

pub use dead_letter::{DeadLetter, DeadLetterLog};
pub use discovery::{Discovery, DiscoveryOutcome, FileBatch, RelevanceFilter};
pub use error::{FetchError, FetchResult, FetchStage, render_chain};
pub use inflight::{InFlightPaths, PathClaim};
pub use intent::{FetchIntent, join_remote};
pub use pipeline::MirrorPipeline;
pub use planner::{PlanDecision, PlanReport, Planner, plan_decision};
pub use pool::FetchPool;
pub use queue::{FetchQueue, FetchReceiver, QueuedIntent};
pub use report::{DrainReport, RunStats};
pub use retry::{RetryDecision, RetryPolicy};
pub use task::{FetchContext, TaskOutcome, run_fetch};
pub use tracker::{CompletionTracker, PendingGuard};
