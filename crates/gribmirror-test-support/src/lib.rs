#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Shared test helpers used across integration suites.
//! Layout: remote.rs (in-memory file server), publisher.rs (recording
//! notification publisher), fixtures.rs (scenario builders).

pub mod fixtures;
pub mod publisher;
pub mod remote;

pub use fixtures::{BASE_DIR, SCENARIO_PAYLOAD, gfs_scenario, payload, scenario_config, ts};
pub use publisher::RecordingPublisher;
pub use remote::MemoryRemote;
