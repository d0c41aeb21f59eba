#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Immutable configuration for the gribmirror fetch pipeline.
//!
//! Layout: `model.rs` (typed config sections), `defaults.rs` (deployment
//! defaults), `loader.rs` (layered loading from JSON files and overrides),
//! `validate.rs` (field validation).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLayer;
pub use model::{
    LayoutConfig, MirrorConfig, NotifyConfig, PipelineConfig, RemoteConfig, RetryConfig,
};
