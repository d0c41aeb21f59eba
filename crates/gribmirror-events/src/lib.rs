#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Pipeline events and completion notifications.
//!
//! The bus provides a typed event enum, sequential identifiers, and a bounded
//! replay ring for late subscribers. Internally it uses `tokio::broadcast`;
//! when the channel overflows, the oldest events are dropped so publishers
//! never wait on slow observers.
//!
//! Completion notifications are a separate, fire-and-forget capability:
//! [`NotificationSink`] is selected once at startup and either publishes each
//! completed file path to NATS or degrades to a logging no-op.
//!
//! Layout: `payloads.rs` (event types), `routing.rs` (bus), `notify.rs`
//! (notification sink and publisher seam), `nats.rs` (NATS publisher).

pub mod nats;
pub mod notify;
pub mod payloads;
pub mod routing;

pub use nats::NatsPublisher;
pub use notify::{NotificationSink, NotifyError, NotifyResult, Publisher};
pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream};
