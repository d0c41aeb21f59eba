//! Event bus routing helpers.

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::Sender;
use tokio_stream::wrappers::BroadcastStream;

/// Stream wrapper used by subscribers.
pub type EventStream = BroadcastStream<EventEnvelope>;

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    replay_capacity: usize,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a bus with a custom replay capacity (clamped to at least one).
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let replay_capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(replay_capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(replay_capacity))),
            replay_capacity,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to live events. Late subscribers can catch up through
    /// [`EventBus::backlog_since`].
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Publish a new event to all subscribers and return its identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        {
            let mut replay = self.lock_replay();
            if replay.len() == self.replay_capacity {
                let _ = replay.pop_front();
            }
            replay.push_back(envelope.clone());
        }
        // No receivers is not an error for a fire-and-forget bus.
        let _ = self.sender.send(envelope);
        id
    }

    /// Last event id observed in the replay buffer.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_replay().back().map(|env| env.id)
    }

    /// Collect a backlog of events emitted after the specified id.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        let replay = self.lock_replay();
        replay.iter().filter(|env| env.id > id).cloned().collect()
    }

    fn lock_replay(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn queued(path: &str) -> Event {
        Event::FetchQueued { path: path.into() }
    }

    #[tokio::test]
    async fn publish_and_replay_from_id() {
        let bus = EventBus::with_capacity(4);
        let first = bus.publish(queued("a"));
        let second = bus.publish(queued("b"));

        assert_eq!(bus.last_event_id(), Some(second));
        let backlog = bus.backlog_since(first);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, second);
    }

    #[tokio::test]
    async fn replay_ring_drops_oldest_when_full() {
        let bus = EventBus::with_capacity(2);
        let _ = bus.publish(queued("a"));
        let second = bus.publish(queued("b"));
        let third = bus.publish(queued("c"));

        let ids: Vec<_> = bus.backlog_since(0).into_iter().map(|env| env.id).collect();
        assert_eq!(ids, vec![second, third]);
    }

    #[tokio::test]
    async fn subscribe_streams_live_events() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe();
        let id = bus.publish(Event::FetchSkipped {
            path: "gribfiles/x".into(),
        });
        let envelope = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(envelope.id, id);
        assert!(matches!(envelope.event, Event::FetchSkipped { .. }));
    }

    #[test]
    fn publishing_without_subscribers_does_not_fail() {
        let bus = EventBus::with_capacity(1);
        assert_eq!(bus.publish(queued("a")), 1);
        assert_eq!(bus.publish(queued("b")), 2);
    }
}
