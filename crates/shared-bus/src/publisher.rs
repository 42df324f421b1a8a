//! # Rack Event Publishing
//!
//! The registry is the only producer; it publishes while holding its lock.

use crate::events::{EventFilter, RackEvent};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use tokio::sync::broadcast;
use tracing::debug;

/// Trait for publishing rack events.
///
/// Publishing never blocks: the registry calls it while holding its own
/// lock so that events for one identity keep their order.
pub trait EventPublisher: Send + Sync {
    /// Publish an event, returning how many subscribers were handed it.
    fn publish(&self, event: RackEvent) -> usize;
}

/// Broadcast-backed bus; every subscriber sees every event and filters locally.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<RackEvent>,
}

impl InMemoryEventBus {
    /// Bus with [`DEFAULT_CHANNEL_CAPACITY`] slots per subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus that buffers `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every future event that passes `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(?filter, "New rack event subscription");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Same as [`subscribe`](Self::subscribe), as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    /// Live subscriptions and streams.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish(&self, event: RackEvent) -> usize {
        let identity = event.identity().clone();
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(%identity, ?kind, receivers, "Rack event published");
                receivers
            }
            Err(_) => {
                // No subscribers is the normal case for a bare broker.
                debug!(%identity, ?kind, "Rack event had no subscribers");
                0
            }
        }
    }
}

/// Publisher that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventPublisher;

impl EventPublisher for NoOpEventPublisher {
    fn publish(&self, _event: RackEvent) -> usize {
        0
    }
}
