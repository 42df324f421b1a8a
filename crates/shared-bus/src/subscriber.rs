//! # Rack Event Subscriptions
//!
//! Receiving side of the bus. Filtering happens here, not at publish time.

use crate::events::{EventFilter, RackEvent};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Filtered receiver returned by [`InMemoryEventBus::subscribe`](crate::InMemoryEventBus::subscribe).
pub struct Subscription {
    receiver: broadcast::Receiver<RackEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<RackEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Wait for the next event that passes the filter.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<RackEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some rack events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Filter applied to this subscription.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

/// A filtered `Stream` of rack events.
pub struct EventStream {
    inner: BroadcastStream<RackEvent>,
    filter: EventFilter,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<RackEvent>, filter: EventFilter) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
        }
    }

    /// Filter applied to this stream.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Stream for EventStream {
    type Item = RackEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(event)) => {
                    if self.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(count))) => {
                    debug!(lagged = count, "Event stream lagged, some rack events dropped");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::publisher::{EventPublisher, InMemoryEventBus};
    use shared_types::RackIdentity;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;
    use uuid::Uuid;

    fn connected(id: &str) -> RackEvent {
        RackEvent::Connected {
            identity: RackIdentity::from(id),
            connection_id: Uuid::new_v4(),
        }
    }

    fn disconnected(id: &str) -> RackEvent {
        RackEvent::Disconnected {
            identity: RackIdentity::from(id),
            connection_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        let event = connected("rack-1");
        bus.publish(event.clone());

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("closed");
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_subscription_skips_filtered_events() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::identities(vec![RackIdentity::from("rack-2")]));

        bus.publish(connected("rack-1"));
        bus.publish(connected("rack-2"));

        drop(bus);

        let received = sub.recv().await.expect("closed");
        assert_eq!(received.identity().as_str(), "rack-2");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_event_stream_preserves_order() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.event_stream(EventFilter::kinds(vec![EventKind::Disconnected]));

        bus.publish(connected("rack-1"));
        bus.publish(disconnected("rack-1"));
        bus.publish(disconnected("rack-2"));
        drop(bus);

        let first = stream.next().await.expect("first");
        let second = stream.next().await.expect("second");
        assert_eq!(first.identity().as_str(), "rack-1");
        assert_eq!(second.identity().as_str(), "rack-2");
        assert!(stream.next().await.is_none());
    }
}
