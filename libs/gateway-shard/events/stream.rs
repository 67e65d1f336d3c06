//! Broadcast-backed subscriber streams
//!
//! # Backpressure
//!
//! Each stream is a bounded `tokio::sync::broadcast` ring. Publishing never
//! blocks the shard worker. A subscriber that falls more than `capacity`
//! items behind loses the oldest items and is told how many through
//! [`StreamError::Lagged`]; other subscribers are unaffected and per
//! subscriber ordering is preserved.

use futures::Stream;
use tokio::sync::broadcast;

/// Why a subscription yielded no item
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The subscriber fell behind and this many items were dropped for it
    #[error("subscriber lagged behind, {0} items dropped")]
    Lagged(u64),
    /// The manager is gone and no more items will arrive
    #[error("stream closed")]
    Closed,
}

/// One subscriber's cursor into a broadcast stream
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Wait for the next item
    pub async fn recv(&mut self) -> Result<T, StreamError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(n) => StreamError::Lagged(n),
            broadcast::error::RecvError::Closed => StreamError::Closed,
        })
    }

    /// Take the next item if one is already buffered
    pub fn try_recv(&mut self) -> Option<Result<T, StreamError>> {
        match self.rx.try_recv() {
            Ok(item) => Some(Ok(item)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Err(StreamError::Lagged(n))),
            Err(broadcast::error::TryRecvError::Closed) => Some(Err(StreamError::Closed)),
        }
    }

    /// Adapt into a `futures::Stream`
    ///
    /// Lag notifications are yielded as `Err`; the stream ends when the
    /// manager is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, StreamError>> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            match sub.recv().await {
                Err(StreamError::Closed) => None,
                item => Some((item, sub)),
            }
        })
    }
}

/// Publishing side of the event and failure streams
#[derive(Debug)]
pub struct EventBus<E> {
    events: broadcast::Sender<E>,
    failures: broadcast::Sender<super::DecodeFailure>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (events, _) = broadcast::channel(capacity);
        let (failures, _) = broadcast::channel(capacity);
        Self { events, failures }
    }

    pub fn subscribe_events(&self) -> Subscription<E> {
        Subscription::new(self.events.subscribe())
    }

    pub fn subscribe_failures(&self) -> Subscription<super::DecodeFailure> {
        Subscription::new(self.failures.subscribe())
    }

    /// Publish an event; returns the number of subscribers it reached
    pub fn publish_event(&self, event: E) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Publish a decode failure; returns the number of subscribers it reached
    pub fn publish_failure(&self, failure: super::DecodeFailure) -> usize {
        self.failures.send(failure).unwrap_or(0)
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            failures: self.failures.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::events::DecodeFailure;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_subscribers_get_independent_ordered_copies() {
        let bus: EventBus<u32> = EventBus::new(16);
        let mut a = bus.subscribe_events();
        let mut b = bus.subscribe_events();

        for i in 0..5 {
            assert_eq!(bus.publish_event(i), 2);
        }

        for i in 0..5 {
            assert_eq!(a.recv().await.unwrap(), i);
        }
        for i in 0..5 {
            assert_eq!(b.recv().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_new_items() {
        let bus: EventBus<u32> = EventBus::new(16);
        assert_eq!(bus.publish_event(1), 0);

        let mut late = bus.subscribe_events();
        bus.publish_event(2);
        assert_eq!(late.recv().await.unwrap(), 2);
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_told_about_lag() {
        let bus: EventBus<u32> = EventBus::new(2);
        let mut slow = bus.subscribe_events();

        for i in 0..5 {
            bus.publish_event(i);
        }

        assert_eq!(slow.recv().await, Err(StreamError::Lagged(3)));
        assert_eq!(slow.recv().await.unwrap(), 3);
        assert_eq!(slow.recv().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_failures_are_separate_from_events() {
        let bus: EventBus<u32> = EventBus::new(4);
        let mut events = bus.subscribe_events();
        let mut failures = bus.subscribe_failures();

        bus.publish_failure(DecodeFailure {
            error: DecodeError::MissingEventName,
            raw: b"{}".to_vec(),
        });

        assert!(events.try_recv().is_none());
        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.error, DecodeError::MissingEventName);
    }

    #[tokio::test]
    async fn test_stream_ends_when_bus_dropped() {
        let bus: EventBus<u32> = EventBus::new(4);
        let sub = bus.subscribe_events();
        bus.publish_event(7);
        drop(bus);

        let items: Vec<_> = sub.into_stream().collect().await;
        assert_eq!(items, vec![Ok(7)]);
    }
}
