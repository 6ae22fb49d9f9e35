//! Domain events and notification sinks.

use crate::library::{Book, ReadProgress, Series, Thumbnail};
use tokio::sync::broadcast;

/// Events emitted by lifecycle operations.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A book was discovered.
    BookAdded(Book),
    /// A book or its media changed.
    BookUpdated(Book),
    /// A book was purged.
    BookDeleted(Book),
    /// A series or its metadata changed.
    SeriesUpdated(Series),
    /// A thumbnail was added.
    ThumbnailAdded(Thumbnail),
    /// A thumbnail was deleted.
    ThumbnailDeleted(Thumbnail),
    /// Reading progress was saved.
    ReadProgressChanged(ReadProgress),
    /// Reading progress was removed.
    ReadProgressDeleted(ReadProgress),
}

impl DomainEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::BookAdded(_) => "BookAdded",
            DomainEvent::BookUpdated(_) => "BookUpdated",
            DomainEvent::BookDeleted(_) => "BookDeleted",
            DomainEvent::SeriesUpdated(_) => "SeriesUpdated",
            DomainEvent::ThumbnailAdded(_) => "ThumbnailAdded",
            DomainEvent::ThumbnailDeleted(_) => "ThumbnailDeleted",
            DomainEvent::ReadProgressChanged(_) => "ReadProgressChanged",
            DomainEvent::ReadProgressDeleted(_) => "ReadProgressDeleted",
        }
    }
}

/// Fire-and-forget receiver of domain events.
pub trait EventSink: Send + Sync {
    /// Publish an event. Must not block or fail.
    fn publish(&self, event: DomainEvent);
}

/// Sink that only logs events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = event.name(), "Domain event");
    }
}

/// Sink fanning events out to subscribers over a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = event.name(), "Domain event");
        // No subscriber is not an error.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Sink recording every event, for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingEventSink {
        events: Mutex<Vec<DomainEvent>>,
    }

    impl RecordingEventSink {
        pub fn names(&self) -> Vec<&'static str> {
            self.events.lock().iter().map(DomainEvent::name).collect()
        }

        pub fn count(&self, name: &str) -> usize {
            self.events.lock().iter().filter(|e| e.name() == name).count()
        }
    }

    impl EventSink for RecordingEventSink {
        fn publish(&self, event: DomainEvent) {
            self.events.lock().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ThumbnailOwner;

    #[test]
    fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        let thumbnail = Thumbnail::uploaded(ThumbnailOwner::Book("b".into()), vec![1], "image/png");
        sink.publish(DomainEvent::ThumbnailAdded(thumbnail));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), "ThumbnailAdded");
    }

    #[test]
    fn test_broadcast_sink_without_subscribers_does_not_fail() {
        let sink = BroadcastEventSink::new(1);
        let thumbnail = Thumbnail::uploaded(ThumbnailOwner::Book("b".into()), vec![1], "image/png");
        sink.publish(DomainEvent::ThumbnailDeleted(thumbnail));
    }
}
