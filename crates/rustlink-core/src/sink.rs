// ── Event sink ──
//
// Both pipelines publish into an injected `EventSink`; nothing in this
// crate depends on who consumes the events.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::model::DomainEvent;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Receives every domain event the core produces.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Broadcast fan-out sink. Subscribers that fall behind see `Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: DomainEvent) {
        tracing::debug!(kind = event.kind(), "publishing event");
        // No subscribers is fine.
        let _ = self.tx.send(Arc::new(event));
    }
}

/// Sink that keeps everything it receives. Handy for one-shot consumers.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event collected so far.
    pub fn drain(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: DomainEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn notice(n: u32) -> DomainEvent {
        DomainEvent::GenericNotice {
            title: format!("t{n}"),
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn bus_fans_out_to_every_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(notice(1));

        assert_eq!(*a.recv().await.unwrap(), notice(1));
        assert_eq!(*b.recv().await.unwrap(), notice(1));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        EventBus::new().publish(notice(1));
    }

    #[test]
    fn collecting_sink_drains_in_order() {
        let sink = CollectingSink::new();
        sink.publish(notice(1));
        sink.publish(notice(2));
        assert_eq!(sink.drain(), vec![notice(1), notice(2)]);
        assert!(sink.drain().is_empty());
    }
}
