// quillbase-core/src/events.rs
// Typed event channels (no wildcard bus)

use crossbeam::channel::{unbounded, Receiver, Sender};

/// Collection lifecycle events.
///
/// Delivery is decoupled through unbounded channels: emission never blocks
/// and never re-enters the caller. Handlers must not assume synchronous
/// delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbEvent {
    /// The datafile finished loading (successfully or not, see `Error`)
    Ready,
    /// A mutation (insert, update or remove) was applied
    Updated,
    /// The datafile was rewritten to its compacted form
    Compacted,
    /// Loading or autocompaction failed
    Error(String),
}

/// Fan-out of events to every subscriber.
#[derive(Default)]
pub struct EventBus {
    senders: Vec<Sender<DbEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Open a new subscription; the receiver sees every event emitted from
    /// this point on.
    pub fn subscribe(&mut self) -> Receiver<DbEvent> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    /// Send an event to all live subscribers, pruning dropped ones.
    pub fn emit(&mut self, event: DbEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_receive_events() {
        let mut bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.emit(DbEvent::Ready);
        bus.emit(DbEvent::Updated);

        assert_eq!(rx1.try_recv(), Ok(DbEvent::Ready));
        assert_eq!(rx1.try_recv(), Ok(DbEvent::Updated));
        assert_eq!(rx2.try_recv(), Ok(DbEvent::Ready));
        assert_eq!(rx2.try_recv(), Ok(DbEvent::Updated));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        drop(bus.subscribe());

        bus.emit(DbEvent::Compacted);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(rx.try_recv(), Ok(DbEvent::Compacted));
    }

    #[test]
    fn test_subscription_misses_earlier_events() {
        let mut bus = EventBus::new();
        bus.emit(DbEvent::Ready);
        let rx = bus.subscribe();
        bus.emit(DbEvent::Error("boom".to_string()));
        assert_eq!(rx.try_recv(), Ok(DbEvent::Error("boom".to_string())));
        assert!(rx.try_recv().is_err());
    }
}
