//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from operators running on any thread.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Listener (one):
//!   RetryOperator     ──┐
//!   RetryWhenOperator ──┼──► Bus ───► ObserverSet::listen ───► observers
//!   TimedBackoff      ──┤  (broadcast chan)
//!   DemandSubscriber  ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and needs no runtime;
//!   operators call it from inside signal handlers.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;
use crate::config::Config;

/// Broadcast channel for runtime events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately (send clones internally).
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Creates a bus sized by [`Config::bus_capacity`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.bus_capacity_clamped())
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_publish_without_receivers_is_dropped() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::SignalDropped));
    }

    #[test]
    fn test_receiver_sees_events_after_subscribe() {
        let bus = Bus::from_config(&Config::default());
        bus.publish(Event::new(EventKind::Resubscribing));
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::RetryExhausted));

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::RetryExhausted);
        assert!(rx.try_recv().is_err());
    }
}
