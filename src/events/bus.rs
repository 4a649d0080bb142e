//! # Event bus.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that request callbacks,
//! transport deliveries and subscriber workers can publish without blocking.
//!
//! ```text
//! Publishers (many):                    Receivers:
//!   completion callbacks ──┐
//!   Dispatcher::deliver  ──┼──► Bus ──► subscriber listener ──► SubscriberSet
//!   Dispatcher::request  ──┤           Dispatcher::subscribe() (user receivers)
//!   subscriber workers   ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - One ring buffer of `capacity` events is shared by all receivers.
//! - Slow receivers observe `RecvError::Lagged(n)` and skip the `n` oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for dispatcher events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
