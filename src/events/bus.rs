//! # Event bus between the supervisor and its policy subscribers.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. Publishers are the process pumps,
//! exit watchers, restart timers and the supervisor itself; the single
//! consumer is the supervisor's fan-out listener, which hands events to the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//! pump(sync)   ──┐
//! pump(server) ──┤
//! exit watcher ──┼──► Bus ──► fan-out listener ──► SubscriberSet
//! restart timer ─┤                                   ├─► RestartOnExit
//! supervisor   ──┘                                   └─► LogWriter
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - Receivers that fall more than `capacity` events behind observe
//!   `RecvError::Lagged(n)` and skip the `n` oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        tracing::trace!(seq = ev.seq, kind = ?ev.kind, "publish");
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver observing events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
