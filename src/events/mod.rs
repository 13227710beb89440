//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor`, process pumps and exit watchers, restart
//!   timers, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's fan-out listener, which feeds every
//!   [`Subscribe`](crate::Subscribe) implementation.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
