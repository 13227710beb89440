//! # Event subscribers.
//!
//! Everything the supervisor reports goes through the [`Bus`](crate::events::Bus);
//! subscribers react to it without blocking the publisher.
//!
//! ```text
//! Instance / Supervisor ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                   ├──► LogWriter
//!                                                                   ├──► RestartOnExit
//!                                                                   └──► custom ...
//! ```

mod embedded;
mod set;
mod subscribe;

pub use embedded::{LogWriter, RestartOnExit};
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
