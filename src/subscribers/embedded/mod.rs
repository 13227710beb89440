//! # Built-in subscribers
//!
//! - [`LogWriter`]: turns events into `tracing` records.
//! - [`RestartOnExit`]: restarts exited children with decaying backoff and
//!   forwards stats snapshots to the server.

mod log;
mod restart;

pub use log::LogWriter;
pub use restart::RestartOnExit;
