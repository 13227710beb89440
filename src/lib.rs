//! # mailvisor
//!
//! **mailvisor** supervises the two long-running children of a webmail
//! install: the mail synchronization engine (`sync`) and the web front end
//! (`server`). It keeps them alive, exchanges JSON messages with them over
//! their standard streams and restarts them with a decaying backoff.
//!
//! ## Architecture
//! ```text
//!        ┌──────────────┐                          ┌──────────────┐
//!        │  sync child  │                          │ server child │
//!        └──┬────────▲──┘                          └──┬────────▲──┘
//!   stdout  │        │ SIGUSR2 / SIGQUIT       stdout │        │ stdin (stats JSON)
//!           ▼        │                                ▼        │
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - ProcessRegistry (one slot per role, generations)               │
//! │  - Pump per instance: Framer → route() / CommandBridge / stdout   │
//! │  - DecayState per role (restart_with_decay)                       │
//! │  - Scheduler (deferred spawn, restart timers, stats timer)        │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                    Bus (broadcast) ──► SubscriberSet
//!                                         ├──► LogWriter      (tracing)
//!                                         └──► RestartOnExit  (policy)
//! ```
//!
//! ### Lifecycle of a role
//! ```text
//! Stopped ─► Starting ─► Running ─► Exited ─► (backoff) ─► Starting ─► ...
//!                                                     halt() ─► Halted (absorbing)
//! ```
//!
//! ## Child protocol
//! A stdout chunk starting with `{` opens a JSON message; the message is
//! decoded once a chunk ends with `}` and the braces balance. Known messages:
//! - `{"type":"pid","pid":N}` records the child's pid for signalling;
//! - `{"type":"stats",...}` is forwarded verbatim to the server's stdin.
//!
//! Anything else is offered to the [`Command`] capability and otherwise
//! copied to the supervisor's stdout.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use mailvisor::{Config, LogWriter, Subscribe, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::load("mailvisor.toml")?;
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     let sup = Supervisor::builder(cfg)
//!         .with_subscribers(subs)
//!         .with_restart_on_exit()
//!         .build();
//!
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```
mod command;
mod core;
mod error;
mod events;
mod policies;
mod role;
mod subscribers;

pub mod protocol;

// ---- Public re-exports ----

pub use command::{Command, CommandBridge, NoCommands};
pub use core::{
    Config, ControlSignal, OsSignals, Passthrough, ProcessState, RoleConfig, Scheduler,
    SignalSender, Stdout, Supervisor, SupervisorBuilder, TimerHandle,
};
pub use error::{CommandError, ConfigError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use policies::{DecayPolicy, DecayState, JitterPolicy};
pub use role::{PerRole, Role};
pub use subscribers::{LogWriter, RestartOnExit, Subscribe, SubscriberSet};
