//! Runtime core: process lifecycle, timers and shutdown.
//!
//! Internal modules:
//! - [`supervisor`]: the two-role supervisor and its operations;
//! - [`builder`]: wires bus, subscribers and collaborators into a supervisor;
//! - [`registry`]: per-role instance table with generations;
//! - [`process`]: one spawned child from spawn to exit;
//! - [`pump`]: child stdout → framer → router / command bridge / passthrough;
//! - [`scheduler`]: deferred, one-shot and periodic work with cancellation;
//! - [`signal`]: control signals to children;
//! - [`shutdown`]: OS signals that stop the supervisor;
//! - [`output`]: passthrough sink for plain child output;
//! - [`config`]: settings and TOML loading.

mod builder;
mod config;
mod output;
mod process;
mod pump;
mod registry;
mod scheduler;
mod shutdown;
mod signal;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::{Config, RoleConfig};
pub use output::{Passthrough, Stdout};
pub use registry::ProcessState;
pub use scheduler::{Scheduler, TimerHandle};
pub use signal::{ControlSignal, OsSignals, SignalSender};
pub use supervisor::Supervisor;
