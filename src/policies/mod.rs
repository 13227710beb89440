//! Restart backoff policies.
//!
//! ## Contents
//! - [`DecayPolicy`] / [`DecayState`] how the restart interval of a role grows
//!   (initial / decay / max, optional stability reset)
//! - [`JitterPolicy`] randomization of the scheduled delay
//!
//! ## Quick wiring
//! ```text
//! Config.roles[role] ──► DecayPolicy ──► DecayState (one per role, in Supervisor)
//!                                           └─► Supervisor::restart_with_decay(role, event)
//!                                                 ├─ advance() → next interval (persisted)
//!                                                 └─ timer_delay(next) → Scheduler::after(...)
//! ```
//!
//! ## Defaults
//! - `initial = 5s`, `decay = 2.0`, `max = 60s`
//! - no stability reset, `JitterPolicy::None`

mod decay;
mod jitter;

pub use decay::{DecayPolicy, DecayState};
pub use jitter::JitterPolicy;
