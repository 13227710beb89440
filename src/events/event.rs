//! # Runtime events emitted by the supervisor and its children.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Outward notifications**: the only events external policy is expected to
//!   act on (`SyncExited`, `ServerExited`, `BroadcastStats`)
//! - **Requests**: deferred work scheduled by the restart policy (`StartRequested`)
//! - **Lifecycle events**: process flow (starting, spawned, pid reported, halt)
//! - **Diagnostics**: dropped frames, subscriber overflow/panic, shutdown progress
//!
//! The [`Event`] struct carries additional metadata such as timestamps, role,
//! reported pid, exit status, delays and the opaque stats payload.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events from one child's stream are published in the order its bytes arrived;
//! across roles there is no ordering guarantee.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use mailvisor::{Event, EventKind, Role};
//!
//! let ev = Event::new(EventKind::RestartScheduled)
//!     .with_role(Role::Sync)
//!     .with_delay(Duration::from_secs(10));
//!
//! assert_eq!(ev.kind, EventKind::RestartScheduled);
//! assert_eq!(ev.role, Some(Role::Sync));
//! assert_eq!(ev.delay_ms, Some(10_000));
//! ```

use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::role::Role;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Outward notifications ===
    /// The sync process exited (crash, signal or normal exit).
    ///
    /// Sets:
    /// - `role`: `Sync`
    /// - `exit_code` / `signal`: when the OS reported them
    /// - `reason`: spawn or wait failure, if any
    SyncExited,

    /// The server process exited.
    ///
    /// Sets the same fields as [`EventKind::SyncExited`] with `role = Server`.
    ServerExited,

    /// A stats snapshot arrived from a child and should be broadcast.
    ///
    /// Sets:
    /// - `role`: originating role
    /// - `payload`: the decoded stats message
    BroadcastStats,

    // === Requests ===
    /// Request to (re)start a role, published by a restart timer.
    ///
    /// Sets:
    /// - `role`: role to start
    StartRequested,

    // === Lifecycle ===
    /// A new instance was registered; spawn happens on the next tick.
    ///
    /// Sets:
    /// - `role`, `generation`
    ProcessStarting,

    /// The OS process was spawned.
    ///
    /// Sets:
    /// - `role`, `generation`, `pid` (OS pid as seen at spawn, if any)
    ProcessSpawned,

    /// Spawning the executable failed. Always followed by the role's exited event.
    ///
    /// Sets:
    /// - `role`, `generation`, `reason`
    SpawnFailed,

    /// A child reported its pid over the message protocol.
    ///
    /// Sets:
    /// - `role`, `pid`
    PidReported,

    /// The sync process was signalled to emit a stats snapshot.
    ///
    /// Sets:
    /// - `role`: `Sync`
    /// - `pid`: signalled pid
    StatsRequested,

    /// A restart was scheduled after a decayed interval.
    ///
    /// Sets:
    /// - `role`, `delay_ms`
    RestartScheduled,

    /// Halt was requested; no process will be started again.
    HaltRequested,

    // === Diagnostics ===
    /// A framed message could not be decoded and was dropped.
    ///
    /// Sets:
    /// - `role`, `reason`
    MessageDropped,

    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// All children stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; remaining children were killed.
    GraceExceeded,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: panic info
    SubscriberPanicked,
}

impl EventKind {
    /// Role-specific exited kind.
    pub fn exited(role: Role) -> Self {
        match role {
            Role::Sync => EventKind::SyncExited,
            Role::Server => EventKind::ServerExited,
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Role the event refers to, if any.
    pub role: Option<Role>,
    /// Instance number of the role's process.
    pub generation: Option<u64>,
    /// OS process id (spawned or self-reported).
    pub pid: Option<i32>,
    /// Exit code of a terminated child.
    pub exit_code: Option<i32>,
    /// Terminating signal of a child (unix only).
    pub signal: Option<i32>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Name of the component that emitted a diagnostic.
    pub source: Option<Arc<str>>,
    /// Opaque stats payload.
    pub payload: Option<Arc<serde_json::Value>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            role: None,
            generation: None,
            pid: None,
            exit_code: None,
            signal: None,
            delay_ms: None,
            reason: None,
            source: None,
            payload: None,
        }
    }

    /// Shorthand for a [`EventKind::StartRequested`] event for `role`.
    pub fn start_requested(role: Role) -> Self {
        Event::new(EventKind::StartRequested).with_role(role)
    }

    #[inline]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Attaches exit code and terminating signal from an [`ExitStatus`].
    pub fn with_status(mut self, status: ExitStatus) -> Self {
        self.exit_code = status.code();
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            self.signal = status.signal();
        }
        self
    }

    /// Delay as a [`Duration`], if set.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }

    /// True for the role-specific exited kinds.
    #[inline]
    pub fn is_exit(&self) -> bool {
        matches!(self.kind, EventKind::SyncExited | EventKind::ServerExited)
    }

    /// True for events emitted about subscribers themselves.
    #[inline]
    pub fn is_subscriber_diagnostic(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
