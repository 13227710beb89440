//! # LogWriter: bus events as `tracing` records
//!
//! Lifecycle events log at `info`, failures and diagnostics at `warn`, chatty
//! protocol traffic at `debug`.
//!
//! ## Example output (default `tracing-subscriber` fmt)
//! ```text
//! INFO mailvisor: starting role=sync generation=1
//! INFO mailvisor: spawned role=sync generation=1 pid=Some(4242)
//! WARN mailvisor: exited role=sync code=Some(1) signal=None reason=None
//! INFO mailvisor: restart scheduled role=sync delay_ms=10000
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let role = e.role.map(|r| r.as_str()).unwrap_or("-");
        match e.kind {
            EventKind::ProcessStarting => {
                tracing::info!(target: "mailvisor", role, generation = ?e.generation, "starting");
            }
            EventKind::ProcessSpawned => {
                tracing::info!(target: "mailvisor", role, generation = ?e.generation, pid = ?e.pid, "spawned");
            }
            EventKind::SpawnFailed => {
                tracing::warn!(target: "mailvisor", role, reason = ?e.reason, "spawn failed");
            }
            EventKind::SyncExited | EventKind::ServerExited => {
                tracing::warn!(
                    target: "mailvisor",
                    role,
                    code = ?e.exit_code,
                    signal = ?e.signal,
                    reason = ?e.reason,
                    "exited"
                );
            }
            EventKind::PidReported => {
                tracing::debug!(target: "mailvisor", role, pid = ?e.pid, "pid reported");
            }
            EventKind::StatsRequested => {
                tracing::debug!(target: "mailvisor", pid = ?e.pid, "stats requested");
            }
            EventKind::BroadcastStats => {
                tracing::debug!(target: "mailvisor", role, "stats received");
            }
            EventKind::MessageDropped => {
                tracing::debug!(target: "mailvisor", role, reason = ?e.reason, "message dropped");
            }
            EventKind::RestartScheduled => {
                tracing::info!(target: "mailvisor", role, delay_ms = ?e.delay_ms, "restart scheduled");
            }
            EventKind::StartRequested => {
                tracing::debug!(target: "mailvisor", role, "start requested");
            }
            EventKind::HaltRequested => {
                tracing::info!(target: "mailvisor", "halt requested");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: "mailvisor", "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!(target: "mailvisor", "all children stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::warn!(target: "mailvisor", "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(
                    target: "mailvisor",
                    subscriber = ?e.source,
                    reason = ?e.reason,
                    "subscriber overflow"
                );
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(
                    target: "mailvisor",
                    subscriber = e.source.as_deref().unwrap_or("unknown"),
                    info = e.reason.as_deref().unwrap_or("unknown"),
                    "subscriber panicked"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
