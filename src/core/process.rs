//! # One managed process instance.
//!
//! An [`Instance`] is the deferred half of `start_sync` / `start_web_server`:
//! the supervisor registers the slot synchronously, then hands the instance to
//! [`Scheduler::defer`](crate::core::scheduler::Scheduler::defer), which runs it
//! on the next tick under the slot's [`TimerHandle`](crate::core::scheduler::TimerHandle).
//!
//! ```text
//! run():
//!   halted? ──yes──► mark_exited (quiet) ─► return
//!      │
//!   spawn ──err──► SpawnFailed ─► {Sync,Server}Exited(reason)
//!      │
//!   attach(stdin) ──stale──► return (child killed on drop)
//!      │
//!   ProcessSpawned
//!      │
//!   select { child.wait(), pump(stdout) }
//!      │
//!   mark_exited(gen) ──current──► {Sync,Server}Exited(code, signal)
//! ```
//!
//! Cancelling the handle drops this future mid-flight: the child is killed by
//! `kill_on_drop` and, since `mark_exited` never runs, no exit event is emitted.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::command::CommandBridge;
use crate::core::output::Passthrough;
use crate::core::pump::Pump;
use crate::core::registry::ProcessRegistry;
use crate::events::{Bus, Event, EventKind};
use crate::role::Role;

/// How long to keep reading buffered output after the child exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

pub(crate) struct Instance {
    pub(crate) role: Role,
    pub(crate) generation: u64,
    pub(crate) program: PathBuf,
    pub(crate) registry: Arc<ProcessRegistry>,
    pub(crate) bus: Bus,
    pub(crate) bridge: CommandBridge,
    pub(crate) sink: Arc<dyn Passthrough>,
    pub(crate) halted: CancellationToken,
}

impl Instance {
    pub(crate) async fn run(self) {
        let role = self.role;
        let generation = self.generation;

        // Halt may land between registration and this tick.
        if self.halted.is_cancelled() {
            self.registry.mark_exited(role, generation);
            tracing::debug!(%role, generation, "halted before spawn");
            return;
        }

        let spawned = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("spawn {}: {e}", self.program.display());
                tracing::warn!(%role, generation, %reason, "failed to spawn child");
                if self.registry.mark_exited(role, generation) {
                    self.bus.publish(
                        Event::new(EventKind::SpawnFailed)
                            .with_role(role)
                            .with_generation(generation)
                            .with_reason(reason.clone()),
                    );
                    self.bus.publish(
                        Event::new(EventKind::exited(role))
                            .with_role(role)
                            .with_generation(generation)
                            .with_reason(reason),
                    );
                }
                return;
            }
        };

        if !self.registry.attach(role, generation, child.stdin.take()) {
            return;
        }

        let mut spawned = Event::new(EventKind::ProcessSpawned)
            .with_role(role)
            .with_generation(generation);
        if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
            spawned = spawned.with_pid(pid);
        }
        tracing::info!(%role, generation, pid = ?child.id(), "child spawned");
        self.bus.publish(spawned);

        let mut pump = Pump::new(
            role,
            generation,
            Arc::clone(&self.registry),
            self.bus.clone(),
            self.bridge.clone(),
            Arc::clone(&self.sink),
        );

        let status = match child.stdout.take() {
            Some(stdout) => {
                let pumping = pump.run(stdout);
                tokio::pin!(pumping);
                tokio::select! {
                    status = child.wait() => {
                        if tokio::time::timeout(DRAIN_TIMEOUT, &mut pumping).await.is_err() {
                            tracing::debug!(%role, generation, "stdout still open after exit");
                        }
                        status
                    }
                    _ = &mut pumping => child.wait().await,
                }
            }
            None => child.wait().await,
        };

        if !self.registry.mark_exited(role, generation) {
            return;
        }

        let exited = Event::new(EventKind::exited(role))
            .with_role(role)
            .with_generation(generation);
        let exited = match status {
            Ok(status) => {
                tracing::info!(%role, generation, %status, "child exited");
                exited.with_status(status)
            }
            Err(e) => {
                tracing::warn!(%role, generation, error = %e, "waiting for child failed");
                exited.with_reason(format!("wait: {e}"))
            }
        };
        self.bus.publish(exited);
    }
}
