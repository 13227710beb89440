//! # Supervisor: owns the sync and server children.
//!
//! The [`Supervisor`] keeps exactly one tracked instance per [`Role`], pumps
//! their stdout through per-role framers, signals them by their self-reported
//! pid and reports their exits on the [`Bus`]. It never decides to restart a
//! child on its own: that decision belongs to a subscriber (by default
//! [`RestartOnExit`](crate::subscribers::RestartOnExit)) which calls back into
//! [`Supervisor::restart_with_decay`] and the `start_*` operations.
//!
//! ## Architecture
//! ```text
//!   start_sync() / start_web_server()
//!        │  halted? → no-op
//!        ├─► registry.install(gen)  (closes previous instance once)
//!        ├─► ProcessStarting
//!        └─► scheduler.defer(Instance::run)
//!                 └─► spawn ─► pump(stdout) ─► framer ─► router ─► Bus
//!                        └─► exit ─► {Sync,Server}Exited ─► Bus
//!
//!   Bus ──► SubscriberSet ──► RestartOnExit
//!                                ├─ *Exited        → restart_with_decay(role, StartRequested)
//!                                ├─ StartRequested → start_*
//!                                └─ BroadcastStats → forward_stats(payload) (own task)
//!
//!   stats timer (every stats_interval)
//!        └─► sync pid known && server tracked → SIGUSR2 → StatsRequested
//! ```
//!
//! ## Shutdown path
//! ```text
//! run():
//!   OS signal ─► ShutdownRequested ┐
//!   halt()    ─────────────────────┴─► halt(): SIGQUIT to reported pids
//!                                      └─► wait up to grace for children to exit
//!                                            ├─ idle     → AllStoppedWithin
//!                                            └─ timeout  → kill, GraceExceeded
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::command::CommandBridge;
use crate::core::config::Config;
use crate::core::output::Passthrough;
use crate::core::process::Instance;
use crate::core::registry::{ProcessRegistry, ProcessState};
use crate::core::scheduler::{Scheduler, TimerHandle};
use crate::core::shutdown;
use crate::core::signal::{ControlSignal, SignalSender};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::DecayState;
use crate::role::{PerRole, Role};
use crate::subscribers::SubscriberSet;

/// Sends the stats signal to the sync child when someone can consume the answer.
#[derive(Clone)]
struct StatsSolicitor {
    registry: Arc<ProcessRegistry>,
    signals: Arc<dyn SignalSender>,
    bus: Bus,
}

impl StatsSolicitor {
    fn solicit(&self) -> bool {
        let Some(pid) = self.registry.reported_pid(Role::Sync) else {
            tracing::trace!("stats tick skipped: sync pid unknown");
            return false;
        };
        if !self.registry.is_tracked(Role::Server) {
            tracing::trace!("stats tick skipped: no server");
            return false;
        }
        match self.signals.send(pid, ControlSignal::RequestStats) {
            Ok(()) => {
                self.bus.publish(
                    Event::new(EventKind::StatsRequested)
                        .with_role(Role::Sync)
                        .with_pid(pid),
                );
                true
            }
            Err(e) => {
                tracing::warn!(pid, error = %e, label = e.as_label(), "stats request failed");
                false
            }
        }
    }
}

/// Process supervisor for the sync engine and the web server.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    scheduler: Scheduler,
    registry: Arc<ProcessRegistry>,
    decay: Mutex<PerRole<DecayState>>,
    bridge: CommandBridge,
    sink: Arc<dyn Passthrough>,
    signals: Arc<dyn SignalSender>,
    halted: CancellationToken,
    stats_timer: Mutex<Option<TimerHandle>>,
}

/// Everything [`Supervisor::new_internal`] needs; assembled by the builder.
pub(crate) struct SupervisorParts {
    pub(crate) cfg: Config,
    pub(crate) bus: Bus,
    pub(crate) subs: Arc<SubscriberSet>,
    pub(crate) runtime_token: CancellationToken,
    pub(crate) bridge: CommandBridge,
    pub(crate) sink: Arc<dyn Passthrough>,
    pub(crate) signals: Arc<dyn SignalSender>,
}

impl Supervisor {
    /// Returns a builder for the given configuration.
    pub fn builder(cfg: Config) -> crate::core::builder::SupervisorBuilder {
        crate::core::builder::SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(parts: SupervisorParts) -> Self {
        let decay = PerRole::new(
            DecayState::new(parts.cfg.role(Role::Sync).restart),
            DecayState::new(parts.cfg.role(Role::Server).restart),
        );
        Self {
            bus: parts.bus,
            subs: parts.subs,
            scheduler: Scheduler::new(parts.runtime_token),
            registry: ProcessRegistry::new(),
            decay: Mutex::new(decay),
            bridge: parts.bridge,
            sink: parts.sink,
            signals: parts.signals,
            halted: CancellationToken::new(),
            stats_timer: Mutex::new(None),
            cfg: parts.cfg,
        }
    }

    /// Forwards bus events to the subscriber set until the runtime token is cancelled.
    pub(crate) fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.scheduler.handle();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    /// Starts (or replaces) the sync process.
    ///
    /// Returns `false` when halted.
    pub fn start_sync(&self) -> bool {
        self.start(Role::Sync)
    }

    /// Starts (or replaces) the web server process.
    ///
    /// Returns `false` when halted or when the web server is disabled.
    pub fn start_web_server(&self) -> bool {
        if !self.cfg.web_server {
            tracing::debug!("web server disabled; not starting");
            return false;
        }
        self.start(Role::Server)
    }

    fn start(&self, role: Role) -> bool {
        if self.is_halted() {
            tracing::debug!(%role, "halted; start suppressed");
            return false;
        }
        self.ensure_stats_timer();

        let generation = self.registry.next_generation();
        let handle = self.scheduler.handle();
        if let Some(previous) = self.registry.install(role, generation, handle.clone()) {
            tracing::debug!(%role, previous, generation, "replaced running instance");
        }
        self.bus.publish(
            Event::new(EventKind::ProcessStarting)
                .with_role(role)
                .with_generation(generation),
        );

        let instance = Instance {
            role,
            generation,
            program: self.cfg.executable_path(role),
            registry: Arc::clone(&self.registry),
            bus: self.bus.clone(),
            bridge: self.bridge.clone(),
            sink: Arc::clone(&self.sink),
            halted: self.halted.clone(),
        };
        self.scheduler.defer(&handle, instance.run());
        true
    }

    /// Writes a stats payload to the web server's stdin.
    ///
    /// Returns `false` if no server is running, the write fails, or the
    /// server does not drain its stdin within `stats_write_timeout`.
    pub async fn broadcast_stats(&self, payload: &serde_json::Value) -> bool {
        let Some(stdin) = self.registry.stdin(Role::Server) else {
            tracing::debug!("no server to broadcast stats to");
            return false;
        };
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "stats payload not serializable");
                return false;
            }
        };

        // Holding the lock is the write window; releasing it pauses the stream.
        let timeout = self.cfg.stats_write_timeout;
        let written = tokio::time::timeout(timeout, async {
            let mut writer = stdin.lock().await;
            writer.write_all(&bytes).await?;
            writer.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => {
                tracing::trace!(len = bytes.len(), "stats broadcast to server");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stats broadcast failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    ?timeout,
                    len = bytes.len(),
                    "server is not reading stdin; stats dropped"
                );
                false
            }
        }
    }

    /// Runs [`Supervisor::broadcast_stats`] on its own task.
    ///
    /// The caller never waits on the server's stdin. The task holds only a
    /// weak reference and is cancelled with the scheduler.
    pub fn forward_stats(self: &Arc<Self>, payload: Arc<serde_json::Value>) -> TimerHandle {
        let handle = self.scheduler.handle();
        let sup = Arc::downgrade(self);
        self.scheduler.defer(&handle, async move {
            if let Some(sup) = sup.upgrade() {
                sup.broadcast_stats(&payload).await;
            }
        });
        handle
    }

    /// Stops starting children and asks the running ones to quit.
    ///
    /// Sends `SIGQUIT` to every child with a reported pid and forgets the pids.
    /// Exits still surface through the normal exit path. Idempotent.
    pub fn halt(&self) {
        let first = !self.halted.is_cancelled();
        self.halted.cancel();

        if let Some(timer) = self.lock_stats_timer().take() {
            timer.cancel();
        }

        for (role, pid) in self.registry.drain_pids() {
            match self.signals.send(pid, ControlSignal::Quit) {
                Ok(()) => tracing::info!(%role, pid, "sent quit"),
                Err(e) => {
                    tracing::warn!(%role, pid, error = %e, label = e.as_label(), "quit failed");
                }
            }
        }

        if first {
            self.bus.publish(Event::new(EventKind::HaltRequested));
        }
    }

    /// Schedules `event` after the role's next decayed interval.
    ///
    /// The interval is `min(decay × current, max)` and is persisted for the
    /// next call. Cancelling the returned handle cancels the publish.
    pub fn restart_with_decay(&self, role: Role, event: Event) -> TimerHandle {
        let (next, delay) = {
            let mut decay = self.lock_decay();
            let state = decay.get_mut(role);
            if let Some(uptime) = self.registry.take_last_uptime(role) {
                if state.observe_uptime(uptime) {
                    tracing::info!(%role, ?uptime, "child was stable; restart interval reset");
                }
            }
            let next = state.advance();
            (next, state.policy().timer_delay(next))
        };

        let bus = self.bus.clone();
        let handle = self.scheduler.after(delay, async move {
            bus.publish(event);
        });

        tracing::info!(%role, interval = ?next, ?delay, "restart scheduled");
        self.bus.publish(
            Event::new(EventKind::RestartScheduled)
                .with_role(role)
                .with_delay(delay),
        );
        handle
    }

    /// Asks the sync child for a stats snapshot.
    ///
    /// Only signals when the sync pid is known and a server is tracked.
    pub fn solicit_stats(&self) -> bool {
        self.solicitor().solicit()
    }

    fn solicitor(&self) -> StatsSolicitor {
        StatsSolicitor {
            registry: Arc::clone(&self.registry),
            signals: Arc::clone(&self.signals),
            bus: self.bus.clone(),
        }
    }

    /// Creates the periodic stats timer once.
    fn ensure_stats_timer(&self) {
        let mut timer = self.lock_stats_timer();
        if timer.is_some() || self.is_halted() {
            return;
        }
        let solicitor = self.solicitor();
        *timer = Some(self.scheduler.every(self.cfg.stats_interval, move || {
            let solicitor = solicitor.clone();
            async move {
                solicitor.solicit();
            }
        }));
    }

    /// Runs both children until an OS shutdown signal or [`Supervisor::halt`].
    ///
    /// After halting, waits up to the configured grace for the children to
    /// exit and kills the rest.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.ensure_stats_timer();
        self.start_sync();
        self.start_web_server();

        let stopped = tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => res.map_err(RuntimeError::Signals),
            _ = self.halted.cancelled() => Ok(()),
        };
        if stopped.is_ok() && !self.is_halted() {
            self.bus.publish(Event::new(EventKind::ShutdownRequested));
        }

        self.halt();
        let drained = self.drain().await;
        stopped?;
        drained
    }

    async fn drain(&self) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        match tokio::time::timeout(grace, self.registry.wait_idle()).await {
            Ok(()) => {
                tracing::info!("all children stopped");
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.registry.live_roles();
                self.registry.close_all();
                tracing::warn!(?stuck, ?grace, "grace exceeded; killing children");
                self.bus.publish(Event::new(EventKind::GraceExceeded));
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Subscribes to the event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Pid the role's current instance reported, if any.
    pub fn reported_pid(&self, role: Role) -> Option<i32> {
        self.registry.reported_pid(role)
    }

    /// True if the role has a tracked instance.
    pub fn is_tracked(&self, role: Role) -> bool {
        self.registry.is_tracked(role)
    }

    /// Lifecycle state of the role's tracked instance.
    pub fn process_state(&self, role: Role) -> Option<ProcessState> {
        self.registry.state(role)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_cancelled()
    }

    /// Interval the role's next restart is computed from.
    pub fn current_interval(&self, role: Role) -> Duration {
        self.lock_decay().get(role).current()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    fn lock_decay(&self) -> MutexGuard<'_, PerRole<DecayState>> {
        self.decay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats_timer(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.stats_timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use serde_json::json;

    use crate::policies::{DecayPolicy, JitterPolicy};

    #[derive(Default)]
    struct RecordingSignals {
        sent: Mutex<Vec<(i32, ControlSignal)>>,
    }

    impl SignalSender for RecordingSignals {
        fn send(&self, pid: i32, signal: ControlSignal) -> Result<(), RuntimeError> {
            self.sent.lock().unwrap().push((pid, signal));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemorySink(Mutex<String>);

    impl Passthrough for MemorySink {
        fn write(&self, text: &str) {
            self.0.lock().unwrap().push_str(text);
        }
    }

    fn config(dir: &Path) -> Config {
        Config {
            base_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    fn build(cfg: Config, signals: Arc<RecordingSignals>) -> Arc<Supervisor> {
        Supervisor::builder(cfg)
            .with_signals(signals)
            .with_passthrough(Arc::new(MemorySink::default()))
            .build()
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        next_matching(rx, kind, None).await
    }

    async fn next_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind, role: Role) -> Event {
        next_matching(rx, kind, Some(role)).await
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<Event>,
        kind: EventKind,
        role: Option<Role>,
    ) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let ev = rx.recv().await.expect("bus closed");
                if ev.kind == kind && role.map_or(true, |r| ev.role == Some(r)) {
                    return ev;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {kind:?} event for {role:?}"))
    }

    fn large_stats() -> serde_json::Value {
        // Well past a pipe buffer.
        json!({"type": "stats", "blob": "x".repeat(256 * 1024)})
    }

    #[tokio::test]
    async fn test_halt_then_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let sup = build(config(dir.path()), Arc::default());
        sup.halt();
        sup.halt();
        assert!(sup.is_halted());

        let mut rx = sup.subscribe();
        assert!(!sup.start_sync());
        assert!(!sup.start_web_server());
        assert!(!sup.is_tracked(Role::Sync));
        assert!(!sup.is_tracked(Role::Server));
        assert!(sup.lock_stats_timer().is_none());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_web_server_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.web_server = false;
        let sup = build(cfg, Arc::default());
        assert!(!sup.start_web_server());
        assert!(!sup.is_tracked(Role::Server));
    }

    #[tokio::test]
    async fn test_broadcast_without_server_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sup = build(config(dir.path()), Arc::default());
        assert!(!sup.broadcast_stats(&json!({"type": "stats"})).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_with_decay_grows_to_max() {
        let dir = tempfile::tempdir().unwrap();
        let sup = build(config(dir.path()), Arc::default());
        let mut rx = sup.subscribe();
        assert_eq!(sup.current_interval(Role::Sync), Duration::from_secs(5));

        let first = sup.restart_with_decay(Role::Sync, Event::start_requested(Role::Sync));
        assert_eq!(sup.current_interval(Role::Sync), Duration::from_secs(10));
        let ev = next_of(&mut rx, EventKind::RestartScheduled).await;
        assert_eq!(ev.delay_ms, Some(10_000));

        let second = sup.restart_with_decay(Role::Sync, Event::start_requested(Role::Sync));
        assert_eq!(sup.current_interval(Role::Sync), Duration::from_secs(20));
        second.cancel();

        for _ in 0..4 {
            sup.restart_with_decay(Role::Sync, Event::start_requested(Role::Sync))
                .cancel();
        }
        assert_eq!(sup.current_interval(Role::Sync), Duration::from_secs(60));
        assert_eq!(sup.current_interval(Role::Server), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        let ev = next_of(&mut rx, EventKind::StartRequested).await;
        assert_eq!(ev.role, Some(Role::Sync));
        assert!(!first.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_not_solicited_without_sync_pid() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Arc::new(RecordingSignals::default());
        let sup = build(config(dir.path()), signals.clone());

        let server = sup.registry.next_generation();
        sup.registry.install(Role::Server, server, sup.scheduler.handle());
        let sync = sup.registry.next_generation();
        sup.registry.install(Role::Sync, sync, sup.scheduler.handle());
        sup.ensure_stats_timer();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(signals.sent.lock().unwrap().is_empty());
        assert!(!sup.solicit_stats());

        sup.registry.record_pid(Role::Sync, sync, 4321);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            *signals.sent.lock().unwrap(),
            vec![(4321, ControlSignal::RequestStats)]
        );
    }

    #[tokio::test]
    async fn test_stats_not_solicited_without_server() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Arc::new(RecordingSignals::default());
        let sup = build(config(dir.path()), signals.clone());

        let sync = sup.registry.next_generation();
        sup.registry.install(Role::Sync, sync, sup.scheduler.handle());
        sup.registry.record_pid(Role::Sync, sync, 4321);

        assert!(!sup.solicit_stats());
        assert!(signals.sent.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_sync_twice_tracks_one_instance() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "sync", "exec sleep 30");
        let sup = build(config(dir.path()), Arc::default());
        let mut rx = sup.subscribe();

        assert!(sup.start_sync());
        let first = sup.registry.generation(Role::Sync).unwrap();
        assert!(sup.start_sync());
        let second = sup.registry.generation(Role::Sync).unwrap();
        assert_ne!(first, second);

        let spawned = next_of(&mut rx, EventKind::ProcessSpawned).await;
        assert_eq!(spawned.generation, Some(second));
        assert_eq!(sup.process_state(Role::Sync), Some(ProcessState::Running));

        let exit = tokio::time::timeout(
            Duration::from_millis(300),
            next_of(&mut rx, EventKind::SyncExited),
        )
        .await;
        assert!(exit.is_err(), "replaced instance reported an exit");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_pid_is_reported_and_quit_on_halt() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "sync",
            "echo '{\"type\":\"pid\",\"pid\":'$$'}'\nexec sleep 30",
        );
        let signals = Arc::new(RecordingSignals::default());
        let sup = build(config(dir.path()), signals.clone());
        let mut rx = sup.subscribe();

        sup.start_sync();
        let spawned = next_of(&mut rx, EventKind::ProcessSpawned).await;
        let reported = next_of(&mut rx, EventKind::PidReported).await;
        assert_eq!(reported.pid, spawned.pid);
        assert_eq!(sup.reported_pid(Role::Sync), spawned.pid);

        sup.halt();
        let pid = spawned.pid.unwrap();
        assert_eq!(
            *signals.sent.lock().unwrap(),
            vec![(pid, ControlSignal::Quit)]
        );
        assert_eq!(sup.reported_pid(Role::Sync), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_exit_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "sync", "exit 3");
        let sup = build(config(dir.path()), Arc::default());
        let mut rx = sup.subscribe();

        sup.start_sync();
        let ev = next_of(&mut rx, EventKind::SyncExited).await;
        assert_eq!(ev.role, Some(Role::Sync));
        assert_eq!(ev.exit_code, Some(3));
        assert_eq!(sup.process_state(Role::Sync), Some(ProcessState::Exited));
        assert!(sup.is_tracked(Role::Sync));
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_exit() {
        let dir = tempfile::tempdir().unwrap();
        let sup = build(config(dir.path()), Arc::default());
        let mut rx = sup.subscribe();

        sup.start_sync();
        let failed = next_of(&mut rx, EventKind::SpawnFailed).await;
        assert!(failed.reason.is_some());
        let exited = next_of(&mut rx, EventKind::SyncExited).await;
        assert_eq!(exited.generation, failed.generation);
        assert!(exited.reason.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broadcast_writes_server_stdin() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "server", "exec cat");
        let sup = build(config(dir.path()), Arc::default());
        let mut rx = sup.subscribe();

        sup.start_web_server();
        next_of(&mut rx, EventKind::ProcessSpawned).await;

        let payload = json!({"type": "stats", "unread": 3});
        assert!(sup.broadcast_stats(&payload).await);

        // cat echoes the payload back as a stats message.
        let echoed = next_of(&mut rx, EventKind::BroadcastStats).await;
        assert_eq!(echoed.role, Some(Role::Server));
        assert_eq!(echoed.payload.as_deref(), Some(&payload));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broadcast_to_stalled_server_times_out() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "server", "exec sleep 30");
        let mut cfg = config(dir.path());
        cfg.stats_write_timeout = Duration::from_millis(200);
        let sup = build(cfg, Arc::default());
        let mut rx = sup.subscribe();

        sup.start_web_server();
        next_for(&mut rx, EventKind::ProcessSpawned, Role::Server).await;

        let payload = large_stats();
        let sent = tokio::time::timeout(Duration::from_secs(5), sup.broadcast_stats(&payload))
            .await
            .expect("broadcast did not give up");
        assert!(!sent);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_server_does_not_delay_restarts() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "server", "exec sleep 30");
        script(dir.path(), "sync", "sleep 0.5\nexit 1");
        let mut cfg = config(dir.path());
        cfg.stats_write_timeout = Duration::from_secs(30);
        cfg.roles.sync.restart.initial = Duration::from_millis(10);
        let sup = Supervisor::builder(cfg)
            .with_signals(Arc::new(RecordingSignals::default()))
            .with_passthrough(Arc::new(MemorySink::default()))
            .with_restart_on_exit()
            .build();
        let mut rx = sup.subscribe();

        sup.start_web_server();
        next_for(&mut rx, EventKind::ProcessSpawned, Role::Server).await;
        sup.bus.publish(Event::new(EventKind::BroadcastStats).with_payload(large_stats()));

        sup.start_sync();
        next_for(&mut rx, EventKind::SyncExited, Role::Sync).await;
        let scheduled = next_for(&mut rx, EventKind::RestartScheduled, Role::Sync).await;
        assert_eq!(scheduled.delay_ms, Some(20));

        sup.halt();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stable_run_resets_restart_interval() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "sync", "sleep 0.3\nexit 1");
        let mut cfg = config(dir.path());
        cfg.web_server = false;
        cfg.roles.sync.restart = DecayPolicy {
            initial: Duration::from_secs(1),
            decay: 2.0,
            max: Duration::from_secs(60),
            stable_after: Some(Duration::from_millis(200)),
            jitter: JitterPolicy::None,
        };
        let sup = build(cfg, Arc::default());
        let mut rx = sup.subscribe();

        for _ in 0..2 {
            sup.restart_with_decay(Role::Sync, Event::start_requested(Role::Sync))
                .cancel();
        }
        assert_eq!(sup.current_interval(Role::Sync), Duration::from_secs(4));

        sup.start_sync();
        next_of(&mut rx, EventKind::SyncExited).await;

        // Reset to 1s, then advanced once.
        sup.restart_with_decay(Role::Sync, Event::start_requested(Role::Sync))
            .cancel();
        assert_eq!(sup.current_interval(Role::Sync), Duration::from_secs(2));

        // The uptime is consumed by the first restart.
        sup.restart_with_decay(Role::Sync, Event::start_requested(Role::Sync))
            .cancel();
        assert_eq!(sup.current_interval(Role::Sync), Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restart_on_exit_respawns_child() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "sync", "exit 1");
        let mut cfg = config(dir.path());
        cfg.web_server = false;
        cfg.roles.sync.restart = DecayPolicy {
            initial: Duration::from_millis(10),
            decay: 2.0,
            max: Duration::from_millis(50),
            stable_after: None,
            jitter: JitterPolicy::None,
        };
        let sup = Supervisor::builder(cfg)
            .with_signals(Arc::new(RecordingSignals::default()))
            .with_restart_on_exit()
            .build();
        let mut rx = sup.subscribe();

        sup.start_sync();
        let first = next_of(&mut rx, EventKind::ProcessSpawned).await;
        next_of(&mut rx, EventKind::RestartScheduled).await;
        let second = next_of(&mut rx, EventKind::ProcessSpawned).await;
        assert!(second.generation > first.generation);

        sup.halt();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_stops_children_after_halt() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "sync",
            "trap 'exit 0' QUIT\n\
             echo '{\"type\":\"pid\",\"pid\":'$$'}'\n\
             sleep 30 >/dev/null &\n\
             wait",
        );
        let mut cfg = config(dir.path());
        cfg.web_server = false;
        cfg.grace = Duration::from_secs(5);
        let sup = Supervisor::builder(cfg)
            .with_passthrough(Arc::new(MemorySink::default()))
            .build();
        let mut rx = sup.subscribe();

        let running = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move { sup.run().await })
        };
        next_of(&mut rx, EventKind::PidReported).await;
        sup.halt();

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("run did not return")
            .unwrap();
        assert!(result.is_ok());
        next_of(&mut rx, EventKind::AllStoppedWithin).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_grace_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "sync", "exec sleep 30");
        let mut cfg = config(dir.path());
        cfg.web_server = false;
        cfg.grace = Duration::from_millis(200);
        let sup = build(cfg, Arc::default());
        let mut rx = sup.subscribe();

        let running = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move { sup.run().await })
        };
        next_of(&mut rx, EventKind::ProcessSpawned).await;
        sup.halt();

        let err = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("run did not return")
            .unwrap()
            .unwrap_err();
        match err {
            RuntimeError::GraceExceeded { stuck, .. } => assert_eq!(stuck, vec![Role::Sync]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
