//! # Process registry: one slot per role.
//!
//! The registry is the supervisor's bookkeeping for its two children. Each
//! role has at most one tracked instance:
//!
//! ```text
//!            install(gen)           attach(gen, stdin)        mark_exited(gen)
//! (empty) ───────────────► Starting ─────────────────► Running ───────────────► Exited
//!    ▲                        │                           │                       │
//!    └──── install(gen+1) replaces any of these; the old slot is closed once ─────┘
//! ```
//!
//! ## Rules
//! - Generations are unique; callbacks carrying a stale generation are ignored,
//!   so a replaced instance can neither record a pid nor report an exit.
//! - The reported pid is cleared on replace, on exit and on halt.
//! - The lock is a plain mutex and is never held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::ChildStdin;
use tokio::sync::Notify;

use crate::core::scheduler::TimerHandle;
use crate::role::{PerRole, Role};

/// Lifecycle state of a tracked instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Registered; the spawn is pending on the next tick.
    Starting,
    /// The OS process is running.
    Running,
    /// The OS process terminated (or never spawned).
    Exited,
}

/// Shared writer to a child's stdin.
pub(crate) type StdinWriter = Arc<tokio::sync::Mutex<ChildStdin>>;

/// Bookkeeping for one process instance.
pub(crate) struct Slot {
    generation: u64,
    state: ProcessState,
    handle: TimerHandle,
    stdin: Option<StdinWriter>,
    reported_pid: Option<i32>,
    started_at: Option<Instant>,
}

impl Slot {
    /// Closes the instance: cancels its task (which kills the child) and drops stdin.
    fn close(self) {
        self.handle.cancel();
    }

    fn is_live(&self) -> bool {
        !matches!(self.state, ProcessState::Exited)
    }
}

#[derive(Default)]
struct Slots {
    roles: PerRole<Option<Slot>>,
    last_uptime: PerRole<Option<Duration>>,
}

/// Per-role process table shared between the supervisor and its instance tasks.
pub struct ProcessRegistry {
    slots: Mutex<Slots>,
    next_generation: AtomicU64,
    changed: Notify,
}

impl ProcessRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Slots::default()),
            next_generation: AtomicU64::new(1),
            changed: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a fresh generation number.
    pub(crate) fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Tracks a new `Starting` instance, closing the previous one of the role.
    ///
    /// Returns the generation of the replaced instance, if any.
    pub(crate) fn install(&self, role: Role, generation: u64, handle: TimerHandle) -> Option<u64> {
        let slot = Slot {
            generation,
            state: ProcessState::Starting,
            handle,
            stdin: None,
            reported_pid: None,
            started_at: None,
        };
        let previous = self.lock().roles.get_mut(role).replace(slot);
        self.changed.notify_waiters();

        previous.map(|old| {
            let generation = old.generation;
            old.close();
            generation
        })
    }

    /// Marks a spawned instance `Running`. Returns `false` if it was replaced.
    pub(crate) fn attach(&self, role: Role, generation: u64, stdin: Option<ChildStdin>) -> bool {
        let mut slots = self.lock();
        match slots.roles.get_mut(role) {
            Some(slot) if slot.generation == generation => {
                slot.state = ProcessState::Running;
                slot.stdin = stdin.map(|s| Arc::new(tokio::sync::Mutex::new(s)));
                slot.started_at = Some(Instant::now());
                true
            }
            _ => false,
        }
    }

    /// Marks an instance `Exited`. Returns `false` if it was replaced meanwhile.
    pub(crate) fn mark_exited(&self, role: Role, generation: u64) -> bool {
        let mut slots = self.lock();
        let uptime = match slots.roles.get_mut(role) {
            Some(slot) if slot.generation == generation => {
                slot.state = ProcessState::Exited;
                slot.stdin = None;
                slot.reported_pid = None;
                slot.started_at.map(|t| t.elapsed())
            }
            _ => return false,
        };
        if uptime.is_some() {
            *slots.last_uptime.get_mut(role) = uptime;
        }
        drop(slots);
        self.changed.notify_waiters();
        true
    }

    /// Records a self-reported pid. Returns `false` for a stale generation.
    pub(crate) fn record_pid(&self, role: Role, generation: u64, pid: i32) -> bool {
        let mut slots = self.lock();
        match slots.roles.get_mut(role) {
            Some(slot) if slot.generation == generation && slot.is_live() => {
                slot.reported_pid = Some(pid);
                true
            }
            _ => false,
        }
    }

    /// Takes every known reported pid, leaving none behind.
    pub(crate) fn drain_pids(&self) -> Vec<(Role, i32)> {
        let mut slots = self.lock();
        Role::ALL
            .into_iter()
            .filter_map(|role| {
                let slot = slots.roles.get_mut(role).as_mut()?;
                slot.reported_pid.take().map(|pid| (role, pid))
            })
            .collect()
    }

    /// Uptime of the role's last exited instance, consumed by the caller.
    pub(crate) fn take_last_uptime(&self, role: Role) -> Option<Duration> {
        self.lock().last_uptime.get_mut(role).take()
    }

    /// Writer to the role's stdin, while it is running.
    pub(crate) fn stdin(&self, role: Role) -> Option<StdinWriter> {
        self.lock().roles.get(role).as_ref()?.stdin.clone()
    }

    /// Pid the role's current instance reported, if any.
    pub fn reported_pid(&self, role: Role) -> Option<i32> {
        self.lock().roles.get(role).as_ref()?.reported_pid
    }

    /// True if the role has a tracked instance (in any state).
    pub fn is_tracked(&self, role: Role) -> bool {
        self.lock().roles.get(role).is_some()
    }

    /// State of the role's tracked instance.
    pub fn state(&self, role: Role) -> Option<ProcessState> {
        self.lock().roles.get(role).as_ref().map(|s| s.state)
    }

    /// Generation of the role's tracked instance.
    #[cfg(test)]
    pub fn generation(&self, role: Role) -> Option<u64> {
        self.lock().roles.get(role).as_ref().map(|s| s.generation)
    }

    /// Roles whose instance is starting or running.
    pub fn live_roles(&self) -> Vec<Role> {
        let slots = self.lock();
        Role::ALL
            .into_iter()
            .filter(|r| slots.roles.get(*r).as_ref().is_some_and(Slot::is_live))
            .collect()
    }

    /// Cancels every live instance.
    pub(crate) fn close_all(&self) {
        let slots = self.lock();
        for role in Role::ALL {
            if let Some(slot) = slots.roles.get(role) {
                slot.handle.cancel();
            }
        }
    }

    /// Resolves once no role is starting or running.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.live_roles().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::Scheduler;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<ProcessRegistry>, Scheduler) {
        (ProcessRegistry::new(), Scheduler::new(CancellationToken::new()))
    }

    #[test]
    fn test_install_replaces_and_closes_previous_once() {
        let (reg, sched) = setup();
        let first = sched.handle();
        let g1 = reg.next_generation();
        assert_eq!(reg.install(Role::Sync, g1, first.clone()), None);
        assert!(!first.is_cancelled());

        let second = sched.handle();
        let g2 = reg.next_generation();
        assert_eq!(reg.install(Role::Sync, g2, second.clone()), Some(g1));
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(reg.generation(Role::Sync), Some(g2));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let (reg, sched) = setup();
        let g1 = reg.next_generation();
        reg.install(Role::Sync, g1, sched.handle());
        let g2 = reg.next_generation();
        reg.install(Role::Sync, g2, sched.handle());

        assert!(!reg.attach(Role::Sync, g1, None));
        assert!(!reg.record_pid(Role::Sync, g1, 100));
        assert!(!reg.mark_exited(Role::Sync, g1));
        assert_eq!(reg.state(Role::Sync), Some(ProcessState::Starting));
        assert_eq!(reg.reported_pid(Role::Sync), None);
    }

    #[test]
    fn test_pid_lifecycle() {
        let (reg, sched) = setup();
        let g = reg.next_generation();
        reg.install(Role::Sync, g, sched.handle());
        assert!(reg.attach(Role::Sync, g, None));
        assert!(reg.record_pid(Role::Sync, g, 4321));
        assert_eq!(reg.reported_pid(Role::Sync), Some(4321));

        assert!(reg.mark_exited(Role::Sync, g));
        assert_eq!(reg.reported_pid(Role::Sync), None);
        assert!(reg.is_tracked(Role::Sync));
        assert!(reg.take_last_uptime(Role::Sync).is_some());
        assert!(reg.take_last_uptime(Role::Sync).is_none());
    }

    #[test]
    fn test_drain_pids_clears_all() {
        let (reg, sched) = setup();
        for (role, pid) in [(Role::Sync, 10), (Role::Server, 20)] {
            let g = reg.next_generation();
            reg.install(role, g, sched.handle());
            reg.record_pid(role, g, pid);
        }
        let mut pids = reg.drain_pids();
        pids.sort();
        assert_eq!(pids, vec![(Role::Sync, 10), (Role::Server, 20)]);
        assert!(reg.drain_pids().is_empty());
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_on_exit() {
        let (reg, sched) = setup();
        let g = reg.next_generation();
        reg.install(Role::Server, g, sched.handle());
        assert_eq!(reg.live_roles(), vec![Role::Server]);

        let waiter = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.wait_idle().await })
        };
        tokio::task::yield_now().await;
        reg.mark_exited(Role::Server, g);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_idle did not wake")
            .unwrap();
        assert!(reg.live_roles().is_empty());
    }
}
