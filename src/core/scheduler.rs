//! # Timers and deferred work on the tokio reactor.
//!
//! The supervisor never blocks: everything that has to happen later is a task
//! on the runtime, created through a [`Scheduler`]:
//!
//! ```text
//! defer(handle, fut)   next tick: run fut          (process instances)
//! after(delay, fut)    one-shot: sleep, run fut    (restart timers)
//! every(period, f)     periodic: tick, run f()     (stats solicitation)
//! ```
//!
//! Each unit of work gets a [`TimerHandle`], a child of the scheduler's root
//! [`CancellationToken`]. Cancelling a handle drops the future at its next
//! suspension point; [`Scheduler::shutdown`] cancels everything at once.
//!
//! ## Rules
//! - Work never starts synchronously inside the caller's callback.
//! - Periodic ticks do not overlap: the next tick waits for `f()` to finish,
//!   and missed ticks are delayed rather than bursted.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Cancellation handle for scheduled work. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// Cancels the work; idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Spawns deferred, delayed and periodic work on the current runtime.
#[derive(Clone, Debug)]
pub struct Scheduler {
    root: CancellationToken,
}

impl Scheduler {
    pub fn new(root: CancellationToken) -> Self {
        Self { root }
    }

    /// Allocates a handle for work that will be spawned later with [`Scheduler::defer`].
    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            token: self.root.child_token(),
        }
    }

    /// Runs `fut` on a later tick, until it completes or `handle` is cancelled.
    pub fn defer<F>(&self, handle: &TimerHandle, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = handle.token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    /// Runs `fut` once after `delay`.
    pub fn after<F>(&self, delay: Duration, fut: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.handle();
        let token = handle.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(delay) => fut.await,
            }
        });
        handle
    }

    /// Calls `f` every `period`, first after one full period.
    pub fn every<F, Fut>(&self, period: Duration, mut f: F) -> TimerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.handle();
        let token = handle.token.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => f().await,
                }
            }
        });
        handle
    }

    /// Cancels every handle created by this scheduler.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let c = Arc::new(AtomicUsize::new(0));
        let read = {
            let c = c.clone();
            move || c.load(Ordering::SeqCst)
        };
        (c, read)
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_fires_once() {
        let sched = Scheduler::new(CancellationToken::new());
        let (c, read) = counter();
        sched.after(Duration::from_secs(10), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_secs(9)).await;
        assert_eq!(read(), 0);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(read(), 1);
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(read(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let sched = Scheduler::new(CancellationToken::new());
        let (c, read) = counter();
        let h = sched.after(Duration::from_secs(1), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        h.cancel();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(read(), 0);
        assert!(h.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_ticks_after_each_period() {
        let sched = Scheduler::new(CancellationToken::new());
        let (c, read) = counter();
        let h = sched.every(Duration::from_secs(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(read(), 0);
        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(read(), 3);

        h.cancel();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(read(), 3);
    }

    #[tokio::test]
    async fn test_defer_runs_after_caller_yields() {
        let sched = Scheduler::new(CancellationToken::new());
        let (c, read) = counter();
        let h = sched.handle();
        sched.defer(&h, async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(read(), 0);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(read(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_children() {
        let sched = Scheduler::new(CancellationToken::new());
        let h1 = sched.after(Duration::from_secs(1), async {});
        let h2 = sched.handle();
        sched.shutdown();
        assert!(h1.is_cancelled());
        assert!(h2.is_cancelled());
    }
}
