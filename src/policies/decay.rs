//! # Decaying restart interval.
//!
//! [`DecayPolicy`] holds the per-role knobs and [`DecayState`] the interval
//! that grows with each failure:
//!
//! ```text
//! next = min(decay × current, restart_max)
//! ```
//!
//! The computed value is persisted as the role's current interval, so the
//! sequence for `decay = 2`, `restart_max = 60s`, `restart_interval = 5s` is
//! `10s, 20s, 40s, 60s, 60s, ...`.
//!
//! The interval only moves upward. The one exception is the optional
//! stability reset: when [`DecayPolicy::stable_after`] is set and a process
//! ran at least that long before exiting, the interval returns to
//! [`DecayPolicy::initial`] before the next computation.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use mailvisor::{DecayPolicy, DecayState};
//!
//! let policy = DecayPolicy {
//!     initial: Duration::from_secs(5),
//!     decay: 2.0,
//!     max: Duration::from_secs(60),
//!     ..DecayPolicy::default()
//! };
//! let mut state = DecayState::new(policy);
//!
//! assert_eq!(state.advance(), Duration::from_secs(10));
//! assert_eq!(state.advance(), Duration::from_secs(20));
//! assert_eq!(state.current(), Duration::from_secs(20));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Restart backoff knobs for one role.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecayPolicy {
    /// Interval the role starts from (and returns to on a stability reset).
    pub initial: Duration,
    /// Multiplier applied on every restart (`>= 1.0`).
    pub decay: f64,
    /// Hard ceiling for the interval.
    pub max: Duration,
    /// Uptime after which the interval resets (`None` = never).
    pub stable_after: Option<Duration>,
    /// Randomization of the scheduled delay.
    pub jitter: JitterPolicy,
}

impl Default for DecayPolicy {
    /// `initial = 5s`, `decay = 2.0`, `max = 60s`, no stability reset, no jitter.
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            decay: 2.0,
            max: Duration::from_secs(60),
            stable_after: None,
            jitter: JitterPolicy::None,
        }
    }
}

impl DecayPolicy {
    /// Computes `min(decay × current, max)`.
    ///
    /// Non-finite or negative products clamp to `max`.
    pub fn next(&self, current: Duration) -> Duration {
        let secs = current.as_secs_f64() * self.decay;
        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay the restart timer actually waits for an interval of `next`.
    pub fn timer_delay(&self, next: Duration) -> Duration {
        self.jitter.apply(next, self.initial.min(self.max), self.max)
    }
}

/// Current interval of one role.
#[derive(Clone, Debug)]
pub struct DecayState {
    policy: DecayPolicy,
    current: Duration,
}

impl DecayState {
    pub fn new(policy: DecayPolicy) -> Self {
        Self {
            current: policy.initial,
            policy,
        }
    }

    pub fn policy(&self) -> &DecayPolicy {
        &self.policy
    }

    /// Interval the next failure will be computed from.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Computes the next interval and persists it.
    pub fn advance(&mut self) -> Duration {
        let next = self.policy.next(self.current);
        self.current = next;
        next
    }

    /// Resets the interval when `uptime` reached the stability threshold.
    ///
    /// Returns `true` if the interval was reset.
    pub fn observe_uptime(&mut self, uptime: Duration) -> bool {
        match self.policy.stable_after {
            Some(threshold) if uptime >= threshold && self.current != self.policy.initial => {
                self.current = self.policy.initial;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial: u64, decay: f64, max: u64) -> DecayPolicy {
        DecayPolicy {
            initial: Duration::from_secs(initial),
            decay,
            max: Duration::from_secs(max),
            ..DecayPolicy::default()
        }
    }

    #[test]
    fn test_converges_to_cap_and_stays() {
        let mut state = DecayState::new(policy(5, 2.0, 60));
        let seen: Vec<u64> = (0..6).map(|_| state.advance().as_secs()).collect();
        assert_eq!(seen, vec![10, 20, 40, 60, 60, 60]);
        assert_eq!(state.current(), Duration::from_secs(60));
    }

    #[test]
    fn test_constant_decay() {
        let mut state = DecayState::new(policy(3, 1.0, 60));
        for _ in 0..5 {
            assert_eq!(state.advance(), Duration::from_secs(3));
        }
    }

    #[test]
    fn test_initial_above_cap_clamps() {
        let mut state = DecayState::new(policy(90, 2.0, 60));
        assert_eq!(state.advance(), Duration::from_secs(60));
    }

    #[test]
    fn test_non_finite_decay_clamps_to_max() {
        let p = policy(5, f64::INFINITY, 60);
        assert_eq!(p.next(Duration::from_secs(5)), Duration::from_secs(60));
        let p = policy(5, f64::NAN, 60);
        assert_eq!(p.next(Duration::from_secs(5)), Duration::from_secs(60));
    }

    #[test]
    fn test_stability_reset() {
        let mut p = policy(5, 2.0, 60);
        p.stable_after = Some(Duration::from_secs(300));
        let mut state = DecayState::new(p);
        state.advance();
        state.advance();

        assert!(!state.observe_uptime(Duration::from_secs(10)));
        assert_eq!(state.current(), Duration::from_secs(20));

        assert!(state.observe_uptime(Duration::from_secs(300)));
        assert_eq!(state.current(), Duration::from_secs(5));
        assert_eq!(state.advance(), Duration::from_secs(10));
    }

    #[test]
    fn test_no_reset_without_threshold() {
        let mut state = DecayState::new(policy(5, 2.0, 60));
        state.advance();
        assert!(!state.observe_uptime(Duration::from_secs(86_400)));
        assert_eq!(state.current(), Duration::from_secs(10));
    }

    #[test]
    fn test_timer_delay_without_jitter_is_exact() {
        let p = policy(5, 2.0, 60);
        assert_eq!(p.timer_delay(Duration::from_secs(40)), Duration::from_secs(40));
    }
}
