//! # Jitter policy for restart delays.
//!
//! [`JitterPolicy`] adds randomness to the delay a restart timer waits, so a
//! sync engine and a web server failing for the same reason (network down,
//! database locked) do not come back in lockstep.
//!
//! - [`JitterPolicy::None`] no randomization, exact decayed interval (default)
//! - [`JitterPolicy::Full`] random delay in [0, interval]
//! - [`JitterPolicy::Equal`] interval/2 + random[0, interval/2]
//! - [`JitterPolicy::Decorrelated`] random[initial, interval * 3], capped at max
//!
//! Jitter only affects the timer. The persisted interval of the role is always
//! the un-jittered decayed value.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Policy controlling randomization of restart delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Use the exact decayed interval.
    #[default]
    None,
    /// Random delay in [0, interval].
    Full,
    /// interval/2 + random[0, interval/2].
    Equal,
    /// random[initial, interval * 3], capped at max.
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `floor` and `max` are only consulted by [`JitterPolicy::Decorrelated`].
    pub fn apply(&self, delay: Duration, floor: Duration, max: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
            JitterPolicy::Decorrelated => decorrelated_jitter(delay, floor, max),
        }
    }
}

/// random[0, delay]
fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

/// delay/2 + random[0, delay/2]
fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return delay;
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}

/// random[floor, min(delay * 3, max)]
fn decorrelated_jitter(delay: Duration, floor: Duration, max: Duration) -> Duration {
    let floor_ms = floor.as_millis() as u64;
    let upper = (delay.as_millis() as u64)
        .saturating_mul(3)
        .min(max.as_millis() as u64)
        .max(floor_ms);

    if floor_ms >= upper {
        return floor;
    }
    Duration::from_millis(rand::rng().random_range(floor_ms..=upper))
}
