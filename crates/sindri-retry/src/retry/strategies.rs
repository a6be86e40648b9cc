//! Backoff calculation
//!
//! A single formula covers fixed, linear and exponential schedules:
//!
//! ```text
//! candidate = min(wait_max, wait_min * random * linear * factor^tries_consumed)
//! wait      = min(candidate, time_remaining)
//! ```
//!
//! `wait_max` is applied before the time budget so a large exponential jump is
//! clipped even when plenty of budget remains. The final clamp to the remaining
//! budget means the next attempt fires exactly when the budget expires rather
//! than sleeping past it.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters of a sealed policy, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Base wait between attempts
    pub wait_min_ms: f64,
    /// Absolute ceiling on a single wait (may be infinite)
    pub wait_max_ms: f64,
    /// Exponential base applied per consumed try
    pub factor: f64,
    /// Multiply the wait by the number of consumed tries
    pub linear: bool,
    /// Jitter the wait by a uniform factor in `[1, 2)`
    pub random: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            wait_min_ms: 1000.0,
            wait_max_ms: f64::INFINITY,
            factor: 1.0,
            linear: false,
            random: false,
        }
    }
}

/// Calculate the wait before the next attempt
///
/// # Arguments
///
/// * `time_remaining_ms` - Time left in the run's budget (infinite if unbounded)
/// * `tries_consumed` - Attempts charged to the retry budget so far
/// * `backoff` - The policy's backoff parameters
///
/// # Example
///
/// ```rust
/// use sindri_retry::retry::{wait_time, Backoff};
/// use std::time::Duration;
///
/// let backoff = Backoff {
///     wait_min_ms: 100.0,
///     factor: 2.0,
///     ..Backoff::default()
/// };
///
/// assert_eq!(wait_time(10_000.0, 2, &backoff), Duration::from_millis(400));
/// ```
pub fn wait_time(time_remaining_ms: f64, tries_consumed: u32, backoff: &Backoff) -> Duration {
    let random_factor = if backoff.random {
        rand::rng().random_range(1.0..2.0)
    } else {
        1.0
    };
    wait_time_with_jitter(time_remaining_ms, tries_consumed, backoff, random_factor)
}

/// Deterministic core of [`wait_time`] with the jitter factor supplied
pub fn wait_time_with_jitter(
    time_remaining_ms: f64,
    tries_consumed: u32,
    backoff: &Backoff,
    random_factor: f64,
) -> Duration {
    let linear_factor = if backoff.linear {
        f64::from(tries_consumed)
    } else {
        1.0
    };
    let exponent = (tries_consumed.saturating_add(1)).max(1) - 1;
    let exponent_factor = backoff.factor.powf(f64::from(exponent));

    let candidate = backoff
        .wait_max_ms
        .min(backoff.wait_min_ms * random_factor * linear_factor * exponent_factor);

    ms_to_duration(candidate.min(time_remaining_ms))
}

/// Convert fractional milliseconds to a duration, clamping negatives to zero
/// and saturating on overflow
pub(crate) fn ms_to_duration(ms: f64) -> Duration {
    if ms.is_nan() || ms <= 0.0 {
        return Duration::ZERO;
    }
    // `as` saturates, so an infinite wait becomes the longest representable one
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}

/// Convert a duration to fractional milliseconds
pub(crate) fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
