//! Inter-attempt delay calculation.
//!
//! ```text
//! candidate = min_wait * linear * growth_factor^retries_consumed * jitter
//! wait      = min(candidate, max_wait, time_remaining), floored at zero
//! ```
//!
//! `linear` is the consumed-retry count when linear growth is enabled and `1`
//! otherwise, so with linear growth the very first retry does not wait.
//! `jitter` is drawn uniformly from `[1, 2)` when enabled.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay before the next attempt, using the thread-local RNG for jitter.
#[must_use]
pub fn compute_wait(
    time_remaining: Option<Duration>,
    retries_consumed: u32,
    config: &RetryConfig,
) -> Duration {
    compute_wait_with_rng(time_remaining, retries_consumed, config, &mut rand::rng())
}

/// Delay before the next attempt, drawing jitter from `rng`.
///
/// `time_remaining` is `None` when there is no elapsed-time budget.
#[must_use]
pub fn compute_wait_with_rng<R: Rng>(
    time_remaining: Option<Duration>,
    retries_consumed: u32,
    config: &RetryConfig,
    rng: &mut R,
) -> Duration {
    let base_ms = duration_to_ms(config.min_wait());
    let linear = if config.linear_growth() {
        f64::from(retries_consumed)
    } else {
        1.0
    };
    // Zero times an overflowed exponential would be NaN.
    if base_ms == 0.0 || linear == 0.0 {
        return Duration::ZERO;
    }

    let exponential = config.growth_factor().powf(f64::from(retries_consumed));
    let jitter = if config.jitter() {
        rng.random_range(1.0..2.0)
    } else {
        1.0
    };

    let candidate = duration_from_ms(base_ms * linear * exponential * jitter);
    [Some(candidate), config.max_wait(), time_remaining]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(Duration::ZERO)
}

fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Milliseconds to a duration, saturating at `Duration::MAX`.
fn duration_from_ms(ms: f64) -> Duration {
    if ms.is_nan() || ms <= 0.0 {
        return Duration::ZERO;
    }
    let secs = (ms / 1000.0).trunc();
    if secs >= u64::MAX as f64 {
        return Duration::MAX;
    }
    let nanos = ((ms - secs * 1000.0) * 1_000_000.0)
        .round()
        .clamp(0.0, 999_999_999.0);
    Duration::new(secs as u64, nanos as u32)
}
