//! Retry delay computation shared by all collectors

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::collectors::RetryPolicy;

/// Delay before the next attempt of a task
///
/// Exponential in `retry_count` (1 → `backoff_base`, 2 → 2×base, …), capped at
/// `backoff_max`. A known quota reset later than that wins, so a rate-limited
/// task never retries before the upstream window reopens.
pub fn retry_delay(
    policy: &RetryPolicy,
    retry_count: u32,
    reset_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(31);
    let backoff = policy
        .backoff_base
        .checked_mul(1u32 << exponent)
        .unwrap_or(policy.backoff_max)
        .min(policy.backoff_max);

    backoff.max(until(reset_at, now))
}

/// Time remaining until `reset_at` (zero if unknown or past)
pub fn until(reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    reset_at
        .and_then(|reset| (reset - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}
