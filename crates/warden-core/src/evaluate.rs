//! Remaining-time evaluators
//!
//! Pure functions of their inputs: no side effects, no clock access.
//! `None` means the dimension is disabled and never expires; a negative
//! remaining time means the deadline has already passed.

use chrono::{DateTime, TimeDelta, Utc};
use warden_config::TimeoutPolicy;

fn remaining(anchor: DateTime<Utc>, policy: &TimeoutPolicy, now: DateTime<Utc>) -> Option<TimeDelta> {
    match policy {
        TimeoutPolicy::Never => None,
        TimeoutPolicy::After(timeout) => {
            let timeout = TimeDelta::from_std(*timeout).unwrap_or(TimeDelta::MAX);
            let elapsed = now.signed_duration_since(anchor);
            // Saturate instead of overflowing on absurd policy durations
            Some(timeout.checked_sub(&elapsed).unwrap_or(TimeDelta::MAX))
        }
    }
}

/// Time until absolute expiry, measured from instance creation.
pub fn remaining_lifetime(
    created_at: DateTime<Utc>,
    max_lifetime: &TimeoutPolicy,
    now: DateTime<Utc>,
) -> Option<TimeDelta> {
    remaining(created_at, max_lifetime, now)
}

/// Time until inactivity-triggered termination, measured from the stored
/// last-activity timestamp.
pub fn remaining_inactivity(
    last_activity: DateTime<Utc>,
    inactivity_timeout: &TimeoutPolicy,
    now: DateTime<Utc>,
) -> Option<TimeDelta> {
    remaining(last_activity, inactivity_timeout, now)
}

/// Whether a remaining-time value has reached its deadline.
pub fn is_due(remaining: Option<TimeDelta>) -> bool {
    matches!(remaining, Some(r) if r <= TimeDelta::zero())
}

/// Smallest of the finite remaining times, if any dimension is enabled.
pub fn min_remaining(a: Option<TimeDelta>, b: Option<TimeDelta>) -> Option<TimeDelta> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
