//! Notification escalation policy
//!
//! Decides whether a warning should be (re-)emitted for an instance, given
//! the persisted alert counter, a minimum re-notification interval, and a
//! maximum alert cap. On a true decision the caller sends the notification,
//! then increments the counter and records `lastNotification` in one patch.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use warden_api::Instance;
use warden_store::{alert_count, last_notification, StateError, StateResult};

/// Escalation policy parameters shared by all instances
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    /// Global switch for warning notifications
    pub enabled: bool,

    /// Minimum interval between repeated warnings for one instance
    pub interval: Duration,

    /// Requeue margin; widens the warning window so the last rung of the
    /// ladder is not scheduled right on the deadline
    pub margin: Duration,
}

impl EscalationPolicy {
    /// Whether a warning should be emitted now.
    ///
    /// Fails with a state fault when the alert counter or the stored
    /// notification timestamp cannot be parsed; the engine self-heals the
    /// counter and surfaces timestamp faults.
    pub fn should_notify(
        &self,
        instance: &Instance,
        effective_max_alerts: u32,
        now: DateTime<Utc>,
    ) -> StateResult<bool> {
        if !self.enabled || !instance.running {
            return Ok(false);
        }

        let count = alert_count(instance)?;

        // First warning always fires once bootstrapped
        let Some(last) = last_notification(instance)? else {
            return Ok(true);
        };

        if count >= effective_max_alerts {
            return Ok(false);
        }

        let interval = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);
        Ok(now.signed_duration_since(last) >= interval)
    }

    /// Width of the pre-deadline window in which the escalation ladder
    /// runs: enough room for every allowed alert at the configured
    /// cadence, plus the margin.
    pub fn warning_window(&self, effective_max_alerts: u32) -> TimeDelta {
        let interval = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);
        let alerts = effective_max_alerts.min(i32::MAX as u32) as i32;
        interval
            .checked_mul(alerts)
            .and_then(|w| w.checked_add(&TimeDelta::from_std(self.margin).unwrap_or_default()))
            .unwrap_or(TimeDelta::MAX)
    }
}
