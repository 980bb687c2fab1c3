//! Typed accessors over the per-instance timer state
//!
//! The metadata entries named in `warden_api::keys` emulate timers in a
//! stateless reconciliation model. Everything here is a pure function over
//! an `Instance` (or a raw value) producing either a typed value or a
//! `MetadataPatch` for the store to apply atomically.

use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_api::{
    Instance, ALERT_COUNT_KEY, LAST_ACTIVITY_KEY, LAST_NOTIFICATION_KEY, LAST_RUNNING_KEY,
};
use warden_util::{format_rfc3339, parse_rfc3339, WardenError};

use crate::MetadataPatch;

/// State faults on timer metadata
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// The field is absent; the caller is expected to have bootstrapped.
    #[error("Missing state field: {0}")]
    Missing(&'static str),

    /// The field is present but not parseable in its documented format.
    /// An unparseable value is a fault, not a silent reset.
    #[error("Malformed state field {field}: {value:?}")]
    Malformed { field: &'static str, value: String },
}

impl StateError {
    fn malformed(field: &'static str, value: &str) -> Self {
        Self::Malformed {
            field,
            value: value.to_string(),
        }
    }
}

impl From<StateError> for WardenError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::Missing(field) => WardenError::MissingState(field.to_string()),
            StateError::Malformed { field, value } => WardenError::malformed_state(field, value),
        }
    }
}

pub type StateResult<T> = Result<T, StateError>;

/// Compute the bootstrap patch for an instance, if any field is missing.
///
/// Sets `alertCount = "0"`, `lastActivity = now` and `lastRunning` to the
/// current running flag, each only when absent; `lastNotification` stays
/// absent until the first warning. Returns `None` when the instance is
/// already bootstrapped, making a second call a no-op.
pub fn bootstrap_patch(instance: &Instance, now: DateTime<Utc>) -> Option<MetadataPatch> {
    let mut patch = MetadataPatch::new();

    if instance.metadata_value(ALERT_COUNT_KEY).is_none() {
        patch = patch.set(ALERT_COUNT_KEY, "0");
    }
    if instance.metadata_value(LAST_ACTIVITY_KEY).is_none() {
        patch = patch.set(LAST_ACTIVITY_KEY, format_rfc3339(now));
    }
    if instance.metadata_value(LAST_RUNNING_KEY).is_none() {
        patch = patch.set(LAST_RUNNING_KEY, instance.running.to_string());
    }

    if patch.is_empty() { None } else { Some(patch) }
}

/// Stored last-observed-activity timestamp.
pub fn last_activity(instance: &Instance) -> StateResult<DateTime<Utc>> {
    let raw = instance
        .metadata_value(LAST_ACTIVITY_KEY)
        .ok_or(StateError::Missing(LAST_ACTIVITY_KEY))?;
    parse_rfc3339(raw).map_err(|_| StateError::malformed(LAST_ACTIVITY_KEY, raw))
}

/// Stored last-notification timestamp; `Ok(None)` until the first warning.
pub fn last_notification(instance: &Instance) -> StateResult<Option<DateTime<Utc>>> {
    match instance.metadata_value(LAST_NOTIFICATION_KEY) {
        None => Ok(None),
        Some(raw) => parse_rfc3339(raw)
            .map(Some)
            .map_err(|_| StateError::malformed(LAST_NOTIFICATION_KEY, raw)),
    }
}

/// Stored alert counter.
pub fn alert_count(instance: &Instance) -> StateResult<u32> {
    let raw = instance
        .metadata_value(ALERT_COUNT_KEY)
        .ok_or(StateError::Missing(ALERT_COUNT_KEY))?;
    raw.parse::<u32>()
        .map_err(|_| StateError::malformed(ALERT_COUNT_KEY, raw))
}

/// Running flag observed on the previous pass. Absent or unparseable
/// values read as `None`: the transition detector then just records the
/// current flag without firing.
pub fn last_running(instance: &Instance) -> Option<bool> {
    instance
        .metadata_value(LAST_RUNNING_KEY)
        .and_then(|raw| raw.parse::<bool>().ok())
}

/// Increment the alert counter value by one, as a decimal string.
///
/// `"3"` becomes `"4"`. A malformed current value fails with `Malformed`;
/// the counter is an anti-spam safeguard rather than a safety-critical
/// value, so the caller recovers by writing `"0"` instead of aborting the
/// pass.
pub fn increment_alert_count(current: &str) -> StateResult<String> {
    let count: u32 = current
        .parse()
        .map_err(|_| StateError::malformed(ALERT_COUNT_KEY, current))?;
    Ok((count + 1).to_string())
}

/// Patch clearing the alert state: counter back to `"0"`,
/// `lastNotification` removed.
pub fn reset_alert_patch() -> MetadataPatch {
    MetadataPatch::new()
        .set(ALERT_COUNT_KEY, "0")
        .remove(LAST_NOTIFICATION_KEY)
}

/// Patch recording a fresh activity observation. Re-activation detection:
/// new activity also clears the alert state so the escalation ladder
/// restarts from zero.
pub fn activity_refresh_patch(observed: DateTime<Utc>) -> MetadataPatch {
    MetadataPatch::new()
        .set(LAST_ACTIVITY_KEY, format_rfc3339(observed))
        .merge(reset_alert_patch())
}

/// Patch recording that a warning was sent just now.
pub fn notification_sent_patch(next_count: &str, now: DateTime<Utc>) -> MetadataPatch {
    MetadataPatch::new()
        .set(ALERT_COUNT_KEY, next_count)
        .set(LAST_NOTIFICATION_KEY, format_rfc3339(now))
}

/// Patch recording the currently observed running flag.
pub fn running_observed_patch(running: bool) -> MetadataPatch {
    MetadataPatch::new().set(LAST_RUNNING_KEY, running.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use warden_util::{InstanceKey, TenantId};

    fn make_instance(metadata: &[(&str, &str)]) -> Instance {
        Instance {
            key: InstanceKey::new("ns", "inst"),
            revision: 1,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            running: true,
            persistent: false,
            tenant: TenantId::new("alice"),
            tenant_email: "alice@example.com".into(),
            template: "netlab".into(),
            pretty_name: "Network Lab".into(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn bootstrap_sets_missing_fields_only() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let instance = make_instance(&[(LAST_ACTIVITY_KEY, "2026-03-01T10:00:00Z")]);

        let patch = bootstrap_patch(&instance, now).unwrap();
        let mut metadata = instance.metadata.clone();
        patch.apply_to(&mut metadata);

        // Pre-existing activity untouched, counter and running flag added
        assert_eq!(
            metadata.get(LAST_ACTIVITY_KEY).map(String::as_str),
            Some("2026-03-01T10:00:00Z")
        );
        assert_eq!(metadata.get(ALERT_COUNT_KEY).map(String::as_str), Some("0"));
        assert_eq!(metadata.get(LAST_RUNNING_KEY).map(String::as_str), Some("true"));
        assert!(!metadata.contains_key(LAST_NOTIFICATION_KEY));
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut instance = make_instance(&[]);

        let patch = bootstrap_patch(&instance, now).unwrap();
        patch.apply_to(&mut instance.metadata);

        // A second call on an already-bootstrapped instance is a no-op
        assert!(bootstrap_patch(&instance, now).is_none());
    }

    #[test]
    fn last_activity_missing_vs_malformed() {
        let instance = make_instance(&[]);
        assert_eq!(
            last_activity(&instance),
            Err(StateError::Missing(LAST_ACTIVITY_KEY))
        );

        let instance = make_instance(&[(LAST_ACTIVITY_KEY, "yesterday-ish")]);
        assert!(matches!(
            last_activity(&instance),
            Err(StateError::Malformed { field, .. }) if field == LAST_ACTIVITY_KEY
        ));

        let instance = make_instance(&[(LAST_ACTIVITY_KEY, "2026-03-01T10:00:00Z")]);
        assert_eq!(
            last_activity(&instance).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn last_notification_absent_is_ok() {
        let instance = make_instance(&[]);
        assert_eq!(last_notification(&instance), Ok(None));

        let instance = make_instance(&[(LAST_NOTIFICATION_KEY, "not-a-time")]);
        assert!(last_notification(&instance).is_err());
    }

    #[test]
    fn increment_parses_and_adds_one() {
        assert_eq!(increment_alert_count("3").unwrap(), "4");
        assert_eq!(increment_alert_count("0").unwrap(), "1");
    }

    #[test]
    fn increment_fails_on_garbage_and_caller_recovers_to_zero() {
        let result = increment_alert_count("abc");
        assert!(matches!(
            result,
            Err(StateError::Malformed { field, .. }) if field == ALERT_COUNT_KEY
        ));

        // The documented recovery: reset to a sane value
        let recovered = increment_alert_count("abc").unwrap_or_else(|_| "0".to_string());
        assert_eq!(recovered, "0");

        // Negative counts are not valid non-negative integers
        assert!(increment_alert_count("-1").is_err());
    }

    #[test]
    fn reset_clears_counter_and_notification() {
        let mut metadata = BTreeMap::new();
        metadata.insert(ALERT_COUNT_KEY.to_string(), "2".to_string());
        metadata.insert(
            LAST_NOTIFICATION_KEY.to_string(),
            "2026-03-01T10:00:00Z".to_string(),
        );

        reset_alert_patch().apply_to(&mut metadata);

        assert_eq!(metadata.get(ALERT_COUNT_KEY).map(String::as_str), Some("0"));
        assert!(!metadata.contains_key(LAST_NOTIFICATION_KEY));
    }

    #[test]
    fn activity_refresh_restarts_escalation() {
        let observed = Utc.with_ymd_and_hms(2026, 3, 1, 11, 30, 0).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert(ALERT_COUNT_KEY.to_string(), "2".to_string());
        metadata.insert(
            LAST_NOTIFICATION_KEY.to_string(),
            "2026-03-01T10:00:00Z".to_string(),
        );

        activity_refresh_patch(observed).apply_to(&mut metadata);

        assert_eq!(
            metadata.get(LAST_ACTIVITY_KEY).map(String::as_str),
            Some("2026-03-01T11:30:00Z")
        );
        assert_eq!(metadata.get(ALERT_COUNT_KEY).map(String::as_str), Some("0"));
        assert!(!metadata.contains_key(LAST_NOTIFICATION_KEY));
    }
}
