//! Termination executor
//!
//! Stops persistent instances that went inactive; deletes everything else.
//! Persistence affects the underlying storage disposition, not whether the
//! engine acts: an exhausted absolute lifetime deletes the instance either
//! way.

use std::fmt;
use std::sync::Arc;
use tracing::info;
use warden_api::Instance;
use warden_store::{
    reset_alert_patch, running_observed_patch, AuditEvent, AuditEventType, Store,
};
use warden_util::Result;

/// Which policy dimension triggered termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Absolute maximum lifetime exceeded
    Expired,
    /// Inactivity timeout exceeded
    Inactive,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Expired => write!(f, "expired"),
            TerminationReason::Inactive => write!(f, "inactive"),
        }
    }
}

/// What the executor did to the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationAction {
    /// Persistent instance stopped; storage retained
    Stopped,
    /// Instance resource deleted
    Deleted,
}

/// Stops or deletes instances and clears their timer state
pub struct TerminationExecutor {
    store: Arc<dyn Store>,
}

impl TerminationExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Terminate the instance.
    ///
    /// Store failures are returned unmodified for the scheduler to retry;
    /// a failed termination must not be forgotten.
    pub fn terminate(
        &self,
        instance: &Instance,
        reason: TerminationReason,
    ) -> Result<TerminationAction> {
        if instance.persistent && reason == TerminationReason::Inactive {
            info!(instance = %instance.key, %reason, "Stopping persistent instance");

            // Clear the escalation state so a later restart begins a
            // fresh cycle, in the same atomic write as the stop.
            let patch = reset_alert_patch().merge(running_observed_patch(false));
            self.store
                .stop_instance(&instance.key, instance.revision, &patch)?;

            let _ = self.store.append_audit(AuditEvent::new(
                AuditEventType::InstanceStopped {
                    instance: instance.key.clone(),
                    reason: reason.to_string(),
                },
            ));

            return Ok(TerminationAction::Stopped);
        }

        info!(instance = %instance.key, %reason, "Deleting instance");
        self.store.delete_instance(&instance.key)?;

        let _ = self.store.append_audit(AuditEvent::new(
            AuditEventType::InstanceDeleted {
                instance: instance.key.clone(),
                reason: reason.to_string(),
            },
        ));

        Ok(TerminationAction::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use warden_api::{ALERT_COUNT_KEY, LAST_NOTIFICATION_KEY, LAST_RUNNING_KEY};
    use warden_store::SqliteStore;
    use warden_util::{InstanceKey, TenantId};

    fn seed_instance(store: &dyn Store, persistent: bool) -> Instance {
        let instance = Instance {
            key: InstanceKey::new("ns", "inst"),
            revision: 0,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            running: true,
            persistent,
            tenant: TenantId::new("alice"),
            tenant_email: "alice@example.com".into(),
            template: "netlab".into(),
            pretty_name: "Network Lab".into(),
            metadata: [
                (ALERT_COUNT_KEY.to_string(), "3".to_string()),
                (
                    LAST_NOTIFICATION_KEY.to_string(),
                    "2026-03-01T11:00:00Z".to_string(),
                ),
            ]
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
        };
        store.create_instance(&instance).unwrap()
    }

    #[test]
    fn persistent_inactive_is_stopped_with_state_cleared() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let instance = seed_instance(store.as_ref(), true);

        let executor = TerminationExecutor::new(store.clone());
        let action = executor
            .terminate(&instance, TerminationReason::Inactive)
            .unwrap();
        assert_eq!(action, TerminationAction::Stopped);

        let current = store.get_instance(&instance.key).unwrap().unwrap();
        assert!(!current.running);
        assert_eq!(current.metadata_value(ALERT_COUNT_KEY), Some("0"));
        assert_eq!(current.metadata_value(LAST_RUNNING_KEY), Some("false"));
        assert!(current.metadata_value(LAST_NOTIFICATION_KEY).is_none());
    }

    #[test]
    fn persistent_expired_is_deleted() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let instance = seed_instance(store.as_ref(), true);

        let executor = TerminationExecutor::new(store.clone());
        let action = executor
            .terminate(&instance, TerminationReason::Expired)
            .unwrap();
        assert_eq!(action, TerminationAction::Deleted);
        assert!(store.get_instance(&instance.key).unwrap().is_none());
    }

    #[test]
    fn non_persistent_inactive_is_deleted() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let instance = seed_instance(store.as_ref(), false);

        let executor = TerminationExecutor::new(store.clone());
        let action = executor
            .terminate(&instance, TerminationReason::Inactive)
            .unwrap();
        assert_eq!(action, TerminationAction::Deleted);
        assert!(store.get_instance(&instance.key).unwrap().is_none());
    }

    #[test]
    fn termination_is_audited() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let instance = seed_instance(store.as_ref(), false);

        let executor = TerminationExecutor::new(store.clone());
        executor
            .terminate(&instance, TerminationReason::Expired)
            .unwrap();

        let audits = store.recent_audits(5).unwrap();
        assert!(audits.iter().any(|a| matches!(
            &a.event,
            AuditEventType::InstanceDeleted { reason, .. } if reason == "expired"
        )));
    }
}
