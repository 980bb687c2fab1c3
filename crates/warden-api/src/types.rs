//! Instance and template resource types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warden_util::{InstanceKey, TenantId};

/// A provisioned ephemeral environment subject to lifecycle policy.
///
/// The engine mutates an instance only through its timer-state metadata,
/// its running flag, and deletion; everything else is owned by provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub key: InstanceKey,

    /// Store-maintained revision; bumped on every successful write.
    /// Writes carrying a stale revision are rejected (optimistic concurrency).
    pub revision: u64,

    /// Creation timestamp; anchor for absolute-lifetime evaluation.
    pub created_at: DateTime<Utc>,

    /// Whether the environment is currently running.
    pub running: bool,

    /// Whether the underlying storage survives a stop.
    pub persistent: bool,

    /// Owning tenant and their notification address.
    pub tenant: TenantId,
    pub tenant_email: String,

    /// Name of the template this instance was created from.
    pub template: String,

    /// Human-readable name used in notifications.
    pub pretty_name: String,

    /// Durable key-value metadata; home of the timer state.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Instance {
    /// Look up a metadata value by key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Whether all three timer-state fields that bootstrap establishes
    /// are present. `lastNotification` is legitimately absent until the
    /// first warning, so it is not part of this check.
    pub fn is_bootstrapped(&self) -> bool {
        self.metadata.contains_key(crate::ALERT_COUNT_KEY)
            && self.metadata.contains_key(crate::LAST_ACTIVITY_KEY)
            && self.metadata.contains_key(crate::LAST_RUNNING_KEY)
    }
}

/// The policy source for a class of instances.
///
/// Read-only input from the engine's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub pretty_name: String,

    /// Max-lifetime policy string: `never` or `<int>[mhd]`.
    pub delete_after: String,

    /// Inactivity-timeout policy string: `never` or `<int>[mhd]`.
    pub inactivity_timeout: String,

    /// Template-level metadata; may carry the `maxAlerts` override.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Template {
    /// Raw `maxAlerts` override value, if set.
    pub fn max_alerts_override(&self) -> Option<&str> {
        self.metadata.get(crate::MAX_ALERTS_KEY).map(String::as_str)
    }
}
