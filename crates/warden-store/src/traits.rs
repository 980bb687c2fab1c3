//! Store trait definitions

use std::collections::BTreeMap;
use warden_api::{Instance, Template};
use warden_util::InstanceKey;

use crate::{AuditEvent, StoreResult};

/// A set of metadata changes applied as one atomic write.
///
/// The engine never issues multi-field sequences of independent writes:
/// either the whole patch lands or none of it does, so a cancelled or
/// failed pass cannot leave timer state half-updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPatch {
    set: BTreeMap<String, String>,
    remove: Vec<String>,
}

impl MetadataPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    /// Merge another patch into this one; later sets win.
    pub fn merge(mut self, other: MetadataPatch) -> Self {
        self.set.extend(other.set);
        self.remove.extend(other.remove);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    pub fn sets(&self) -> impl Iterator<Item = (&str, &str)> {
        self.set.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply to a metadata map: removals first, then sets.
    pub fn apply_to(&self, metadata: &mut BTreeMap<String, String>) {
        for key in &self.remove {
            metadata.remove(key);
        }
        for (key, value) in &self.set {
            metadata.insert(key.clone(), value.clone());
        }
    }
}

/// Main store trait: the object-store boundary injected into the engine.
///
/// Writes that mutate an instance take the revision the caller read; the
/// store rejects the write with `Conflict` if the row has moved on. The
/// engine treats a conflict as retryable and re-reads on the next pass
/// rather than overwriting concurrent changes.
pub trait Store: Send + Sync {
    // Instances

    fn get_instance(&self, key: &InstanceKey) -> StoreResult<Option<Instance>>;

    fn list_instances(&self) -> StoreResult<Vec<Instance>>;

    /// Insert a new instance at revision 1. Provisioning-side operation;
    /// fails if the key already exists.
    fn create_instance(&self, instance: &Instance) -> StoreResult<Instance>;

    /// Apply a metadata patch as a single atomic write.
    fn patch_metadata(
        &self,
        key: &InstanceKey,
        expected_revision: u64,
        patch: &MetadataPatch,
    ) -> StoreResult<Instance>;

    /// Set `running = false` and apply the patch, atomically.
    fn stop_instance(
        &self,
        key: &InstanceKey,
        expected_revision: u64,
        patch: &MetadataPatch,
    ) -> StoreResult<Instance>;

    /// Delete an instance. Idempotent: deleting a missing instance is Ok.
    fn delete_instance(&self, key: &InstanceKey) -> StoreResult<()>;

    // Templates

    fn get_template(&self, name: &str) -> StoreResult<Option<Template>>;

    fn put_template(&self, template: &Template) -> StoreResult<()>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
