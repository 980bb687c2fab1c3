//! Audit event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_util::InstanceKey;

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Daemon started
    DaemonStarted,

    /// Daemon stopped
    DaemonStopped,

    /// Timer state created on first evaluation
    StateBootstrapped { instance: InstanceKey },

    /// Stored last-activity moved forward from a fresh signal
    ActivityRefreshed {
        instance: InstanceKey,
        last_activity: DateTime<Utc>,
    },

    /// Alert counter reset (re-activation detected)
    AlertStateReset { instance: InstanceKey },

    /// Warning notification sent
    WarningSent {
        instance: InstanceKey,
        alert_number: u32,
        reason: String,
        remaining_seconds: i64,
    },

    /// Persistent instance stopped
    InstanceStopped {
        instance: InstanceKey,
        reason: String,
    },

    /// Instance deleted
    InstanceDeleted {
        instance: InstanceKey,
        reason: String,
    },

    /// An evaluation pass failed; the scheduler retries
    EvaluationFailed {
        instance: InstanceKey,
        error: String,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: warden_util::now(),
            event,
        }
    }
}
