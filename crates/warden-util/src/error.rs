//! Error types for wardend

use thiserror::Error;

/// Core error type for warden lifecycle operations
#[derive(Debug, Error)]
pub enum WardenError {
    /// A template policy string does not match `never` or `<int>[mhd]`.
    /// Configuration fault: surfaced, never silently defaulted.
    #[error("Invalid policy format: {0:?}")]
    InvalidPolicyFormat(String),

    /// A timer-state field is absent where the caller expected it.
    /// Resolved by bootstrapping.
    #[error("Missing state field: {0}")]
    MissingState(String),

    /// A timer-state field is present but not parseable in its documented
    /// format. A malformed timestamp is surfaced; a malformed alert counter
    /// is recovered by the caller.
    #[error("Malformed state field {field}: {value:?}")]
    MalformedState { field: String, value: String },

    /// The activity-signal backend is unhealthy or erroring. The inactivity
    /// dimension is skipped for the pass; never interpreted as inactivity.
    #[error("Activity signal unavailable: {0}")]
    SignalUnavailable(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// A write was rejected because the resource changed since it was read.
    /// Retryable: the next pass re-reads and re-evaluates.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Notification error: {0}")]
    NotifyError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    pub fn malformed_state(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedState {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn signal(msg: impl Into<String>) -> Self {
        Self::SignalUnavailable(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the scheduler should retry the pass without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_)
                | Self::StoreError(_)
                | Self::SignalUnavailable(_)
                | Self::NotifyError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
