//! Activity source trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_api::Instance;
use warden_util::WardenError;

/// Errors from activity source operations
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("All activity channels failed: {0}")]
    AllChannelsFailed(String),
}

impl From<reqwest::Error> for ActivityError {
    fn from(e: reqwest::Error) -> Self {
        ActivityError::Request(e.to_string())
    }
}

impl From<ActivityError> for WardenError {
    fn from(e: ActivityError) -> Self {
        WardenError::SignalUnavailable(e.to_string())
    }
}

pub type ActivityResult<T> = Result<T, ActivityError>;

/// Activity source trait - implemented by the metrics backend client and
/// by test fakes.
///
/// The provider internally takes the most recent timestamp across its
/// configured access channels; the engine only sees "most recent known
/// activity, or an error if unavailable".
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Whether the backend is reachable and producing usable data.
    ///
    /// When this returns false the engine must not treat the absence of
    /// fresh data as inactivity; the inactivity dimension is skipped for
    /// the pass.
    async fn is_healthy(&self) -> bool;

    /// Most recent observed activity for the instance across all
    /// channels. `Ok(None)` means no activity was observed in the query
    /// window: strictly "nothing newer", never "inactive since forever".
    async fn last_activity(
        &self,
        instance: &Instance,
    ) -> ActivityResult<Option<DateTime<Utc>>>;
}
