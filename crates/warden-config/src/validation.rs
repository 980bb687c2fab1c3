//! Settings validation

use crate::schema::RawSettings;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("notifications.interval_seconds must be greater than zero")]
    ZeroNotificationInterval,

    #[error("notifications.max_alerts must be greater than zero")]
    ZeroMaxAlerts,

    #[error("daemon.reconcile_interval_seconds must be greater than zero")]
    ZeroReconcileInterval,

    #[error("daemon.margin_seconds ({margin}) must be smaller than notifications.interval_seconds ({interval})")]
    MarginExceedsInterval { margin: u64, interval: u64 },

    #[error("activity.base_url cannot be empty")]
    EmptyActivityUrl,

    #[error("activity.channels cannot be empty")]
    EmptyChannelList,

    #[error("activity.request_timeout_seconds must be greater than zero")]
    ZeroRequestTimeout,

    #[error("notifications.webhook_url must be an http(s) URL, got {0:?}")]
    InvalidWebhookUrl(String),
}

/// Validate raw settings
pub fn validate_settings(raw: &RawSettings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let interval = raw.notifications.interval_seconds.unwrap_or(crate::DEFAULT_NOTIFICATION_INTERVAL_SECONDS);
    if interval == 0 {
        errors.push(ValidationError::ZeroNotificationInterval);
    }

    if raw.notifications.max_alerts == Some(0) {
        errors.push(ValidationError::ZeroMaxAlerts);
    }

    if raw.daemon.reconcile_interval_seconds == Some(0) {
        errors.push(ValidationError::ZeroReconcileInterval);
    }

    let margin = raw.daemon.margin_seconds.unwrap_or(crate::DEFAULT_MARGIN_SECONDS);
    if interval > 0 && margin >= interval {
        errors.push(ValidationError::MarginExceedsInterval { margin, interval });
    }

    if raw.activity.base_url.trim().is_empty() {
        errors.push(ValidationError::EmptyActivityUrl);
    }

    if let Some(channels) = &raw.activity.channels
        && channels.is_empty()
    {
        errors.push(ValidationError::EmptyChannelList);
    }

    if raw.activity.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if let Some(url) = &raw.notifications.webhook_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidWebhookUrl(url.clone()));
    }

    errors
}
