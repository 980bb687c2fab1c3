//! Notifier seam
//!
//! Delivery is an external collaborator: the engine only decides *when* a
//! notification is due and records the rate-limiting state. Implementations
//! here are a JSON webhook poster and a log-only fallback; tests use the
//! recording mock.

use async_trait::async_trait;
use chrono::TimeDelta;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use warden_api::Instance;
use warden_util::{format_remaining, InstanceKey, TenantId, WardenError};

use crate::{TerminationAction, TerminationReason};

/// Errors from notification delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Webhook returned status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Request(e.to_string())
    }
}

impl From<NotifyError> for WardenError {
    fn from(e: NotifyError) -> Self {
        WardenError::NotifyError(e.to_string())
    }
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// What a notification is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// The instance is approaching termination
    Warning {
        reason: TerminationReason,
        remaining: TimeDelta,
        alerts_remaining: u32,
    },

    /// The instance was terminated
    Terminated {
        reason: TerminationReason,
        action: TerminationAction,
    },
}

/// A notification addressed to the instance's owner
#[derive(Debug, Clone)]
pub struct Notification {
    pub instance: InstanceKey,
    pub pretty_name: String,
    pub tenant: TenantId,
    pub tenant_email: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(instance: &Instance, kind: NotificationKind) -> Self {
        Self {
            instance: instance.key.clone(),
            pretty_name: instance.pretty_name.clone(),
            tenant: instance.tenant.clone(),
            tenant_email: instance.tenant_email.clone(),
            kind,
        }
    }
}

/// Notifier trait - implemented by delivery backends
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> NotifyResult<()>;
}

/// Posts notifications as JSON to a webhook endpoint
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn payload(notification: &Notification) -> serde_json::Value {
        let common = serde_json::json!({
            "instance": notification.instance.to_string(),
            "pretty_name": notification.pretty_name,
            "tenant": notification.tenant.to_string(),
            "email": notification.tenant_email,
        });

        let mut payload = common;
        match &notification.kind {
            NotificationKind::Warning {
                reason,
                remaining,
                alerts_remaining,
            } => {
                payload["event"] = "warning".into();
                payload["reason"] = reason.to_string().into();
                payload["remaining_seconds"] = remaining.num_seconds().into();
                payload["remaining"] = format_remaining(*remaining).into();
                payload["alerts_remaining"] = (*alerts_remaining).into();
            }
            NotificationKind::Terminated { reason, action } => {
                payload["event"] = "terminated".into();
                payload["reason"] = reason.to_string().into();
                payload["action"] = match action {
                    TerminationAction::Stopped => "stopped",
                    TerminationAction::Deleted => "deleted",
                }
                .into();
            }
        }
        payload
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(notification))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }

        info!(
            instance = %notification.instance,
            email = %notification.tenant_email,
            "Notification delivered"
        );
        Ok(())
    }
}

/// Logs notifications without delivering them anywhere.
/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult<()> {
        match &notification.kind {
            NotificationKind::Warning {
                reason,
                remaining,
                alerts_remaining,
            } => info!(
                instance = %notification.instance,
                email = %notification.tenant_email,
                %reason,
                remaining = %format_remaining(*remaining),
                alerts_remaining,
                "Warning notification (log only)"
            ),
            NotificationKind::Terminated { reason, action } => info!(
                instance = %notification.instance,
                email = %notification.tenant_email,
                %reason,
                ?action,
                "Termination notification (log only)"
            ),
        }
        Ok(())
    }
}

/// Records notifications for assertions in tests
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(NotifyError::Request("mock delivery failure".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
