//! Validated timeout policies and daemon settings

use crate::schema::RawSettings;
use crate::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use warden_api::Template;

/// Default minimum interval between repeated warnings (1 hour).
pub const DEFAULT_NOTIFICATION_INTERVAL_SECONDS: u64 = 3600;
/// Default maximum number of warnings before the cap.
pub const DEFAULT_MAX_ALERTS: u32 = 3;
/// Default requeue margin past a deadline.
pub const DEFAULT_MARGIN_SECONDS: u64 = 30;
/// Default scheduler granularity.
pub const DEFAULT_RECONCILE_INTERVAL_SECONDS: u64 = 60;
/// Default per-request timeout against the metrics backend.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// The sentinel disabling a timeout dimension for the lifetime of the
/// template reference.
pub const NEVER_TIMEOUT_VALUE: &str = "never";

/// One timeout dimension of a template policy.
///
/// A tagged type rather than a magic duration value, so disabled dimensions
/// can never leak into arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// The dimension is permanently disabled.
    Never,
    /// The dimension expires this long after its anchor timestamp.
    After(Duration),
}

impl TimeoutPolicy {
    /// Parse a policy string matching `^(never|[0-9]+[mhd])$`.
    ///
    /// Anything else is a configuration fault and fails with
    /// `InvalidPolicyFormat`; it is never silently defaulted.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        if input == NEVER_TIMEOUT_VALUE {
            return Ok(Self::Never);
        }

        let Some(unit) = input.chars().last() else {
            return Err(ConfigError::InvalidPolicyFormat(input.to_string()));
        };

        let digits = &input[..input.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidPolicyFormat(input.to_string()));
        }

        let value: u64 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidPolicyFormat(input.to_string()))?;

        let seconds = match unit {
            'm' => value.checked_mul(60),
            'h' => value.checked_mul(3600),
            'd' => value.checked_mul(86400),
            _ => return Err(ConfigError::InvalidPolicyFormat(input.to_string())),
        };

        match seconds {
            Some(secs) => Ok(Self::After(Duration::from_secs(secs))),
            None => Err(ConfigError::InvalidPolicyFormat(input.to_string())),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

/// The effective timeout policy for an instance, resolved from its template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePolicy {
    /// Absolute expiry: duration from creation after which the instance
    /// must be terminated regardless of use.
    pub max_lifetime: TimeoutPolicy,

    /// Inactivity timeout: duration of no observed access after which the
    /// instance must be terminated.
    pub inactivity_timeout: TimeoutPolicy,

    /// Effective maximum warning count: the template override when present
    /// and parseable, else the configured default.
    pub max_alerts: u32,
}

impl InstancePolicy {
    /// Resolve the effective policy for instances of `template`.
    pub fn resolve(template: &Template, default_max_alerts: u32) -> Result<Self, ConfigError> {
        let max_lifetime = TimeoutPolicy::parse(&template.delete_after)?;
        let inactivity_timeout = TimeoutPolicy::parse(&template.inactivity_timeout)?;

        // The override is advisory: a malformed value falls back to the
        // default, unlike the policy strings above.
        let max_alerts = match template.max_alerts_override() {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => n,
                Err(_) => {
                    warn!(
                        template = %template.name,
                        value = %raw,
                        "Unparseable maxAlerts override, using default"
                    );
                    default_max_alerts
                }
            },
            None => default_max_alerts,
        };

        Ok(Self {
            max_lifetime,
            inactivity_timeout,
            max_alerts,
        })
    }

    /// Whether both dimensions are disabled, i.e. the instance is not
    /// managed by the lifecycle engine at all.
    pub fn is_unmanaged(&self) -> bool {
        self.max_lifetime.is_never() && self.inactivity_timeout.is_never()
    }
}

/// Validated daemon settings ready for use by wiring code
#[derive(Debug, Clone)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub notifications: NotificationSettings,
    pub activity: ActivitySettings,
}

#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub data_dir: PathBuf,
    pub reconcile_interval: Duration,
    pub margin: Duration,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub max_alerts: u32,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActivitySettings {
    pub base_url: String,
    pub request_timeout: Duration,
    pub channels: Vec<String>,
}

impl Settings {
    /// Convert from raw settings (after validation)
    pub fn from_raw(raw: RawSettings) -> Self {
        Self {
            daemon: DaemonSettings {
                data_dir: raw
                    .daemon
                    .data_dir
                    .unwrap_or_else(|| PathBuf::from("/var/lib/wardend")),
                reconcile_interval: Duration::from_secs(
                    raw.daemon
                        .reconcile_interval_seconds
                        .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECONDS),
                ),
                margin: Duration::from_secs(
                    raw.daemon.margin_seconds.unwrap_or(DEFAULT_MARGIN_SECONDS),
                ),
            },
            notifications: NotificationSettings {
                enabled: raw.notifications.enabled,
                interval: Duration::from_secs(
                    raw.notifications
                        .interval_seconds
                        .unwrap_or(DEFAULT_NOTIFICATION_INTERVAL_SECONDS),
                ),
                max_alerts: raw.notifications.max_alerts.unwrap_or(DEFAULT_MAX_ALERTS),
                webhook_url: raw.notifications.webhook_url,
            },
            activity: ActivitySettings {
                base_url: raw.activity.base_url,
                request_timeout: Duration::from_secs(
                    raw.activity
                        .request_timeout_seconds
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
                ),
                channels: raw.activity.channels.unwrap_or_else(default_channels),
            },
        }
    }
}

fn default_channels() -> Vec<String> {
    vec!["desktop".into(), "ssh".into(), "webssh".into()]
}
