//! Raw settings schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw settings as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSettings {
    /// Config schema version
    pub config_version: u32,

    /// Daemon-level settings
    #[serde(default)]
    pub daemon: RawDaemonSettings,

    /// Warning notification settings
    #[serde(default)]
    pub notifications: RawNotificationSettings,

    /// Activity metrics backend
    pub activity: RawActivitySettings,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonSettings {
    /// Data directory for the store (default: /var/lib/wardend)
    pub data_dir: Option<PathBuf>,

    /// Scheduler granularity: how often due instances are evaluated
    pub reconcile_interval_seconds: Option<u64>,

    /// Margin added past a deadline when computing the next-check hint,
    /// so an instance is not requeued just before its deadline
    pub margin_seconds: Option<u64>,
}

/// Warning notification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawNotificationSettings {
    /// Global switch for warning notifications
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum interval between repeated warnings for one instance
    pub interval_seconds: Option<u64>,

    /// Default maximum number of warnings before the cap (templates may
    /// override via metadata)
    pub max_alerts: Option<u32>,

    /// Webhook endpoint for delivery; warnings are logged only when absent
    pub webhook_url: Option<String>,
}

impl Default for RawNotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: None,
            max_alerts: None,
            webhook_url: None,
        }
    }
}

/// Activity metrics backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawActivitySettings {
    /// Base URL of the metrics service
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout_seconds: Option<u64>,

    /// Access channels to query; the reported activity is the most recent
    /// timestamp across all of them
    pub channels: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_settings() {
        let toml_str = r#"
            config_version = 1

            [daemon]
            data_dir = "/var/lib/wardend"
            reconcile_interval_seconds = 60
            margin_seconds = 30

            [notifications]
            enabled = true
            interval_seconds = 3600
            max_alerts = 3
            webhook_url = "https://hooks.internal/warden"

            [activity]
            base_url = "http://metrics.internal:9090"
            request_timeout_seconds = 10
            channels = ["desktop", "ssh", "webssh"]
        "#;

        let raw: RawSettings = toml::from_str(toml_str).unwrap();
        assert_eq!(raw.config_version, 1);
        assert_eq!(raw.notifications.max_alerts, Some(3));
        assert_eq!(raw.activity.channels.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn notifications_default_enabled() {
        let toml_str = r#"
            config_version = 1

            [activity]
            base_url = "http://metrics.internal:9090"
        "#;

        let raw: RawSettings = toml::from_str(toml_str).unwrap();
        assert!(raw.notifications.enabled);
    }
}
