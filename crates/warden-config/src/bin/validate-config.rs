//! Settings validation CLI tool
//!
//! Validates a wardend settings file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage: validate-config <config-file>");
            eprintln!();
            eprintln!("Validates a wardend settings file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config /etc/wardend/config.toml");
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    // Check file exists
    if !config_path.exists() {
        eprintln!(
            "Error: Settings file not found: {}",
            config_path.display()
        );
        return ExitCode::from(1);
    }

    // Try to load and validate
    match warden_config::load_settings(&config_path) {
        Ok(settings) => {
            println!("✓ Settings are valid");
            println!();
            println!("Summary:");
            println!(
                "  Config version: {}",
                warden_config::CURRENT_CONFIG_VERSION
            );
            println!(
                "  Reconcile interval: {}s",
                settings.daemon.reconcile_interval.as_secs()
            );
            println!(
                "  Notifications: {}",
                if settings.notifications.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!(
                "  Notification interval: {}s, max alerts: {}",
                settings.notifications.interval.as_secs(),
                settings.notifications.max_alerts
            );
            println!("  Activity backend: {}", settings.activity.base_url);
            println!(
                "  Activity channels: {}",
                settings.activity.channels.join(", ")
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Settings validation failed");
            eprintln!();
            match &e {
                warden_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                warden_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                warden_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                warden_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        warden_config::CURRENT_CONFIG_VERSION
                    );
                }
                warden_config::ConfigError::InvalidPolicyFormat(value) => {
                    eprintln!("Invalid policy format: {value:?}");
                }
            }
            ExitCode::from(1)
        }
    }
}
