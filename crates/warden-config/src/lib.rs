//! Configuration for wardend
//!
//! Two concerns live here:
//! - Timeout-policy resolution: parsing the `never | <int>[mhd]` policy
//!   strings templates carry into validated [`TimeoutPolicy`] values
//! - Daemon settings: versioned TOML with validation and clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use warden_util::WardenError;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),

    /// A template policy string does not match `never` or `<int>[mhd]`.
    /// This is a configuration fault on the template, not a per-instance
    /// runtime fault: reconciliation for affected instances fails until
    /// the template is corrected.
    #[error("Invalid policy format: {0:?}")]
    InvalidPolicyFormat(String),
}

impl From<ConfigError> for WardenError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidPolicyFormat(value) => WardenError::InvalidPolicyFormat(value),
            other => WardenError::Internal(other.to_string()),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate daemon settings from a TOML file
pub fn load_settings(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Parse and validate daemon settings from a TOML string
pub fn parse_settings(content: &str) -> ConfigResult<Settings> {
    let raw: RawSettings = toml::from_str(content)?;

    // Check version
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    // Validate
    let errors = validate_settings(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;
