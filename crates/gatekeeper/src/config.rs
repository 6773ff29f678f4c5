//! Gatekeeper configuration.
//!
//! Configuration is loaded from environment variables. Policy instances are
//! read from the JSON file named by `GATEKEEPER_POLICY_FILE`. The shared token
//! secret is redacted in Debug output.

use crate::policy::PolicyConfig;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{secret_or_empty, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default trusted token name, used as cookie, query and token lookup key.
pub const DEFAULT_TOKEN_NAME: &str = "access_token";

/// Token defaults resolved from the environment during provisioning.
///
/// Policies that configure no trusted token, or a trusted token without a
/// secret, fall back to these values.
#[derive(Clone)]
pub struct TokenDefaults {
    /// Token name (`JWT_TOKEN_NAME`, default `access_token`).
    pub token_name: String,

    /// Shared signing secret (`JWT_TOKEN_SECRET`).
    pub token_secret: SecretString,
}

impl fmt::Debug for TokenDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenDefaults")
            .field("token_name", &self.token_name)
            .field("token_secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenDefaults {
    /// Resolve token defaults from a variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let token_name = vars
            .get("JWT_TOKEN_NAME")
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOKEN_NAME.to_string());

        Self {
            token_name,
            token_secret: secret_or_empty(vars.get("JWT_TOKEN_SECRET").map(String::as_str)),
        }
    }
}

/// Gatekeeper configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Path to the JSON policy file.
    pub policy_file: PathBuf,

    /// Clock skew tolerance for iat validation.
    pub jwt_clock_skew: Duration,

    /// Seconds to keep serving after a shutdown signal (default: 0).
    pub drain_seconds: u64,

    /// Token defaults for provisioning.
    pub token_defaults: TokenDefaults,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid drain configuration: {0}")]
    InvalidDrainSeconds(String),

    #[error("Failed to read policy file {path}: {reason}")]
    PolicyFileUnreadable { path: String, reason: String },

    #[error("Invalid policy file {path}: {reason}")]
    InvalidPolicyFile { path: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let policy_file = vars
            .get("GATEKEEPER_POLICY_FILE")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("GATEKEEPER_POLICY_FILE".to_string()))?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let drain_seconds = match vars.get("GATEKEEPER_DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainSeconds(format!(
                    "GATEKEEPER_DRAIN_SECONDS must be a non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => 0,
        };

        Ok(Config {
            bind_address,
            policy_file,
            jwt_clock_skew,
            drain_seconds,
            token_defaults: TokenDefaults::from_vars(vars),
        })
    }
}

/// Read policy instances from a JSON file containing an array of policies.
pub fn load_policies(path: &Path) -> Result<Vec<PolicyConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::PolicyFileUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    parse_policies(&raw).map_err(|reason| ConfigError::InvalidPolicyFile {
        path: path.display().to_string(),
        reason,
    })
}

/// Parse policy instances from JSON text.
pub fn parse_policies(raw: &str) -> Result<Vec<PolicyConfig>, String> {
    serde_json::from_str(raw).map_err(|e| e.to_string())
}
