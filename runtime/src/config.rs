//! Configuration for the data layer.
//!
//! Two knobs, both read from the process environment:
//!
//! - `DATA_LAYER_ENV`: `development` (default), `staging` or `production`.
//!   Configuration warnings are only logged outside production.
//! - `DATA_LAYER_EXPOSE_LEDGER`: whether the ledger diagnostics hook returns
//!   a snapshot. Defaults to on outside production, off in production.
//!
//! # Example
//!
//! ```no_run
//! use datalayer_runtime::config::DataLayerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DataLayerConfig::from_env()?;
//! println!("environment: {}", config.environment);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable selecting the deployment environment.
pub const ENV_VAR: &str = "DATA_LAYER_ENV";

/// Environment variable toggling the ledger diagnostics hook.
pub const EXPOSE_LEDGER_VAR: &str = "DATA_LAYER_EXPOSE_LEDGER";

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Unknown environment name
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// A boolean flag had an unrecognised value
    #[error("Invalid value for {name}: {value}")]
    InvalidFlag {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment (local)
    #[default]
    Development,
    /// Staging environment (pre-production)
    Staging,
    /// Production environment
    Production,
}

impl Environment {
    /// Check if this is production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is development environment
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Data layer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLayerConfig {
    /// Deployment environment
    pub environment: Environment,
    /// Whether [`crate::DataLayer::diagnostics`] returns ledger contents
    pub expose_ledger: bool,
}

impl DataLayerConfig {
    /// Defaults for an environment: ledger exposed everywhere but production.
    #[must_use]
    pub const fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            expose_ledger: !environment.is_production(),
        }
    }

    /// Load from `DATA_LAYER_ENV` and `DATA_LAYER_EXPOSE_LEDGER`.
    ///
    /// # Errors
    ///
    /// Returns error if either variable holds an unrecognised value
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if either variable holds an unrecognised value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup(ENV_VAR)
            .map(|value| value.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        let mut config = Self::for_environment(environment);
        if let Some(value) = lookup(EXPOSE_LEDGER_VAR) {
            config.expose_ledger = parse_flag(EXPOSE_LEDGER_VAR, &value)?;
        }
        Ok(config)
    }

    /// Override the diagnostics flag
    #[must_use]
    pub const fn with_expose_ledger(mut self, expose_ledger: bool) -> Self {
        self.expose_ledger = expose_ledger;
        self
    }

    /// Configuration warnings are logged
    #[must_use]
    pub const fn reports_warnings(&self) -> bool {
        !self.environment.is_production()
    }
}

impl Default for DataLayerConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}
