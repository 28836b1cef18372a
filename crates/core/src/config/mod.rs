//! Connection configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (STOREHOUSE_*)
//! 2. TOML config file (if STOREHOUSE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Only the bucket name is interpreted here. Every other key is kept verbatim
//! and handed to the store client as its own connection options.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::DEFAULT_BUCKET;

mod validation;

pub use validation::ConfigError;

/// Connection configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (STOREHOUSE_*)
/// 2. TOML config file (if STOREHOUSE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bucket holding the cache entries.
    ///
    /// Set via STOREHOUSE_BUCKET environment variable.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Store client options, passed through untouched.
    ///
    /// For the bundled SQLite client: `path` (STOREHOUSE_PATH).
    #[serde(flatten)]
    pub client: Map<String, Value>,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { bucket: default_bucket(), client: Map::new() }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `STOREHOUSE_`
    /// 2. TOML file from `STOREHOUSE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STOREHOUSE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STOREHOUSE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(&figment)
    }

    /// Extract and validate configuration from a prepared figment.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
