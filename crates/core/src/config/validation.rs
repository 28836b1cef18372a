//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.
//! Store client options are not inspected; the client validates its own.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `bucket` is empty or contains `/`
    /// or whitespace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::Invalid { field: "bucket".into(), reason: "must not be empty".into() });
        }
        if self.bucket.contains('/') || self.bucket.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "bucket".into(),
                reason: "must not contain '/' or whitespace".into(),
            });
        }

        if self.client.is_empty() {
            tracing::debug!("no store client options set; client defaults apply");
        }

        Ok(())
    }
}
