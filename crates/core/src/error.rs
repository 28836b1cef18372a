//! Unified error types for storehouse.

use crate::config::ConfigError;
use crate::store::StoreError;

/// Unified error type for cache operations.
///
/// Cache misses are not errors: they surface as empty entries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a non-object payload).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The store client failed. Never retried at this layer.
    #[error("STORE_ERROR: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded or is invalid.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),
}
