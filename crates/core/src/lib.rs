//! Core of storehouse, a page-cache connector for bucketed key/value stores.
//!
//! This crate provides:
//! - Cache connection with index-tracked timestamps and expiry sweeps
//! - Store client capability with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod store;

pub use cache::{CacheConnection, CacheEntry, SweepReport};
pub use config::AppConfig;
pub use error::Error;
