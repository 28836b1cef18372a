//! Page cache on top of a bucketed key/value store.
//!
//! Entries are JSON objects whose creation and expiration times live in
//! secondary indexes rather than in the stored body. This module provides:
//!
//! - Key escaping for store keys
//! - Read/write/delete/soft-expire over one bucket
//! - Bounded, index-driven sweeps (`clean`, `clear`)

pub mod connection;
pub mod entry;
pub mod path;
pub mod sweep;

pub use crate::Error;

pub use connection::{CacheConnection, DEFAULT_BUCKET};
pub use entry::CacheEntry;
pub use sweep::SweepReport;
