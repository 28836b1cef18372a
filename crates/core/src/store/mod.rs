//! Key/value store client capability.
//!
//! The cache connection only needs a small surface from the underlying store:
//! keyed get/put/delete over a single bucket plus range queries over named
//! integer secondary indexes. [`Bucket`] captures that surface; [`sqlite`]
//! provides the bundled implementation.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tokio_rusqlite::rusqlite;

pub mod migrations;
pub mod sqlite;

pub use sqlite::{SqliteBucket, SqliteClientConfig, StoreDb};

/// Content type marker for structured JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors raised by a store client.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Record body could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client configuration could not be decoded.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl From<tokio_rusqlite::Error<StoreError>> for StoreError {
    fn from(err: tokio_rusqlite::Error<StoreError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => StoreError::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => StoreError::Database(tokio_rusqlite::Error::Close(c)),
            _ => StoreError::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        StoreError::Database(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(tokio_rusqlite::Error::Error(err))
    }
}

/// A stored object: JSON body plus single-valued integer indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub content_type: String,
    pub data: Map<String, Value>,
    pub indexes: BTreeMap<String, i64>,
}

impl Record {
    /// An empty JSON record for `key`, not yet persisted.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            data: Map::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Value of a named index, if set.
    pub fn index(&self, name: &str) -> Option<i64> {
        self.indexes.get(name).copied()
    }

    /// Replace the value of a named index.
    pub fn set_index(&mut self, name: &str, value: i64) {
        self.indexes.insert(name.to_string(), value);
    }
}

/// Outcome of fetching a key from a bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Found(Record),
    Missing,
    /// An object exists under the key but is not a well-formed record.
    Malformed(String),
}

/// Descending range over an integer index: `start` inclusive, `end` exclusive.
///
/// `start` is the larger bound, so a query walks from newer to older values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: i64,
    pub end: i64,
}

impl IndexRange {
    pub fn descending(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, value: i64) -> bool {
        value <= self.start && value > self.end
    }
}

/// A single bucket of a key/value store with integer secondary indexes.
#[async_trait::async_trait]
pub trait Bucket: Send + Sync {
    /// Bucket name.
    fn name(&self) -> &str;

    /// Fetch the object stored under `key`.
    async fn get(&self, key: &str) -> Result<Fetched, StoreError>;

    /// Fetch the object under `key`, or a fresh unsaved record when absent.
    ///
    /// Never returns [`Fetched::Missing`].
    async fn get_or_new(&self, key: &str) -> Result<Fetched, StoreError> {
        match self.get(key).await? {
            Fetched::Missing => Ok(Fetched::Found(Record::new(key))),
            other => Ok(other),
        }
    }

    /// Persist body and indexes of `record`, replacing any previous version.
    async fn store(&self, record: &Record) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Keys whose `index` value falls in `range`, newest value first.
    async fn get_index(&self, index: &str, range: IndexRange) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_range_bounds() {
        let range = IndexRange::descending(100, 50);
        assert!(range.contains(100));
        assert!(range.contains(51));
        assert!(!range.contains(50));
        assert!(!range.contains(101));
    }

    #[test]
    fn test_record_indexes() {
        let mut record = Record::new("k");
        assert_eq!(record.content_type, JSON_CONTENT_TYPE);
        assert_eq!(record.index("created_at_int"), None);

        record.set_index("created_at_int", 42);
        record.set_index("created_at_int", 43);
        assert_eq!(record.index("created_at_int"), Some(43));
        assert_eq!(record.indexes.len(), 1);
    }
}
