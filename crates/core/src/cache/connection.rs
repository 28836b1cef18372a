//! Page-cache connection over a single store bucket.
//!
//! Reads merge the timestamp indexes back into the entry; writes strip them
//! from the body and store them as indexes. Misses and malformed objects read
//! as empty entries, store failures propagate.

use std::sync::Arc;

use super::entry::{CREATED_AT_INDEX, CacheEntry, EXPIRES_AT_INDEX};
use super::path;
use crate::Error;
use crate::config::AppConfig;
use crate::store::{Bucket, Fetched, JSON_CONTENT_TYPE, Record, SqliteClientConfig, StoreDb};

/// Bucket name used when the configuration names none.
pub const DEFAULT_BUCKET: &str = "page_cache";

/// Cache connection handle.
///
/// Holds a shared bucket handle and no other state, so clones can serve
/// concurrent callers.
#[derive(Clone)]
pub struct CacheConnection {
    pub(crate) bucket: Arc<dyn Bucket>,
}

impl std::fmt::Debug for CacheConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConnection").field("bucket", &self.bucket.name()).finish()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Store key for a cache key; empty keys count as absent.
fn storage_key(key: &str, skip_escape: bool) -> Option<String> {
    path::encode(Some(key).filter(|k| !k.is_empty()), skip_escape).map(|k| k.into_owned())
}

impl CacheConnection {
    /// Wrap an existing bucket.
    pub fn new(bucket: impl Bucket + 'static) -> Self {
        Self { bucket: Arc::new(bucket) }
    }

    /// Open the configured bucket of the bundled SQLite store.
    ///
    /// Everything in the configuration except the bucket name is handed to the
    /// store client untouched.
    pub async fn open(config: &AppConfig) -> Result<Self, Error> {
        let client = SqliteClientConfig::from_options(&config.client)?;
        let db = StoreDb::connect(&client).await?;
        tracing::debug!(bucket = %config.bucket, "opened cache connection");
        Ok(Self::new(db.bucket(config.bucket.clone())))
    }

    /// Name of the underlying bucket.
    pub fn bucket_name(&self) -> &str {
        self.bucket.name()
    }

    /// Read the entry stored under `key`.
    ///
    /// Returns an empty entry when the key is absent, unknown to the store, or
    /// holds a malformed object.
    pub async fn read(&self, key: &str, skip_escape: bool) -> Result<CacheEntry, Error> {
        let Some(store_key) = storage_key(key, skip_escape) else {
            return Ok(CacheEntry::empty(key));
        };

        let record = match self.bucket.get(&store_key).await? {
            Fetched::Found(record) => record,
            Fetched::Missing => return Ok(CacheEntry::empty(key)),
            Fetched::Malformed(reason) => {
                tracing::warn!(key = %store_key, %reason, "ignoring malformed cache object");
                return Ok(CacheEntry::empty(key));
            }
        };

        let created_at = record.index(CREATED_AT_INDEX).unwrap_or(0);
        let expires_at = record.index(EXPIRES_AT_INDEX).unwrap_or(0);

        Ok(CacheEntry::new(key, record.data, created_at, expires_at))
    }

    /// Replace the entry stored under `key` with `entry`.
    ///
    /// The stored body is `entry` without its timestamp fields; the timestamps
    /// go to the `created_at_int` and `expires_at_int` indexes, coerced to
    /// integers with absent values stored as 0. Returns the persisted record,
    /// or `None` when the key is absent or the existing object is malformed.
    pub async fn write(&self, key: &str, entry: &CacheEntry, skip_escape: bool) -> Result<Option<Record>, Error> {
        let Some(store_key) = storage_key(key, skip_escape) else {
            return Ok(None);
        };

        let mut record = match self.bucket.get_or_new(&store_key).await? {
            Fetched::Found(record) => record,
            Fetched::Missing => Record::new(store_key.as_str()),
            Fetched::Malformed(reason) => {
                tracing::warn!(key = %store_key, %reason, "refusing to overwrite malformed cache object");
                return Ok(None);
            }
        };

        record.content_type = JSON_CONTENT_TYPE.to_string();
        record.data = entry.payload();
        record.set_index(CREATED_AT_INDEX, entry.created_at());
        record.set_index(EXPIRES_AT_INDEX, entry.expires_at());

        self.bucket.store(&record).await?;
        tracing::debug!(key = %store_key, expires_at = entry.expires_at(), "stored cache entry");

        Ok(Some(record))
    }

    /// Delete `key`, returning the entry as it was before deletion.
    pub async fn delete(&self, key: &str, skip_escape: bool) -> Result<CacheEntry, Error> {
        let Some(store_key) = storage_key(key, skip_escape) else {
            return Ok(CacheEntry::empty(key));
        };

        let entry = self.read(&store_key, true).await?;
        self.bucket.delete(&store_key).await?;
        tracing::debug!(key = %store_key, existed = !entry.is_empty(), "deleted cache entry");

        Ok(CacheEntry::from_fields(key, entry.into_fields()))
    }

    /// Soft-expire `key`: set `expires_at` to now and keep everything else.
    ///
    /// A missing key is written as a bare record expiring now, with
    /// `created_at` 0. `None` signals a failed write, as for [`Self::write`].
    pub async fn expire(&self, key: &str, skip_escape: bool) -> Result<Option<Record>, Error> {
        let Some(store_key) = storage_key(key, skip_escape) else {
            return Ok(None);
        };

        let entry = self.read(&store_key, true).await?;
        self.write(&store_key, &entry.with_expires_at(now()), true).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{IndexRange, StoreError};
    use serde_json::{Map, Value, json};

    pub(crate) async fn open_test_connection() -> CacheConnection {
        let db = StoreDb::open_in_memory().await.unwrap();
        CacheConnection::new(db.bucket(DEFAULT_BUCKET))
    }

    pub(crate) fn page(html: &str) -> Map<String, Value> {
        let Value::Object(map) = json!({ "body": html, "status": 200, "headers": { "Content-Type": "text/html" } })
        else {
            unreachable!()
        };
        map
    }

    pub(crate) struct FailingBucket;

    #[async_trait::async_trait]
    impl Bucket for FailingBucket {
        fn name(&self) -> &str {
            "failing"
        }

        async fn get(&self, _key: &str) -> Result<Fetched, StoreError> {
            Err(StoreError::InvalidConfig("store unreachable".to_string()))
        }

        async fn store(&self, _record: &Record) -> Result<(), StoreError> {
            Err(StoreError::InvalidConfig("store unreachable".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::InvalidConfig("store unreachable".to_string()))
        }

        async fn get_index(&self, _index: &str, _range: IndexRange) -> Result<Vec<String>, StoreError> {
            Err(StoreError::InvalidConfig("store unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_write_and_read_round_trip() {
        let conn = open_test_connection().await;
        let entry = CacheEntry::new("/posts/1", page("<p>hi</p>"), 1_700_000_000, 1_700_003_600);

        conn.write("/posts/1", &entry, false).await.unwrap().unwrap();

        let read = conn.read("/posts/1", false).await.unwrap();
        assert_eq!(read, entry);
        assert_eq!(read.payload(), page("<p>hi</p>"));
    }

    #[tokio::test]
    async fn test_write_keeps_timestamps_out_of_body() {
        let conn = open_test_connection().await;
        let entry = CacheEntry::new("/posts/1", page("<p>hi</p>"), 10, 20);

        let record = conn.write("/posts/1", &entry, false).await.unwrap().unwrap();
        assert_eq!(record.key, "%2Fposts%2F1");
        assert_eq!(record.content_type, JSON_CONTENT_TYPE);
        assert_eq!(record.data, page("<p>hi</p>"));
        assert_eq!(record.index(CREATED_AT_INDEX), Some(10));
        assert_eq!(record.index(EXPIRES_AT_INDEX), Some(20));

        let Fetched::Found(stored) = conn.bucket.get("%2Fposts%2F1").await.unwrap() else { panic!("expected record") };
        assert!(!stored.data.contains_key("created_at"));
        assert!(!stored.data.contains_key("expires_at"));

        // Caller's entry is left untouched.
        assert_eq!(entry.created_at(), 10);
        assert_eq!(entry.fields().len(), 5);
    }

    #[tokio::test]
    async fn test_write_coerces_missing_timestamps_to_zero() {
        let conn = open_test_connection().await;
        let mut fields = page("x");
        fields.insert("expires_at".to_string(), json!("1700000000"));
        let entry = CacheEntry::from_fields("k", fields);

        let record = conn.write("k", &entry, false).await.unwrap().unwrap();
        assert_eq!(record.index(CREATED_AT_INDEX), Some(0));
        assert_eq!(record.index(EXPIRES_AT_INDEX), Some(1_700_000_000));

        let read = conn.read("k", false).await.unwrap();
        assert_eq!(read.created_at(), 0);
        assert_eq!(read.get("expires_at"), Some(&json!(1_700_000_000)));
    }

    #[tokio::test]
    async fn test_write_replaces_whole_entry() {
        let conn = open_test_connection().await;
        let mut first = page("old");
        first.insert("etag".to_string(), json!("abc"));
        conn.write("k", &CacheEntry::new("k", first, 1, 2), false).await.unwrap();
        conn.write("k", &CacheEntry::new("k", page("new"), 3, 4), false).await.unwrap();

        let read = conn.read("k", false).await.unwrap();
        assert_eq!(read.get("body"), Some(&json!("new")));
        assert!(read.get("etag").is_none());
        assert_eq!(read.created_at(), 3);
    }

    #[tokio::test]
    async fn test_read_missing_is_empty() {
        let conn = open_test_connection().await;
        let read = conn.read("nonexistent", false).await.unwrap();
        assert!(read.is_empty());
        assert_eq!(read.key(), "nonexistent");
    }

    #[tokio::test]
    async fn test_empty_key_short_circuits() {
        let conn = CacheConnection::new(FailingBucket);
        let entry = CacheEntry::new("", page("x"), 1, 2);

        assert!(conn.read("", false).await.unwrap().is_empty());
        assert!(conn.write("", &entry, false).await.unwrap().is_none());
        assert!(conn.delete("", true).await.unwrap().is_empty());
        assert!(conn.expire("", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let conn = CacheConnection::new(FailingBucket);
        let entry = CacheEntry::new("k", page("x"), 1, 2);

        assert!(matches!(conn.read("k", false).await, Err(Error::Store(_))));
        assert!(matches!(conn.write("k", &entry, false).await, Err(Error::Store(_))));
        assert!(matches!(conn.delete("k", false).await, Err(Error::Store(_))));
        assert!(matches!(conn.expire("k", false).await, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_malformed_object_reads_empty_and_blocks_write() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let conn = CacheConnection::new(db.bucket(DEFAULT_BUCKET));
        db.conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO objects VALUES ('page_cache', 'blob', 'application/octet-stream', 'xx', '')",
                    [],
                )
            })
            .await
            .unwrap();

        assert!(conn.read("blob", false).await.unwrap().is_empty());
        let entry = CacheEntry::new("blob", page("x"), 1, 2);
        assert!(conn.write("blob", &entry, false).await.unwrap().is_none());
        assert!(matches!(conn.bucket.get("blob").await.unwrap(), Fetched::Malformed(_)));
    }

    #[tokio::test]
    async fn test_delete_returns_prior_entry() {
        let conn = open_test_connection().await;
        let entry = CacheEntry::new("/a", page("x"), 1, 2);
        conn.write("/a", &entry, false).await.unwrap();

        let deleted = conn.delete("/a", false).await.unwrap();
        assert_eq!(deleted, entry);
        assert!(conn.read("/a", false).await.unwrap().is_empty());

        let again = conn.delete("/a", false).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_expire_is_soft() {
        let conn = open_test_connection().await;
        let far_future = now() + 86_400;
        let entry = CacheEntry::new("/a", page("x"), 1_000, far_future);
        conn.write("/a", &entry, false).await.unwrap();

        let before = now();
        conn.expire("/a", false).await.unwrap().unwrap();
        let after = now();

        let read = conn.read("/a", false).await.unwrap();
        assert!(read.expires_at() >= before && read.expires_at() <= after);
        assert_eq!(read.created_at(), 1_000);
        assert_eq!(read.payload(), entry.payload());
    }

    #[tokio::test]
    async fn test_expire_missing_writes_expired_record() {
        let conn = open_test_connection().await;
        let before = now();
        let record = conn.expire("/ghost", false).await.unwrap().unwrap();
        let after = now();

        assert_eq!(record.key, "%2Fghost");
        assert_eq!(record.index(CREATED_AT_INDEX), Some(0));
        let expires_at = record.index(EXPIRES_AT_INDEX).unwrap();
        assert!(expires_at >= before && expires_at <= after);
        assert!(record.data.is_empty());

        let read = conn.read("/ghost", false).await.unwrap();
        assert!(!read.is_empty());
        assert_eq!(read.created_at(), 0);
        assert_eq!(read.expires_at(), expires_at);
        assert!(read.payload().is_empty());
    }

    #[tokio::test]
    async fn test_escaping_round_trip() {
        let conn = open_test_connection().await;
        let entry = CacheEntry::new("a b", page("x"), 1, 2);
        conn.write("a b", &entry, false).await.unwrap();

        let escaped = conn.read("a+b", true).await.unwrap();
        assert_eq!(escaped.fields(), entry.fields());

        assert!(conn.read("a b", true).await.unwrap().is_empty());
        assert_eq!(conn.read("a b", false).await.unwrap().fields(), entry.fields());
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let mut config = AppConfig { bucket: "pages".to_string(), ..Default::default() };
        config.client.insert("path".to_string(), json!(":memory:"));

        let conn = CacheConnection::open(&config).await.unwrap();
        assert_eq!(conn.bucket_name(), "pages");
        assert!(conn.read("k", false).await.unwrap().is_empty());
    }
}
