//! SQLite-backed buckets with integer secondary indexes.
//!
//! Objects live in one table keyed by `(bucket, key)`; their index values live
//! in a second table so that range queries over an index never touch the JSON
//! bodies. All database work runs on tokio-rusqlite's background thread.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_rusqlite::{Connection, params, rusqlite};

use super::{Bucket, Fetched, IndexRange, JSON_CONTENT_TYPE, Record, StoreError, migrations};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Connection options for the SQLite client.
///
/// Decoded from the pass-through part of the application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteClientConfig {
    /// Database file path. `:memory:` opens a private in-memory database.
    #[serde(default = "default_path")]
    pub path: PathBuf,
}

fn default_path() -> PathBuf {
    PathBuf::from("./storehouse.sqlite")
}

impl Default for SqliteClientConfig {
    fn default() -> Self {
        Self { path: default_path() }
    }
}

impl SqliteClientConfig {
    /// Decode client options from an opaque option map. Unknown keys are ignored.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(options.clone())).map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }
}

/// Store database handle.
#[derive(Clone, Debug)]
pub struct StoreDb {
    pub(crate) conn: Connection,
}

impl StoreDb {
    /// Open a database at the specified path, creating it if needed.
    ///
    /// Applies WAL pragmas and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open the database described by `config`.
    pub async fn connect(config: &SqliteClientConfig) -> Result<Self, StoreError> {
        tracing::debug!(path = %config.path.display(), "opening sqlite store");
        Self::open(&config.path).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(StoreError::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Handle to the bucket called `name`. Buckets need no creation step.
    pub fn bucket(&self, name: impl Into<String>) -> SqliteBucket {
        SqliteBucket { conn: self.conn.clone(), name: name.into() }
    }
}

/// One bucket of a [`StoreDb`].
#[derive(Clone, Debug)]
pub struct SqliteBucket {
    conn: Connection,
    name: String,
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

#[async_trait::async_trait]
impl Bucket for SqliteBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Fetched, StoreError> {
        let bucket = self.name.clone();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Fetched, StoreError> {
                let row = conn.query_row(
                    "SELECT content_type, data FROM objects WHERE bucket = ?1 AND key = ?2",
                    params![bucket, key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                );

                let (content_type, raw) = match row {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(Fetched::Missing),
                    Err(e) => return Err(e.into()),
                };

                if !is_json(&content_type) {
                    return Ok(Fetched::Malformed(format!("unexpected content type {content_type}")));
                }

                let data = match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => return Ok(Fetched::Malformed("body is not a JSON object".to_string())),
                    Err(e) => return Ok(Fetched::Malformed(e.to_string())),
                };

                let mut stmt = conn.prepare("SELECT name, value FROM object_indexes WHERE bucket = ?1 AND key = ?2")?;
                let indexes = stmt
                    .query_map(params![bucket, key], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;

                Ok(Fetched::Found(Record { key, content_type, data, indexes }))
            })
            .await
            .map_err(StoreError::from)
    }

    async fn store(&self, record: &Record) -> Result<(), StoreError> {
        let bucket = self.name.clone();
        let key = record.key.clone();
        let content_type = record.content_type.clone();
        let data = serde_json::to_string(&record.data)?;
        let indexes = record.indexes.clone();
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO objects (bucket, key, content_type, data, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(bucket, key) DO UPDATE SET
                        content_type = excluded.content_type,
                        data = excluded.data,
                        updated_at = excluded.updated_at",
                    params![bucket, key, content_type, data, updated_at],
                )?;
                tx.execute("DELETE FROM object_indexes WHERE bucket = ?1 AND key = ?2", params![bucket, key])?;
                for (name, value) in &indexes {
                    tx.execute(
                        "INSERT INTO object_indexes (bucket, key, name, value) VALUES (?1, ?2, ?3, ?4)",
                        params![bucket, key, name, value],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let bucket = self.name.clone();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute("DELETE FROM objects WHERE bucket = ?1 AND key = ?2", params![bucket, key])?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    async fn get_index(&self, index: &str, range: IndexRange) -> Result<Vec<String>, StoreError> {
        let bucket = self.name.clone();
        let index = index.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, StoreError> {
                let mut stmt = conn.prepare(
                    "SELECT key FROM object_indexes
                    WHERE bucket = ?1 AND name = ?2 AND value <= ?3 AND value > ?4
                    ORDER BY value DESC, key ASC",
                )?;
                let keys = stmt
                    .query_map(params![bucket, index, range.start, range.end], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(StoreError::from)
    }
}
