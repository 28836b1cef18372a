//! Cache entry data model.
//!
//! An entry is a JSON object payload plus two Unix timestamps. In the store the
//! timestamps never live in the body: they are carried by the `created_at_int`
//! and `expires_at_int` secondary indexes of the same object, and merged back
//! into the field map on read.

use serde_json::{Map, Value};

/// Field name of the creation timestamp in an entry's field map.
pub const CREATED_AT: &str = "created_at";

/// Field name of the expiration timestamp in an entry's field map.
pub const EXPIRES_AT: &str = "expires_at";

/// Secondary index holding the creation timestamp.
pub const CREATED_AT_INDEX: &str = "created_at_int";

/// Secondary index holding the expiration timestamp.
pub const EXPIRES_AT_INDEX: &str = "expires_at_int";

/// A page-cache entry: logical key plus its field map.
///
/// The field map holds the payload together with the `created_at` and
/// `expires_at` fields. An entry with no fields stands for a cache miss.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    key: String,
    fields: Map<String, Value>,
}

impl CacheEntry {
    /// Build an entry from a payload and its timestamps.
    ///
    /// Timestamp fields already present in `payload` are overwritten.
    pub fn new(key: impl Into<String>, payload: Map<String, Value>, created_at: i64, expires_at: i64) -> Self {
        let mut fields = payload;
        fields.insert(CREATED_AT.to_string(), Value::from(created_at));
        fields.insert(EXPIRES_AT.to_string(), Value::from(expires_at));
        Self { key: key.into(), fields }
    }

    /// Build an entry from a raw field map, timestamps included or not.
    pub fn from_fields(key: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self { key: key.into(), fields }
    }

    /// The cache-miss entry for `key`.
    pub fn empty(key: impl Into<String>) -> Self {
        Self { key: key.into(), fields: Map::new() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields, timestamps included.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Creation timestamp, coerced to an integer (absent is 0).
    pub fn created_at(&self) -> i64 {
        coerce_timestamp(self.fields.get(CREATED_AT))
    }

    /// Expiration timestamp, coerced to an integer (absent is 0).
    pub fn expires_at(&self) -> i64 {
        coerce_timestamp(self.fields.get(EXPIRES_AT))
    }

    /// Whether the expiration time lies strictly before `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at() < now
    }

    /// Copy of this entry with `expires_at` replaced.
    pub fn with_expires_at(&self, expires_at: i64) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(EXPIRES_AT.to_string(), Value::from(expires_at));
        Self { key: self.key.clone(), fields }
    }

    /// The payload without the timestamp fields: the document body as stored.
    pub fn payload(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_str() != CREATED_AT && name.as_str() != EXPIRES_AT)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Coerce a timestamp field to whole seconds.
///
/// Integers pass through, floats truncate, numeric strings are parsed.
/// Anything else, including an absent field, is 0.
pub fn coerce_timestamp(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}
