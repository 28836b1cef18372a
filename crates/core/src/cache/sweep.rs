//! Bulk expiry sweeps.
//!
//! Keys are discovered through the `created_at_int` index in one-day windows,
//! newest first, going back at most 60 days. A sweep therefore issues at most
//! 60 index queries however large the bucket is.
//!
//! The walk stops at the first window that yields no matching key, even when
//! the 60-day floor has not been reached yet. Entries older than such a gap are
//! left for a later sweep.

use std::future::Future;

use super::connection::CacheConnection;
use super::entry::CREATED_AT_INDEX;
use super::path;
use crate::Error;
use crate::store::IndexRange;

/// Width of one sweep window.
pub const WINDOW_SECS: i64 = 24 * 60 * 60;

/// How far back a sweep looks.
pub const LOOKBACK_SECS: i64 = 60 * WINDOW_SECS;

/// Counters collected by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Index queries issued.
    pub windows: u32,
    /// Keys that matched the namespace, including ones left untouched.
    pub matched: u64,
    /// Entries removed.
    pub deleted: u64,
    /// Entries soft-expired.
    pub expired: u64,
}

/// What a sweep did to one key.
enum Swept {
    Deleted,
    Expired,
    /// The soft-expire write was refused.
    Untouched,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl CacheConnection {
    /// Reap expired entries under `namespace` and soft-expire the rest.
    ///
    /// Entries whose `expires_at` has passed are deleted; every other entry
    /// gets `expires_at` set to now, so the next sweep removes it.
    pub async fn clean(&self, namespace: Option<&str>) -> Result<SweepReport, Error> {
        let report = self
            .chunked(namespace, |key| async move {
                let entry = self.read(&key, true).await?;
                if entry.is_expired_at(now()) {
                    self.delete(&key, true).await?;
                    Ok::<_, Error>(Swept::Deleted)
                } else if self.expire(&key, true).await?.is_some() {
                    Ok(Swept::Expired)
                } else {
                    Ok(Swept::Untouched)
                }
            })
            .await?;

        tracing::info!(
            bucket = %self.bucket_name(),
            namespace = namespace.unwrap_or(""),
            windows = report.windows,
            deleted = report.deleted,
            expired = report.expired,
            "clean sweep finished"
        );
        Ok(report)
    }

    /// Alias of [`CacheConnection::clean`].
    pub async fn expire_all(&self, namespace: Option<&str>) -> Result<SweepReport, Error> {
        self.clean(namespace).await
    }

    /// Delete every entry under `namespace`, expired or not.
    pub async fn clear(&self, namespace: Option<&str>) -> Result<SweepReport, Error> {
        let report = self
            .chunked(namespace, |key| async move {
                self.delete(&key, true).await?;
                Ok::<_, Error>(Swept::Deleted)
            })
            .await?;

        tracing::info!(
            bucket = %self.bucket_name(),
            namespace = namespace.unwrap_or(""),
            windows = report.windows,
            deleted = report.deleted,
            "clear sweep finished"
        );
        Ok(report)
    }

    /// Walk store keys under `namespace` window by window, applying `action`.
    ///
    /// `action` receives escaped store keys. Keys are handled one at a time.
    async fn chunked<F, Fut>(&self, namespace: Option<&str>, mut action: F) -> Result<SweepReport, Error>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Swept, Error>>,
    {
        let prefix = path::encode(namespace, false);

        let started = now();
        let floor = started - LOOKBACK_SECS;
        let mut window_end = started;
        let mut report = SweepReport::default();

        loop {
            let window_start = (window_end - WINDOW_SECS).max(floor);
            let keys = self
                .bucket
                .get_index(CREATED_AT_INDEX, IndexRange::descending(window_end, window_start))
                .await?;
            report.windows += 1;

            let mut matched = 0u64;
            for key in keys {
                if prefix.as_deref().is_some_and(|prefix| !key.starts_with(prefix)) {
                    continue;
                }
                match action(key).await? {
                    Swept::Deleted => report.deleted += 1,
                    Swept::Expired => report.expired += 1,
                    Swept::Untouched => {}
                }
                matched += 1;
            }
            report.matched += matched;

            tracing::debug!(window_start, window_end, matched, "swept window");

            window_end -= WINDOW_SECS;
            if window_end <= floor || matched == 0 {
                break;
            }
        }

        Ok(report)
    }
}
