//! Entry reads and writes within a versioned store.
//!
//! Caching is an optimization, so the primary `get`/`put` pair never fails:
//! storage errors read as a miss and writes degrade to [`WriteOutcome::Dropped`].
//! The fallible `try_*` forms are available to callers that want the error.

use super::connection::CacheDb;
use super::hash::CacheKey;
use super::stores::CacheVersion;
use crate::{Error, ProxyResponse};
use bytes::Bytes;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

/// A captured response stored under a cache key.
///
/// Bodies are immutable; a newer capture replaces the entry wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Insertion time, assigned by the store. `None` until stored.
    pub stored_at: Option<String>,
}

impl CacheEntry {
    /// Capture `response` for storage under `key`.
    pub fn capture(key: CacheKey, method: &str, url: &Url, response: &ProxyResponse) -> Self {
        Self {
            key,
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: None,
        }
    }

    pub fn to_response(&self) -> ProxyResponse {
        ProxyResponse { status: self.status, headers: self.headers.clone(), body: self.body.clone() }
    }

    pub fn into_response(self) -> ProxyResponse {
        ProxyResponse { status: self.status, headers: self.headers, body: self.body }
    }
}

/// Result of a best-effort write. Callers are free to ignore it.
#[derive(Debug)]
pub enum WriteOutcome {
    Stored,
    Dropped(Error),
}

impl WriteOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, WriteOutcome::Stored)
    }
}

type EntryRow = (String, String, String, u16, String, Vec<u8>, String);

impl CacheDb {
    /// Look up `key` in the store for `version`.
    ///
    /// Storage failures are logged and reported as a miss.
    pub async fn get(&self, version: &CacheVersion, key: &CacheKey) -> Option<CacheEntry> {
        match self.try_get(version, key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(version = %version, key = %key, "cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    /// Insert or replace `entry` in the store for `version`.
    ///
    /// Never fails the caller: quota exhaustion, a missing store or an
    /// unavailable database all yield [`WriteOutcome::Dropped`].
    pub async fn put(&self, version: &CacheVersion, entry: CacheEntry) -> WriteOutcome {
        let key = entry.key.clone();
        match self.try_put(version, entry).await {
            Ok(()) => WriteOutcome::Stored,
            Err(e) => {
                tracing::warn!(version = %version, key = %key, "cache write dropped: {e}");
                WriteOutcome::Dropped(e)
            }
        }
    }

    /// Fallible lookup.
    pub async fn try_get(&self, version: &CacheVersion, key: &CacheKey) -> Result<Option<CacheEntry>, Error> {
        let version = version.clone();
        let key = key.clone();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, method, url, status_code, headers_json, body, stored_at
                    FROM cache_entries WHERE version = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row::<EntryRow, _, _>(params![version.as_str(), key.as_str()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?))
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(decode_entry).transpose()
    }

    /// Fallible upsert. Rejects non-GET entries and missing stores.
    pub async fn try_put(&self, version: &CacheVersion, entry: CacheEntry) -> Result<(), Error> {
        if entry.method != "GET" {
            return Err(Error::InvalidInput(format!("refusing to cache {} response", entry.method)));
        }

        let version = version.clone();
        let headers_json =
            serde_json::to_string(&entry.headers).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;
        let stored_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (version, key_hash, method, url, status_code, headers_json, body, stored_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(version, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status_code = excluded.status_code,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        version.as_str(),
                        entry.key.as_str(),
                        &entry.method,
                        &entry.url,
                        entry.status,
                        headers_json,
                        entry.body.as_ref(),
                        stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries held by the store for `version`.
    pub async fn entry_count(&self, version: &CacheVersion) -> Result<u64, Error> {
        let version = version.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE version = ?1",
                    params![version.as_str()],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

fn decode_entry(row: EntryRow) -> Result<CacheEntry, Error> {
    let (key, method, url, status, headers_json, body, stored_at) = row;
    let headers: Vec<(String, String)> =
        serde_json::from_str(&headers_json).map_err(|e| Error::CorruptEntry(format!("headers of {key}: {e}")))?;

    Ok(CacheEntry {
        key: CacheKey::from_stored(key),
        method,
        url,
        status,
        headers,
        body: Bytes::from(body),
        stored_at: Some(stored_at),
    })
}
