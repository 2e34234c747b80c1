//! Store lifecycle: creation, activation and enumeration of cache generations.
//!
//! `activate` is the only place stale generations are reclaimed. It runs in
//! a single transaction so readers never observe two active stores.

use super::connection::CacheDb;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Opaque name of one cache generation, supplied by the deploy process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(version: impl Into<String>) -> Result<Self, Error> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(Error::InvalidInput("cache version cannot be empty".into()));
        }
        Ok(Self(version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cache generation and its current size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStore {
    pub version: CacheVersion,
    pub created_at: String,
    pub active: bool,
    pub entries: u64,
}

const SELECT_STORE: &str = "SELECT s.version, s.created_at, s.active,
        (SELECT COUNT(*) FROM cache_entries e WHERE e.version = s.version)
    FROM cache_stores s";

fn store_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheStore> {
    Ok(CacheStore {
        version: CacheVersion(row.get(0)?),
        created_at: row.get(1)?,
        active: row.get::<_, i64>(2)? == 1,
        entries: row.get::<_, i64>(3)? as u64,
    })
}

fn load_store(conn: &rusqlite::Connection, version: &str) -> Result<Option<CacheStore>, Error> {
    let mut stmt = conn.prepare(&format!("{SELECT_STORE} WHERE s.version = ?1"))?;
    match stmt.query_row(params![version], store_from_row) {
        Ok(store) => Ok(Some(store)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl CacheDb {
    /// Create the store for `version` if it does not exist yet.
    ///
    /// Idempotent: an existing store is returned unchanged. The active
    /// store, whichever it is, is never touched.
    pub async fn create_store(&self, version: &CacheVersion) -> Result<CacheStore, Error> {
        let version = version.clone();
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<CacheStore, Error> {
                conn.execute(
                    "INSERT INTO cache_stores (version, created_at, active) VALUES (?1, ?2, 0)
                    ON CONFLICT(version) DO NOTHING",
                    params![version.as_str(), created_at],
                )?;
                load_store(conn, version.as_str())?
                    .ok_or_else(|| Error::CorruptEntry(format!("store {version} vanished after creation")))
            })
            .await
            .map_err(Error::from)
    }

    /// Make `version` the single active store and delete every other store.
    ///
    /// Creates the store first if needed. Entries of deleted stores go with
    /// them. Returns the reclaimed versions, oldest first.
    pub async fn activate(&self, version: &CacheVersion) -> Result<Vec<CacheVersion>, Error> {
        let version = version.clone();
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Vec<CacheVersion>, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO cache_stores (version, created_at, active) VALUES (?1, ?2, 0)
                    ON CONFLICT(version) DO NOTHING",
                    params![version.as_str(), created_at],
                )?;

                let stale = {
                    let mut stmt =
                        tx.prepare("SELECT version FROM cache_stores WHERE version != ?1 ORDER BY created_at ASC")?;
                    stmt.query_map(params![version.as_str()], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                };

                tx.execute("DELETE FROM cache_stores WHERE version != ?1", params![version.as_str()])?;
                tx.execute("UPDATE cache_stores SET active = 1 WHERE version = ?1", params![version.as_str()])?;
                tx.commit()?;

                Ok(stale.into_iter().map(CacheVersion).collect())
            })
            .await
            .map_err(Error::from)
    }

    /// The currently active store, if any version has been activated.
    pub async fn active_store(&self) -> Result<Option<CacheStore>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<CacheStore>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_STORE} WHERE s.active = 1"))?;
                match stmt.query_row([], store_from_row) {
                    Ok(store) => Ok(Some(store)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Look up one store by version.
    pub async fn store(&self, version: &CacheVersion) -> Result<Option<CacheStore>, Error> {
        let version = version.clone();
        self.conn
            .call(move |conn| load_store(conn, version.as_str()))
            .await
            .map_err(Error::from)
    }

    /// All known stores, oldest first.
    pub async fn list_stores(&self) -> Result<Vec<CacheStore>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<CacheStore>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_STORE} ORDER BY s.created_at ASC, s.version ASC"))?;
                let stores = stmt.query_map([], store_from_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(stores)
            })
            .await
            .map_err(Error::from)
    }
}
