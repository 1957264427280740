//! Durable range cache backed by SQLite.
//!
//! One table keyed by prefix, storing the suffix bucket as a JSON string
//! array plus the fetch timestamp. The store is pure cache: schema version 1,
//! no migrations, safe to drop and rebuild at any time.
//!
//! The backing database may be unavailable entirely (sandboxed host,
//! read-only filesystem). That is probed once, lazily, on first use; in the
//! unavailable state every operation is a logged no-op so the checker keeps
//! working with just the volatile tier and the network.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

/// Current schema version, written to `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// One cached range bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub prefix: String,
    pub suffixes: HashSet<String>,
    /// Epoch milliseconds at fetch time.
    pub fetched_at: i64,
}

enum Backing {
    /// Not yet probed; holds the database path to open on first use.
    Untried(PathBuf),
    Ready(Connection),
    Unavailable,
}

/// SQLite-backed prefix-to-bucket cache with per-entry expiry.
pub struct SuffixStore {
    backing: Mutex<Backing>,
    ttl: Duration,
}

impl SuffixStore {
    /// Creates a store over the database at `path`. The file is not touched
    /// until the first operation.
    pub fn open(path: PathBuf, ttl: Duration) -> Self {
        Self { backing: Mutex::new(Backing::Untried(path)), ttl }
    }

    /// Creates a store that is permanently unavailable. Used when the host
    /// provides no durable storage; all operations are no-ops.
    pub fn disabled() -> Self {
        Self { backing: Mutex::new(Backing::Unavailable), ttl: Duration::ZERO }
    }

    /// Returns the cached bucket for `prefix`, expiring stale rows as a side
    /// effect: a row older than the TTL is deleted and reported absent.
    pub fn get(&self, prefix: &str) -> Option<CacheEntry> {
        let now = now_ms();
        let ttl_ms = self.ttl.as_millis() as i64;
        self.with_conn("get", |conn| {
            let row = conn
                .query_row(
                    "SELECT suffixes, fetched_at FROM range_cache WHERE prefix = ?1",
                    params![prefix],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            let Some((raw, fetched_at)) = row else {
                return Ok(None);
            };

            if now - fetched_at > ttl_ms {
                debug!(prefix, "expiring stale range cache row");
                conn.execute("DELETE FROM range_cache WHERE prefix = ?1", params![prefix])?;
                return Ok(None);
            }

            let suffixes: HashSet<String> = match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    // A corrupt row is treated like a miss and purged.
                    warn!(prefix, error = %e, "dropping unparsable range cache row");
                    conn.execute("DELETE FROM range_cache WHERE prefix = ?1", params![prefix])?;
                    return Ok(None);
                }
            };

            Ok(Some(CacheEntry { prefix: prefix.to_string(), suffixes, fetched_at }))
        })
        .flatten()
    }

    /// Upserts `entry`, overwriting any existing row for the same prefix.
    pub fn put(&self, entry: &CacheEntry) {
        let suffixes: Vec<&String> = entry.suffixes.iter().collect();
        let raw = match serde_json::to_string(&suffixes) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(prefix = %entry.prefix, error = %e, "failed to encode suffix bucket");
                return;
            }
        };
        self.with_conn("put", |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO range_cache (prefix, suffixes, fetched_at) \
                 VALUES (?1, ?2, ?3)",
                params![entry.prefix, raw, entry.fetched_at],
            )
        });
    }

    /// Removes the row for `prefix`, if any.
    pub fn delete(&self, prefix: &str) {
        self.with_conn("delete", |conn| {
            conn.execute("DELETE FROM range_cache WHERE prefix = ?1", params![prefix])
        });
    }

    /// Removes all rows.
    pub fn clear(&self) {
        self.with_conn("clear", |conn| conn.execute("DELETE FROM range_cache", []));
    }

    /// Runs `op` against the connection, lazily opening the database on
    /// first use. Any failure flips the store into the unavailable state
    /// (open failures) or is logged and swallowed (per-op failures); nothing
    /// here ever raises to the checker.
    fn with_conn<T>(
        &self,
        op: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Option<T> {
        let mut backing = match self.backing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if matches!(&*backing, Backing::Untried(_)) {
            let probed = std::mem::replace(&mut *backing, Backing::Unavailable);
            if let Backing::Untried(path) = probed {
                match open_database(&path) {
                    Ok(conn) => {
                        debug!(path = %path.display(), "opened durable range cache");
                        *backing = Backing::Ready(conn);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e,
                            "durable range cache unavailable, continuing without it");
                    }
                }
            }
        }

        match &*backing {
            Backing::Ready(conn) => match f(conn) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(op, error = %e, "durable range cache operation failed");
                    None
                }
            },
            _ => None,
        }
    }
}

fn open_database(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS range_cache (
            prefix     TEXT PRIMARY KEY,
            suffixes   TEXT NOT NULL,
            fetched_at INTEGER NOT NULL
        )",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(conn)
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
