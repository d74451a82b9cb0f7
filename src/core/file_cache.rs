//! Disk-backed item cache with an age-dependent staleness predicate.
//!
//! One table keyed by item id; rows carry the insertion time (`refreshed`),
//! the item's own creation time (`time`), and the raw blob. Whether a row
//! is returnable is decided by a configurable SQL expression over
//! `refreshed`, `time`, and the bind parameter `:now`.

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::cancel::CancelToken;
use super::clock::{unix_seconds, Clock};
use crate::Id;

/// Marks a row stale 60 seconds after refresh while the item is new, then
/// backs off roughly as the cube of the item's age in days; items more than
/// a few weeks old never go stale again.
pub const DEFAULT_STALE_IF: &str = "(:now-refreshed)>\
     (60.0*(log2(max(0.0,((:now-time)/60.0))+1.0)+pow(((:now-time)/(24.0*60.0*60.0)),3)))";

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Applied
/// after `PRAGMA journal_mode = WAL`.
const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS item(
    id INTEGER PRIMARY KEY,
    refreshed INTEGER NOT NULL,
    time INTEGER NOT NULL,
    value BLOB NOT NULL
);
"#;

/// The two blob fields the cache needs; everything else passes through
/// opaquely. Absent fields store as zero.
#[derive(Default, Deserialize)]
#[serde(default)]
struct BlobHeader {
    id: Id,
    time: i64,
}

pub struct ItemFileCache {
    conn: Mutex<Option<Connection>>,
    clock: Arc<dyn Clock>,
    stale_if: String,
    binds_now: bool,
}

impl ItemFileCache {
    /// Open or create the cache at `path`. Enables WAL, applies the schema,
    /// and validates `stale_if` by asking SQLite to plan a query with it,
    /// so a bad expression fails here rather than on first use.
    pub fn open(clock: Arc<dyn Clock>, path: &Path, stale_if: Option<&str>) -> Result<Self> {
        let conn = Connection::open(path).context("open item cache database")?;

        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .context("enable WAL")?;
        conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
        conn.execute_batch(SCHEMA).context("create schema")?;

        let stale_if = stale_if.unwrap_or(DEFAULT_STALE_IF).to_string();
        let binds_now = stale_if.contains(":now");

        let explain = format!("EXPLAIN SELECT id, refreshed, time, value FROM item WHERE {stale_if}");
        let mut stmt = conn
            .prepare(&explain)
            .context("validate staleness predicate")?;
        let now = vec![unix_seconds(clock.now()); usize::from(binds_now)];
        stmt.query(params_from_iter(now))
            .context("plan staleness predicate")?;
        drop(stmt);

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            clock,
            stale_if,
            binds_now,
        })
    }

    /// Invoke `do_fn` with the blob of every requested row that is not
    /// stale at the current clock time (duplicate ids get duplicate calls)
    /// and return the ids that were stale or absent.
    pub fn get(
        &self,
        token: &CancelToken,
        ids: &[Id],
        mut do_fn: impl FnMut(Id, &[u8]),
    ) -> Result<Vec<Id>> {
        token.check()?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut positions: HashMap<Id, Vec<usize>> = HashMap::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            positions.entry(id).or_default().push(i);
        }

        let query = format!(
            "SELECT id, value FROM item WHERE id IN (?{}) AND NOT ({})",
            ",?".repeat(ids.len() - 1),
            self.stale_if
        );

        // The ids bind the `?`s in order; `:now` picks up the next index,
        // so it goes last (when the predicate uses it at all).
        let mut params: Vec<Value> = ids.iter().map(|&id| Value::from(id as i64)).collect();
        if self.binds_now {
            params.push(Value::from(unix_seconds(self.clock.now())));
        }

        let mut did = vec![false; ids.len()];

        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or_else(|| anyhow!("item cache closed"))?;

        let mut stmt = conn.prepare_cached(&query).context("prepare cache get")?;
        let mut rows = stmt
            .query(params_from_iter(params))
            .context("query item cache")?;

        while let Some(row) = rows.next().context("item cache row")? {
            let id = row.get::<_, i64>(0).context("item cache id column")? as Id;
            let blob = row
                .get_ref(1)
                .context("item cache value column")?
                .as_blob()
                .context("item cache value type")?;

            let Some(hits) = positions.get(&id) else {
                bail!("item cache returned id {id} that was not requested");
            };

            for &i in hits {
                did[i] = true;
                do_fn(id, blob);
            }
        }

        Ok(ids
            .iter()
            .zip(&did)
            .filter(|(_, &done)| !done)
            .map(|(&id, _)| id)
            .collect())
    }

    /// Upsert `blobs`, extracting `(id, time)` from each. Blobs equal to
    /// the JSON `null` literal mean "does not exist" and are never stored.
    pub fn put(&self, token: &CancelToken, blobs: &[&[u8]]) -> Result<()> {
        token.check()?;

        let now = unix_seconds(self.clock.now());
        let mut params: Vec<Value> = Vec::with_capacity(blobs.len() * 4);

        for &blob in blobs {
            if blob == b"null" {
                continue;
            }

            let header: BlobHeader =
                serde_json::from_slice(blob).context("decode blob id/time")?;

            params.push(Value::from(header.id as i64));
            params.push(Value::from(now));
            params.push(Value::from(header.time));
            params.push(Value::from(blob.to_vec()));
        }

        if params.is_empty() {
            return Ok(());
        }

        let rows = params.len() / 4;
        let query = format!(
            "INSERT OR REPLACE INTO item (id,refreshed,time,value) VALUES (?,?,?,?){}",
            ",(?,?,?,?)".repeat(rows - 1)
        );

        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or_else(|| anyhow!("item cache closed"))?;

        conn.prepare_cached(&query)
            .context("prepare cache put")?
            .execute(params_from_iter(params))
            .context("upsert items")?;

        Ok(())
    }

    /// Close the connection. Idempotent; operations after close fail.
    pub fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().unwrap().take() {
            conn.close()
                .map_err(|(_, e)| e)
                .context("close item cache")?;
        }
        Ok(())
    }
}
