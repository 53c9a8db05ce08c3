//! The persistent store: demands, weeks and the metadata table in one SQLite
//! file.
//!
//! Every mutating call runs in a single transaction and returns only after
//! the commit; with `synchronous=FULL` and a rollback journal the main file
//! holds the committed state when the call returns.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use dw_core::{Demand, Priority, Status, Week, DEFAULT_BUSY_TIMEOUT_MS, META_CURRENT_WEEK};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::schema::{ensure_schema, SchemaReport};
use crate::search::{self, SearchHits};

const DEMAND_COLUMNS: &str =
    "id,title,description,client,priority,created_at,status,week_key,carried_over,sort_order";

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

/// Handle to an opened, schema-checked store. Cheap to clone; each
/// operation opens its own connection.
#[derive(Clone, Debug)]
pub struct Store {
    db_path: PathBuf,
    options: StoreOptions,
    schema: SchemaReport,
}

/// Complete persisted state, as returned by [`Store::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Ordered by `sort_order` descending.
    pub demands: Vec<Demand>,
    /// Ordered by `start_date` descending.
    pub weeks: Vec<Week>,
    pub current_week: Option<Week>,
    /// Every metadata entry except the current-week pointer.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    pub rows: usize,
    /// False when the search index could not be rebuilt (search falls back).
    pub index_rebuilt: bool,
}

/// Result of [`Store::rollover_week`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloverReport {
    pub week: Week,
    pub previous_key: String,
    pub week_inserted: bool,
    pub carried: usize,
    /// The target was already current; nothing was written.
    pub already_current: bool,
}

impl Store {
    /// Open (creating if needed) the store at `path` and ensure its schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open `demandworker.sqlite` inside `dir`.
    pub fn open_in_dir(dir: &Path) -> StoreResult<Self> {
        Self::open(&dir.join(dw_core::DEFAULT_DB_FILE))
    }

    pub fn open_with(path: &Path, options: StoreOptions) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = open_connection(path, &options)?;
        let schema = ensure_schema(&mut conn)?;
        tracing::info!(
            path = %path.display(),
            fts = schema.fts_available,
            indexed = schema.indexed_rows,
            "store opened"
        );
        Ok(Self {
            db_path: path.to_path_buf(),
            options,
            schema,
        })
    }

    fn conn(&self) -> StoreResult<Connection> {
        open_connection(&self.db_path, &self.options)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Schema state observed when the store was opened.
    pub fn schema(&self) -> SchemaReport {
        self.schema
    }

    // ---------------- Reads ----------------

    /// Read the complete state in one read transaction.
    ///
    /// An unreadable current-week pointer is logged and reported as absent so
    /// the caller can re-establish one; [`Store::current_week`] is strict.
    pub fn load_all(&self) -> StoreResult<Snapshot> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let demands = select_demands(&tx, None)?;
        let weeks = select_weeks(&tx)?;
        let current_week = match read_current_week(&tx) {
            Ok(week) => week,
            Err(err) => {
                tracing::warn!(%err, "ignoring unreadable current week pointer");
                None
            }
        };
        let metadata = {
            let mut stmt = tx.prepare("SELECT key,value FROM meta_kv WHERE key != ?")?;
            let rows = stmt.query_map(params![META_CURRENT_WEEK], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?
        };
        tx.commit()?;
        Ok(Snapshot {
            demands,
            weeks,
            current_week,
            metadata,
        })
    }

    pub fn list_demands(&self) -> StoreResult<Vec<Demand>> {
        select_demands(&self.conn()?, None)
    }

    pub fn demands_in_week(&self, week_key: &str) -> StoreResult<Vec<Demand>> {
        select_demands(&self.conn()?, Some(week_key))
    }

    pub fn get_demand(&self, id: &str) -> StoreResult<Option<Demand>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {DEMAND_COLUMNS} FROM demands WHERE id = ?"),
                params![id],
                DemandRow::read,
            )
            .optional()?;
        raw.map(DemandRow::into_demand).transpose()
    }

    pub fn list_weeks(&self) -> StoreResult<Vec<Week>> {
        select_weeks(&self.conn()?)
    }

    /// The current-week pointer. Fails with [`StoreError::Corrupt`] when the
    /// stored value cannot be decoded.
    pub fn current_week(&self) -> StoreResult<Option<Week>> {
        read_current_week(&self.conn()?)
    }

    pub fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT value FROM meta_kv WHERE key = ? LIMIT 1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn search(&self, query: &str) -> StoreResult<SearchHits> {
        search::search(&self.conn()?, query)
    }

    // ---------------- Writes ----------------

    /// Replace the whole demand table with `list` and rebuild the search
    /// index in the same transaction.
    ///
    /// The index rebuild runs inside a savepoint: if it fails only the index
    /// work is rolled back and the demand rows still commit.
    pub fn replace_demands(&self, list: &[Demand]) -> StoreResult<ReplaceReport> {
        let mut seen = HashSet::with_capacity(list.len());
        for d in list {
            if !seen.insert(d.id.as_str()) {
                return Err(StoreError::Duplicate {
                    kind: "demand",
                    key: d.id.clone(),
                });
            }
        }

        let mut conn = self.conn()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM demands", [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO demands ({DEMAND_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?)"
            ))?;
            for d in list {
                stmt.execute(params![
                    d.id,
                    d.title,
                    d.description,
                    d.client,
                    d.priority.as_str(),
                    d.created_at_iso(),
                    d.status.as_str(),
                    d.week_key,
                    d.carried_over,
                    d.sort_order,
                ])?;
            }
        }
        let index_rebuilt = rebuild_index_in(&mut tx);
        tx.commit()?;
        tracing::debug!(rows = list.len(), index_rebuilt, "demands replaced");
        Ok(ReplaceReport {
            rows: list.len(),
            index_rebuilt,
        })
    }

    /// Replace the whole week table. The week referenced by the current-week
    /// pointer must be part of `list`.
    pub fn replace_weeks(&self, list: &[Week]) -> StoreResult<usize> {
        let mut seen = HashSet::with_capacity(list.len());
        for w in list {
            w.validate()?;
            if !seen.insert(w.key.as_str()) {
                return Err(StoreError::Duplicate {
                    kind: "week",
                    key: w.key.clone(),
                });
            }
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(current) = read_current_week(&tx)? {
            if !seen.contains(current.key.as_str()) {
                return Err(StoreError::CurrentWeekMissing(current.key));
            }
        }
        tx.execute("DELETE FROM weeks", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weeks (id,start_date,end_date,key,created_at) VALUES (?,?,?,?,?)",
            )?;
            let now = now_iso();
            for w in list {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    w.start_date.to_string(),
                    w.end_date.to_string(),
                    w.key,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(list.len())
    }

    /// Point the current week at `week`, inserting the week row if needed.
    pub fn set_current_week(&self, week: &Week) -> StoreResult<()> {
        week.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_week_if_missing(&tx, week)?;
        write_current_week(&tx, week)?;
        tx.commit()?;
        Ok(())
    }

    /// Make `next` the current week and carry every unfinished demand of
    /// `previous_key` into it as urgent, all in one transaction.
    ///
    /// A no-op when `next` is already current.
    pub fn rollover_week(&self, next: &Week, previous_key: &str) -> StoreResult<RolloverReport> {
        next.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = read_current_week(&tx)?;
        if current.as_ref().is_some_and(|c| c.key == next.key) {
            return Ok(RolloverReport {
                week: next.clone(),
                previous_key: previous_key.to_string(),
                week_inserted: false,
                carried: 0,
                already_current: true,
            });
        }

        let week_inserted = insert_week_if_missing(&tx, next)?;
        write_current_week(&tx, next)?;
        let carried = if previous_key == next.key {
            0
        } else {
            tx.execute(
                "UPDATE demands SET week_key = ?, status = ?, carried_over = 1
                 WHERE week_key = ? AND status != ?",
                params![
                    next.key,
                    Status::Urgent.as_str(),
                    previous_key,
                    Status::Done.as_str()
                ],
            )?
        };
        tx.commit()?;
        tracing::info!(
            from = previous_key,
            to = %next.key,
            carried,
            week_inserted,
            "week rolled over"
        );
        Ok(RolloverReport {
            week: next.clone(),
            previous_key: previous_key.to_string(),
            week_inserted,
            carried,
            already_current: false,
        })
    }

    pub fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO meta_kv(key,value) VALUES(?,?)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_meta(&self, key: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM meta_kv WHERE key = ?", params![key])? > 0)
    }

    /// Delete every row of every table. All or nothing.
    pub fn reset_all(&self) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch("DELETE FROM demands; DELETE FROM weeks; DELETE FROM meta_kv;")?;
        rebuild_index_in(&mut tx);
        tx.commit()?;
        tracing::info!(path = %self.db_path.display(), "store reset");
        Ok(())
    }

    /// Rebuild the search index from the demand table.
    pub fn rebuild_search_index(&self) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = search::rebuild_index(&tx)?;
        tx.commit()?;
        Ok(rows)
    }

    // ---------------- Async wrappers (spawn_blocking) ----------------
    // These helpers offload rusqlite work from async executors. A write that
    // has started keeps running even if the awaiting future is dropped.

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Store) -> StoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    pub async fn load_all_async(&self) -> StoreResult<Snapshot> {
        self.blocking(|s| s.load_all()).await
    }

    pub async fn replace_demands_async(&self, list: Vec<Demand>) -> StoreResult<ReplaceReport> {
        self.blocking(move |s| s.replace_demands(&list)).await
    }

    pub async fn replace_weeks_async(&self, list: Vec<Week>) -> StoreResult<usize> {
        self.blocking(move |s| s.replace_weeks(&list)).await
    }

    pub async fn set_current_week_async(&self, week: Week) -> StoreResult<()> {
        self.blocking(move |s| s.set_current_week(&week)).await
    }

    pub async fn rollover_week_async(
        &self,
        next: Week,
        previous_key: String,
    ) -> StoreResult<RolloverReport> {
        self.blocking(move |s| s.rollover_week(&next, &previous_key))
            .await
    }

    pub async fn current_week_async(&self) -> StoreResult<Option<Week>> {
        self.blocking(|s| s.current_week()).await
    }

    pub async fn list_demands_async(&self) -> StoreResult<Vec<Demand>> {
        self.blocking(|s| s.list_demands()).await
    }

    pub async fn set_meta_async(&self, key: String, value: String) -> StoreResult<()> {
        self.blocking(move |s| s.set_meta(&key, &value)).await
    }

    pub async fn search_async(&self, query: String) -> StoreResult<SearchHits> {
        self.blocking(move |s| s.search(&query)).await
    }

    pub async fn reset_all_async(&self) -> StoreResult<()> {
        self.blocking(|s| s.reset_all()).await
    }
}

fn open_connection(path: &Path, options: &StoreOptions) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    // Rollback journal + FULL sync: a committed transaction is in the main
    // file before the commit call returns.
    conn.pragma_update(None, "journal_mode", "DELETE")?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.busy_timeout(options.busy_timeout)?;
    let _ = conn.pragma_update(None, "temp_store", "MEMORY");
    Ok(conn)
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Rebuild the index inside a savepoint of `tx`. Returns false (and leaves
/// the outer transaction intact) when the index cannot be rebuilt.
fn rebuild_index_in(tx: &mut Transaction<'_>) -> bool {
    let sp = match tx.savepoint() {
        Ok(sp) => sp,
        Err(err) => {
            tracing::warn!(%err, "could not open savepoint for search index rebuild");
            return false;
        }
    };
    match search::rebuild_index(&sp).and_then(|_| sp.commit()) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%err, "search index rebuild failed; search degrades to substring match");
            false
        }
    }
}

fn insert_week_if_missing(conn: &Connection, week: &Week) -> StoreResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO weeks (id,start_date,end_date,key,created_at) VALUES (?,?,?,?,?)",
        params![
            Uuid::new_v4().to_string(),
            week.start_date.to_string(),
            week.end_date.to_string(),
            week.key,
            now_iso(),
        ],
    )?;
    Ok(inserted > 0)
}

fn write_current_week(conn: &Connection, week: &Week) -> StoreResult<()> {
    let value = serde_json::to_string(week)?;
    conn.execute(
        "INSERT OR REPLACE INTO meta_kv(key,value) VALUES(?,?)",
        params![META_CURRENT_WEEK, value],
    )?;
    Ok(())
}

fn read_current_week(conn: &Connection) -> StoreResult<Option<Week>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM meta_kv WHERE key = ? LIMIT 1",
            params![META_CURRENT_WEEK],
            |row| row.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let week: Week = serde_json::from_str(&raw)
        .map_err(|e| StoreError::corrupt("current week pointer", e))?;
    week.validate()
        .map_err(|e| StoreError::corrupt("current week pointer", e))?;
    Ok(Some(week))
}

fn select_demands(conn: &Connection, week_key: Option<&str>) -> StoreResult<Vec<Demand>> {
    let raw: Vec<DemandRow> = match week_key {
        Some(key) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEMAND_COLUMNS} FROM demands WHERE week_key = ? ORDER BY sort_order DESC, id"
            ))?;
            let rows = stmt.query_map(params![key], DemandRow::read)?;
            rows.collect::<rusqlite::Result<_>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEMAND_COLUMNS} FROM demands ORDER BY sort_order DESC, id"
            ))?;
            let rows = stmt.query_map([], DemandRow::read)?;
            rows.collect::<rusqlite::Result<_>>()?
        }
    };
    raw.into_iter().map(DemandRow::into_demand).collect()
}

fn select_weeks(conn: &Connection) -> StoreResult<Vec<Week>> {
    let mut stmt =
        conn.prepare("SELECT start_date,end_date,key FROM weeks ORDER BY start_date DESC")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (start, end, key) = row?;
        let week = Week::parse(&start, &end)
            .map_err(|e| StoreError::corrupt(format!("week '{key}'"), e))?;
        if week.key != key {
            return Err(StoreError::corrupt(
                format!("week '{key}'"),
                format!("key does not match dates (expected '{}')", week.key),
            ));
        }
        out.push(week);
    }
    Ok(out)
}

/// Raw column values; decoding into domain types happens outside the
/// rusqlite row callback so failures map to [`StoreError::Corrupt`].
struct DemandRow {
    id: String,
    title: String,
    description: Option<String>,
    client: String,
    priority: String,
    created_at: String,
    status: String,
    week_key: String,
    carried_over: bool,
    sort_order: i64,
}

impl DemandRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            client: row.get(3)?,
            priority: row.get(4)?,
            created_at: row.get(5)?,
            status: row.get(6)?,
            week_key: row.get(7)?,
            carried_over: row.get::<_, i64>(8)? != 0,
            sort_order: row.get(9)?,
        })
    }

    fn into_demand(self) -> StoreResult<Demand> {
        let what = || format!("demand '{}'", self.id);
        let priority: Priority = self
            .priority
            .parse()
            .map_err(|e| StoreError::corrupt(what(), e))?;
        let status: Status = self
            .status
            .parse()
            .map_err(|e| StoreError::corrupt(what(), e))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::corrupt(what(), e))?
            .with_timezone(&Utc);
        Ok(Demand {
            id: self.id,
            title: self.title,
            description: self.description,
            client: self.client,
            priority,
            created_at,
            status,
            week_key: self.week_key,
            carried_over: self.carried_over,
            sort_order: self.sort_order,
        })
    }
}
