//! Schema creation and upgrades, run on every open.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::search;

pub const SCHEMA_VERSION: i64 = 2;

/// What `ensure_schema` managed to set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub version: i64,
    /// False when the FTS5 table could not be created or repopulated.
    pub fts_available: bool,
    pub indexed_rows: usize,
}

/// Create or upgrade the schema. Idempotent.
///
/// Base tables and indexes are created in one transaction; any failure there
/// is fatal. The full-text index is optional: failures are logged and
/// reported through [`SchemaReport::fts_available`].
pub fn ensure_schema(conn: &mut Connection) -> StoreResult<SchemaReport> {
    let mut tx = conn.transaction().map_err(StoreError::Schema)?;
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS demands (
          id TEXT PRIMARY KEY,
          title TEXT NOT NULL,
          description TEXT,
          client TEXT NOT NULL,
          priority TEXT NOT NULL,
          created_at TEXT NOT NULL,
          status TEXT NOT NULL,
          week_key TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS weeks (
          id TEXT PRIMARY KEY,
          start_date TEXT NOT NULL,
          end_date TEXT NOT NULL,
          key TEXT NOT NULL UNIQUE,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS meta_kv (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );
        "#,
    )
    .map_err(StoreError::Schema)?;

    // Columns added after the first release; older files gain them here.
    for ddl in [
        "ALTER TABLE demands ADD COLUMN carried_over INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE demands ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
    ] {
        if let Err(err) = tx.execute(ddl, []) {
            if !is_duplicate_column(&err) {
                return Err(StoreError::Schema(err));
            }
        }
    }

    tx.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_demands_week_status ON demands(week_key, status);
        CREATE INDEX IF NOT EXISTS idx_demands_client_status ON demands(client, status);
        CREATE INDEX IF NOT EXISTS idx_demands_sort_order ON demands(sort_order);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_weeks_key ON weeks(key);
        "#,
    )
    .map_err(StoreError::Schema)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(StoreError::Schema)?;

    let (fts_available, indexed_rows) = {
        let sp = tx.savepoint().map_err(StoreError::Schema)?;
        match create_and_rebuild_fts(&sp) {
            Ok(rows) => {
                sp.commit().map_err(StoreError::Schema)?;
                (true, rows)
            }
            Err(err) => {
                tracing::warn!(%err, "full-text index unavailable; search will use substring fallback");
                // Dropping the savepoint rolls back only the index work.
                (false, 0)
            }
        }
    };

    tx.commit().map_err(StoreError::Schema)?;
    Ok(SchemaReport {
        version: SCHEMA_VERSION,
        fts_available,
        indexed_rows,
    })
}

fn create_and_rebuild_fts(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS demands_fts USING fts5(id, title, description);",
    )?;
    search::rebuild_index(conn)
}

fn is_duplicate_column(err: &rusqlite::Error) -> bool {
    err.to_string().contains("duplicate column")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)
        .unwrap_or(false)
    }

    #[test]
    fn creates_tables_indexes_and_fts() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = ensure_schema(&mut conn).unwrap();
        assert!(report.fts_available);
        assert_eq!(report.version, SCHEMA_VERSION);
        for name in [
            "demands",
            "weeks",
            "meta_kv",
            "demands_fts",
            "idx_demands_week_status",
            "idx_demands_client_status",
            "idx_demands_sort_order",
            "idx_weeks_key",
        ] {
            assert!(table_exists(&conn, name), "missing {name}");
        }
    }

    #[test]
    fn is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn).unwrap();
        let again = ensure_schema(&mut conn).unwrap();
        assert!(again.fts_available);
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn upgrades_legacy_table_and_repopulates_index() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE demands (
              id TEXT PRIMARY KEY, title TEXT NOT NULL, description TEXT,
              client TEXT NOT NULL, priority TEXT NOT NULL, created_at TEXT NOT NULL,
              status TEXT NOT NULL, week_key TEXT NOT NULL
            );
            INSERT INTO demands VALUES ('d1','Fix login',NULL,'Acme','high',
              '2024-01-02T00:00:00.000Z','open','2024-01-01_2024-01-07');
            "#,
        )
        .unwrap();
        let report = ensure_schema(&mut conn).unwrap();
        assert_eq!(report.indexed_rows, 1);
        let (carried, order): (i64, i64) = conn
            .query_row(
                "SELECT carried_over, sort_order FROM demands WHERE id='d1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((carried, order), (0, 0));
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM demands_fts WHERE demands_fts MATCH 'login'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }

    #[test]
    fn broken_fts_table_degrades_instead_of_failing() {
        let mut conn = Connection::open_in_memory().unwrap();
        // A plain table squatting on the index name makes the rebuild fail.
        conn.execute_batch("CREATE TABLE demands_fts (unrelated TEXT);")
            .unwrap();
        let report = ensure_schema(&mut conn).unwrap();
        assert!(!report.fts_available);
        assert!(table_exists(&conn, "demands"));
    }
}
