use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // In-memory databases and fresh files legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS crystals (
            stimulus_key TEXT PRIMARY KEY,
            mode         TEXT NOT NULL,
            confidence   REAL NOT NULL,
            pulse        TEXT NOT NULL,
            created_at   INTEGER NOT NULL,
            hits         INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS trace_log (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id    TEXT NOT NULL,
            timestamp     REAL NOT NULL,
            stimulus_key  TEXT NOT NULL,
            mode          TEXT NOT NULL,
            confidence    REAL NOT NULL,
            field_density INTEGER NOT NULL,
            source        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS field_nodes (
            scale       INTEGER NOT NULL,
            depth       INTEGER NOT NULL,
            digest      INTEGER NOT NULL,
            coordinates TEXT NOT NULL,
            vivacity    REAL NOT NULL,
            occupancy   INTEGER NOT NULL,
            adjacency   REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (scale, depth, digest)
        );

        CREATE INDEX IF NOT EXISTS idx_trace_session ON trace_log(session_id);
        CREATE INDEX IF NOT EXISTS idx_trace_mode ON trace_log(mode);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        for table in &["metadata", "crystals", "trace_log", "field_nodes"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            if *table == "metadata" {
                assert_eq!(count, 1);
            } else {
                assert_eq!(count, 0, "{table} should start empty");
            }
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }
}
