//! Database schema for the sub-workflow registry.

/// SQL schema for the registry database.
pub const SCHEMA: &str = r"
PRAGMA journal_mode = WAL;

-- One row per sub-workflow run directory key
CREATE TABLE IF NOT EXISTS subworkflows (
    run_dir TEXT PRIMARY KEY NOT NULL,
    retry INTEGER NOT NULL DEFAULT 0,
    dagman_out TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creates_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='subworkflows'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
    }
}
