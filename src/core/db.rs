use crate::core::error::LedgerError;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub fn db_connect(db_path: &Path) -> Result<Connection, LedgerError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

/// Create (or upgrade) the entity database under the store root.
pub fn initialize_ledger_db(store: &Store) -> Result<(), LedgerError> {
    fs::create_dir_all(&store.root)?;
    let conn = db_connect(&store.entity_db_path())?;
    ensure_schema(&conn)
}

pub(crate) fn ensure_schema(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::LEDGER_DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let current = current.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
    if current >= schemas::LEDGER_SCHEMA_VERSION {
        return Ok(());
    }

    for ddl in [
        schemas::LEDGER_DB_SCHEMA_SESSIONS,
        schemas::LEDGER_DB_SCHEMA_CHECKPOINTS,
        schemas::LEDGER_DB_SCHEMA_GOALS,
        schemas::LEDGER_DB_SCHEMA_GOAL_LINEAGE,
        schemas::LEDGER_DB_SCHEMA_SUBTASKS,
        schemas::LEDGER_DB_SCHEMA_SUBTASK_LOG,
    ] {
        conn.execute(ddl, [])?;
    }
    for ddl in schemas::LEDGER_DB_INDEXES
        .iter()
        .chain(schemas::LEDGER_DB_GUARDS.iter())
    {
        conn.execute(ddl, [])?;
    }

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [schemas::LEDGER_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
