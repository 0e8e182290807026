use rusqlite::Connection;
use tracing::debug;

/// Current schema version.  Increment when adding new migrations.
const SCHEMA_VERSION: u32 = 1;

/// Apply all pending migrations to `conn`.
///
/// Migrations are idempotent: tables are created with `IF NOT EXISTS` and the
/// `meta` table tracks which version has been applied so we only run new ones.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    // WAL keeps readers unblocked while a store call is writing. In-memory
    // databases report "memory" here, which is fine.
    conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    let current_version = get_schema_version(conn)?;

    if current_version >= SCHEMA_VERSION {
        debug!(version = current_version, "memory schema up to date");
        return Ok(());
    }

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    debug!(version = SCHEMA_VERSION, "memory schema migrated");
    Ok(())
}

// ---------------------------------------------------------------------------
// v1: initial tables
// ---------------------------------------------------------------------------

fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    // One row per chunk. `seq` records insertion order and breaks distance
    // ties; `id` is the public key handed back to callers.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT    NOT NULL UNIQUE,
            content     TEXT    NOT NULL,
            metadata    TEXT    NOT NULL DEFAULT '{}',
            embedding   BLOB    NOT NULL,
            model       TEXT    NOT NULL,
            dimensions  INTEGER NOT NULL,
            created_at  TEXT    NOT NULL
        );",
    )?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(value.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [version.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'memories'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = "INSERT INTO memories (id, content, embedding, model, dimensions, created_at)
                      VALUES ('a', 'x', x'00', 'm', 1, 'now')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
