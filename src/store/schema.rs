// SQLite schema for the structured index

use rusqlite::{Connection, Result};
use tracing::{debug, info};

/// Schema version of the structured store
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema, applying migrations as needed
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    debug!("Current schema version: {}", current_version);

    if current_version < SCHEMA_VERSION {
        info!("Upgrading schema from v{} to v{}", current_version, SCHEMA_VERSION);
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        match version {
            1 => create_v1_schema(conn)?,
            _ => unreachable!("Unknown schema version: {}", version),
        }

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

fn create_v1_schema(conn: &Connection) -> Result<()> {
    debug!("Creating v1 schema tables");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS elements (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            content TEXT NOT NULL,
            language TEXT NOT NULL,
            parent_id TEXT,
            children_ids TEXT NOT NULL DEFAULT '[]',
            signature TEXT,
            docstring TEXT,
            dependencies TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_elements_file_path
         ON elements(file_path)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_elements_kind
         ON elements(kind)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_elements_name
         ON elements(name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_elements_language
         ON elements(language)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_elements_parent
         ON elements(parent_id)",
        [],
    )?;

    // Single-row project manifest
    conn.execute(
        "CREATE TABLE IF NOT EXISTS manifest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            root_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            total_elements INTEGER NOT NULL DEFAULT 0,
            file_count INTEGER NOT NULL DEFAULT 0,
            languages TEXT NOT NULL DEFAULT '{}'
        )",
        [],
    )?;

    Ok(())
}

/// Drop all tables (used by clean and by tests)
pub fn drop_schema(conn: &Connection) -> Result<()> {
    conn.execute("DROP TABLE IF EXISTS schema_version", [])?;
    conn.execute("DROP TABLE IF EXISTS manifest", [])?;
    conn.execute("DROP TABLE IF EXISTS elements", [])?;
    Ok(())
}
