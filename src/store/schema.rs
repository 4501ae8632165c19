//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(TABLES_SCHEMA)?;
    conn.execute_batch(INDEXES_SCHEMA)?;
    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, _from_version: i32) -> Result<()> {
    // Migration steps go here as the schema evolves
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

const TABLES_SCHEMA: &str = r#"
-- Staking circles
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    creator TEXT NOT NULL,
    invite_code TEXT NOT NULL UNIQUE,
    entry_stake REAL NOT NULL,
    created_at INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

-- Participants; external_id links to the social platform and may be absent
CREATE TABLE IF NOT EXISTS members (
    id TEXT PRIMARY KEY NOT NULL,
    group_id TEXT NOT NULL,
    external_id TEXT,
    handle TEXT,
    display_name TEXT NOT NULL DEFAULT '',
    avatar_url TEXT,
    joined_at INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    FOREIGN KEY (group_id) REFERENCES groups(id)
);

-- Rules; kind-specific config is a JSON column
CREATE TABLE IF NOT EXISTS rules (
    id TEXT PRIMARY KEY NOT NULL,
    group_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    label TEXT NOT NULL,
    config TEXT NOT NULL,
    penalty REAL NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    FOREIGN KEY (group_id) REFERENCES groups(id)
);

-- Recorded infractions; never deleted, status moves forward only
CREATE TABLE IF NOT EXISTS violations (
    id TEXT PRIMARY KEY NOT NULL,
    group_id TEXT NOT NULL,
    member_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    source_post_id TEXT,
    source_post_text TEXT,
    detail TEXT NOT NULL DEFAULT '',
    detected_at INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    settlement_ref TEXT,
    FOREIGN KEY (group_id) REFERENCES groups(id),
    FOREIGN KEY (member_id) REFERENCES members(id),
    FOREIGN KEY (rule_id) REFERENCES rules(id)
);

-- Last successfully completed scan per group
CREATE TABLE IF NOT EXISTS watermarks (
    group_id TEXT PRIMARY KEY NOT NULL,
    last_scan_at INTEGER NOT NULL,
    FOREIGN KEY (group_id) REFERENCES groups(id)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_members_group ON members(group_id);
CREATE INDEX IF NOT EXISTS idx_rules_group ON rules(group_id);
CREATE INDEX IF NOT EXISTS idx_violations_group ON violations(group_id, detected_at);

-- Backstop for the post-scoped idempotency invariant; the store also
-- read-checks before inserting
CREATE UNIQUE INDEX IF NOT EXISTS idx_violations_source
    ON violations(member_id, rule_id, source_post_id)
    WHERE source_post_id IS NOT NULL;
"#;
