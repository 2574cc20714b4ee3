//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system: each migration is a SQL batch that
//! transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{CacheError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, rockpool_core::now_millis()],
            )?;
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(CacheError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Pool configs, JSON body keyed by pool name
        CREATE TABLE configs (
            name TEXT PRIMARY KEY,
            config TEXT NOT NULL
        );

        -- Head envelopes per pool; the envelope column is the signed JSON
        CREATE TABLE heads (
            pool TEXT NOT NULL,
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            author TEXT NOT NULL,
            ctime INTEGER NOT NULL,
            envelope TEXT NOT NULL,
            PRIMARY KEY (pool, id)
        );
        CREATE INDEX heads_by_ctime ON heads (pool, ctime, id);

        -- Per-channel consumed-up-to cursors
        CREATE TABLE breakpoints (
            pool TEXT NOT NULL,
            channel TEXT NOT NULL,
            ctime INTEGER NOT NULL,
            PRIMARY KEY (pool, channel)
        );

        -- Observed invites; recipients is a JSON array of identity ids
        CREATE TABLE invites (
            pool TEXT NOT NULL,
            ctime INTEGER NOT NULL,
            invite TEXT NOT NULL,
            recipients TEXT NOT NULL,
            UNIQUE (pool, invite) ON CONFLICT REPLACE
        );

        -- Application messages keyed by head id
        CREATE TABLE messages (
            pool TEXT NOT NULL,
            id INTEGER NOT NULL,
            author TEXT NOT NULL,
            message TEXT NOT NULL,
            ctime INTEGER NOT NULL,
            PRIMARY KEY (pool, id)
        );

        -- Per-replica sync cursors, flushed on pool close
        CREATE TABLE cursors (
            pool TEXT NOT NULL,
            replica TEXT NOT NULL,
            id INTEGER NOT NULL,
            PRIMARY KEY (pool, replica)
        );

        -- Verification attempt counts for quarantining bad heads
        CREATE TABLE attempts (
            pool TEXT NOT NULL,
            id INTEGER NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (pool, id)
        );

        -- Known identities and their trust flag
        CREATE TABLE identities (
            id TEXT PRIMARY KEY,
            identity TEXT NOT NULL,
            trusted INTEGER NOT NULL DEFAULT 0
        );

        -- Small local key-value settings
        CREATE TABLE settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
