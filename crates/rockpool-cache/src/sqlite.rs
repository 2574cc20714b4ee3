//! SQLite implementation of the Cache trait.
//!
//! The primary backend. Uses rusqlite with bundled SQLite behind a mutex;
//! statements are short and indexed so contention stays negligible.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use rockpool_core::Head;

use crate::error::{CacheError, Result};
use crate::migration;
use crate::traits::{Cache, StoredIdentity, StoredInvite};

/// SQLite-based cache implementation.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open a SQLite database at the given path, creating and migrating
    /// it as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database. Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            CacheError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {e}")),
            ))
        })?;
        f(&conn)
    }
}

/// Clamp a caller-supplied u64 bound into SQLite's i64 space.
fn as_i64(id: u64) -> i64 {
    id.min(i64::MAX as u64) as i64
}

/// Translate `0 = unlimited` into SQLite's `LIMIT -1`.
fn as_limit(limit: u32) -> i64 {
    if limit == 0 {
        -1
    } else {
        i64::from(limit)
    }
}

fn row_to_head(envelope: String) -> rusqlite::Result<Head> {
    Head::from_json(envelope.as_bytes()).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })
}

#[async_trait]
impl Cache for SqliteCache {
    async fn save_config(&self, name: &str, config: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO configs (name, config) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET config = excluded.config",
                params![name, config],
            )?;
            Ok(())
        })
    }

    async fn load_config(&self, name: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT config FROM configs WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    async fn list_configs(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM configs ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        })
    }

    async fn delete_config(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM configs WHERE name = ?1", params![name])?;
            Ok(())
        })
    }

    async fn set_head(&self, pool: &str, head: &Head) -> Result<()> {
        let envelope = String::from_utf8(head.to_json()?)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        debug!(pool, id = head.id, name = %head.name, "cache head");
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO heads (pool, id, name, author, ctime, envelope)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![pool, as_i64(head.id), head.name, head.author_id, head.ctime, envelope],
            )?;
            Ok(())
        })
    }

    async fn get_heads_range(
        &self,
        pool: &str,
        after_id: u64,
        before_id: u64,
        limit: u32,
    ) -> Result<Vec<Head>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT envelope FROM heads
                 WHERE pool = ?1 AND id > ?2 AND id < ?3
                 ORDER BY id LIMIT ?4",
            )?;
            let heads = stmt
                .query_map(
                    params![pool, as_i64(after_id), as_i64(before_id), as_limit(limit)],
                    |row| row_to_head(row.get(0)?),
                )?
                .collect::<rusqlite::Result<Vec<Head>>>()?;
            Ok(heads)
        })
    }

    async fn heads_since(&self, pool: &str, after_ctime: i64) -> Result<Vec<Head>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT envelope FROM heads
                 WHERE pool = ?1 AND ctime > ?2
                 ORDER BY ctime, id",
            )?;
            let heads = stmt
                .query_map(params![pool, after_ctime], |row| row_to_head(row.get(0)?))?
                .collect::<rusqlite::Result<Vec<Head>>>()?;
            Ok(heads)
        })
    }

    async fn max_ctime(&self, pool: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(MAX(ctime), 0) FROM heads WHERE pool = ?1",
                params![pool],
                |row| row.get(0),
            )?)
        })
    }

    async fn set_breakpoint(&self, pool: &str, channel: &str, ctime: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO breakpoints (pool, channel, ctime) VALUES (?1, ?2, ?3)
                 ON CONFLICT(pool, channel) DO UPDATE SET ctime = excluded.ctime",
                params![pool, channel, ctime],
            )?;
            Ok(())
        })
    }

    async fn get_breakpoint(&self, pool: &str, channel: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT ctime FROM breakpoints WHERE pool = ?1 AND channel = ?2",
                    params![pool, channel],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0))
        })
    }

    async fn set_invite(&self, pool: &str, invite: &StoredInvite) -> Result<()> {
        let recipients = serde_json::to_string(&invite.recipients)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO invites (pool, ctime, invite, recipients) VALUES (?1, ?2, ?3, ?4)",
                params![pool, invite.ctime, invite.invite, recipients],
            )?;
            Ok(())
        })
    }

    async fn get_invites(
        &self,
        pool: &str,
        after_ctime: i64,
        only_for: Option<&str>,
    ) -> Result<Vec<StoredInvite>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ctime, invite, recipients FROM invites
                 WHERE pool = ?1 AND ctime > ?2 ORDER BY ctime",
            )?;
            let rows = stmt
                .query_map(params![pool, after_ctime], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut invites = Vec::with_capacity(rows.len());
        for (ctime, invite, recipients) in rows {
            let recipients: Vec<String> = serde_json::from_str(&recipients)?;
            if let Some(id) = only_for {
                if !recipients.iter().any(|r| r == id) {
                    continue;
                }
            }
            invites.push(StoredInvite { ctime, invite, recipients });
        }
        Ok(invites)
    }

    async fn set_message(
        &self,
        pool: &str,
        id: u64,
        author: &str,
        message: &str,
        ctime: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO messages (pool, id, author, message, ctime)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![pool, as_i64(id), author, message, ctime],
            )?;
            Ok(())
        })
    }

    async fn get_messages(
        &self,
        pool: &str,
        after_id: u64,
        before_id: u64,
        limit: u32,
    ) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message FROM messages
                 WHERE pool = ?1 AND id > ?2 AND id < ?3
                 ORDER BY id LIMIT ?4",
            )?;
            let messages = stmt
                .query_map(
                    params![pool, as_i64(after_id), as_i64(before_id), as_limit(limit)],
                    |row| row.get(0),
                )?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(messages)
        })
    }

    async fn set_cursor(&self, pool: &str, replica: &str, id: u64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cursors (pool, replica, id) VALUES (?1, ?2, ?3)
                 ON CONFLICT(pool, replica) DO UPDATE SET id = excluded.id",
                params![pool, replica, as_i64(id)],
            )?;
            Ok(())
        })
    }

    async fn get_cursor(&self, pool: &str, replica: &str) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id FROM cursors WHERE pool = ?1 AND replica = ?2",
                    params![pool, replica],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .unwrap_or(0) as u64)
        })
    }

    async fn bump_attempts(&self, pool: &str, id: u64) -> Result<u32> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attempts (pool, id, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(pool, id) DO UPDATE SET count = count + 1",
                params![pool, as_i64(id)],
            )?;
            Ok(conn.query_row(
                "SELECT count FROM attempts WHERE pool = ?1 AND id = ?2",
                params![pool, as_i64(id)],
                |row| row.get(0),
            )?)
        })
    }

    async fn set_identity(&self, id: &str, identity: &str, trusted: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO identities (id, identity, trusted) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET identity = excluded.identity,
                                               trusted = excluded.trusted",
                params![id, identity, trusted],
            )?;
            Ok(())
        })
    }

    async fn get_identity(&self, id: &str) -> Result<Option<StoredIdentity>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, identity, trusted FROM identities WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(StoredIdentity {
                            id: row.get(0)?,
                            identity: row.get(1)?,
                            trusted: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    async fn set_trust(&self, id: &str, trusted: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE identities SET trusted = ?2 WHERE id = ?1",
                params![id, trusted],
            )?;
            Ok(())
        })
    }

    async fn list_identities(&self) -> Result<Vec<StoredIdentity>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, identity, trusted FROM identities ORDER BY id")?;
            let identities = stmt
                .query_map([], |row| {
                    Ok(StoredIdentity {
                        id: row.get(0)?,
                        identity: row.get(1)?,
                        trusted: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(identities)
        })
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }
}
