//! In-memory implementation of the Cache trait.
//!
//! Same semantics as SQLite, no persistence. Primarily for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use rockpool_core::Head;

use crate::error::Result;
use crate::traits::{Cache, StoredIdentity, StoredInvite};

/// In-memory cache implementation. Thread-safe via RwLock.
pub struct MemoryCache {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    configs: BTreeMap<String, String>,
    heads: BTreeMap<(String, u64), Head>,
    breakpoints: HashMap<(String, String), i64>,
    invites: Vec<(String, StoredInvite)>,
    messages: BTreeMap<(String, u64), (String, String, i64)>,
    cursors: HashMap<(String, String), u64>,
    attempts: HashMap<(String, u64), u32>,
    identities: BTreeMap<String, StoredIdentity>,
    settings: HashMap<String, String>,
}

impl MemoryCache {
    /// Create a new empty in-memory cache.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn save_config(&self, name: &str, config: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.configs.insert(name.to_string(), config.to_string());
        Ok(())
    }

    async fn load_config(&self, name: &str) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.configs.get(name).cloned())
    }

    async fn list_configs(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.configs.keys().cloned().collect())
    }

    async fn delete_config(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.configs.remove(name);
        Ok(())
    }

    async fn set_head(&self, pool: &str, head: &Head) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .heads
            .entry((pool.to_string(), head.id))
            .or_insert_with(|| head.clone());
        Ok(())
    }

    async fn get_heads_range(
        &self,
        pool: &str,
        after_id: u64,
        before_id: u64,
        limit: u32,
    ) -> Result<Vec<Head>> {
        let start = after_id.saturating_add(1);
        if start > before_id {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().unwrap();
        let mut heads: Vec<Head> = inner
            .heads
            .range((pool.to_string(), start)..(pool.to_string(), before_id))
            .map(|(_, h)| h.clone())
            .collect();
        if limit > 0 {
            heads.truncate(limit as usize);
        }
        Ok(heads)
    }

    async fn heads_since(&self, pool: &str, after_ctime: i64) -> Result<Vec<Head>> {
        let inner = self.inner.read().unwrap();
        let mut heads: Vec<Head> = inner
            .heads
            .iter()
            .filter(|((p, _), h)| p == pool && h.ctime > after_ctime)
            .map(|(_, h)| h.clone())
            .collect();
        heads.sort_by_key(|h| (h.ctime, h.id));
        Ok(heads)
    }

    async fn max_ctime(&self, pool: &str) -> Result<i64> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .heads
            .iter()
            .filter(|((p, _), _)| p == pool)
            .map(|(_, h)| h.ctime)
            .max()
            .unwrap_or(0))
    }

    async fn set_breakpoint(&self, pool: &str, channel: &str, ctime: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .breakpoints
            .insert((pool.to_string(), channel.to_string()), ctime);
        Ok(())
    }

    async fn get_breakpoint(&self, pool: &str, channel: &str) -> Result<i64> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .breakpoints
            .get(&(pool.to_string(), channel.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn set_invite(&self, pool: &str, invite: &StoredInvite) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .invites
            .retain(|(p, i)| !(p == pool && i.invite == invite.invite));
        inner.invites.push((pool.to_string(), invite.clone()));
        Ok(())
    }

    async fn get_invites(
        &self,
        pool: &str,
        after_ctime: i64,
        only_for: Option<&str>,
    ) -> Result<Vec<StoredInvite>> {
        let inner = self.inner.read().unwrap();
        let mut invites: Vec<StoredInvite> = inner
            .invites
            .iter()
            .filter(|(p, i)| p == pool && i.ctime > after_ctime)
            .filter(|(_, i)| match only_for {
                Some(id) => i.recipients.iter().any(|r| r == id),
                None => true,
            })
            .map(|(_, i)| i.clone())
            .collect();
        invites.sort_by_key(|i| i.ctime);
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
        let mut inner = self.inner.write().unwrap();
        inner
            .messages
            .entry((pool.to_string(), id))
            .or_insert_with(|| (author.to_string(), message.to_string(), ctime));
        Ok(())
    }

    async fn get_messages(
        &self,
        pool: &str,
        after_id: u64,
        before_id: u64,
        limit: u32,
    ) -> Result<Vec<String>> {
        let start = after_id.saturating_add(1);
        if start > before_id {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().unwrap();
        let mut messages: Vec<String> = inner
            .messages
            .range((pool.to_string(), start)..(pool.to_string(), before_id))
            .map(|(_, (_, m, _))| m.clone())
            .collect();
        if limit > 0 {
            messages.truncate(limit as usize);
        }
        Ok(messages)
    }

    async fn set_cursor(&self, pool: &str, replica: &str, id: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .cursors
            .insert((pool.to_string(), replica.to_string()), id);
        Ok(())
    }

    async fn get_cursor(&self, pool: &str, replica: &str) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .cursors
            .get(&(pool.to_string(), replica.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn bump_attempts(&self, pool: &str, id: u64) -> Result<u32> {
        let mut inner = self.inner.write().unwrap();
        let count = inner.attempts.entry((pool.to_string(), id)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn set_identity(&self, id: &str, identity: &str, trusted: bool) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.identities.insert(
            id.to_string(),
            StoredIdentity {
                id: id.to_string(),
                identity: identity.to_string(),
                trusted,
            },
        );
        Ok(())
    }

    async fn get_identity(&self, id: &str) -> Result<Option<StoredIdentity>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.identities.get(id).cloned())
    }

    async fn set_trust(&self, id: &str, trusted: bool) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(identity) = inner.identities.get_mut(id) {
            identity.trusted = trusted;
        }
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<StoredIdentity>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.identities.values().cloned().collect())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.settings.get(key).cloned())
    }
}
