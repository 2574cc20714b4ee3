//! Replica synchronization: discover, verify, and ingest new heads.

use tracing::{debug, info, warn};

use rockpool_core::{Blake3Hash, Head};
use rockpool_exchange::{Exchanger, ListOptions};

use crate::acl::{AccessChange, AccessLevel};
use crate::error::{PoolError, Result};
use crate::pool::Pool;

impl Pool {
    /// Synchronize with every reachable replica, private transports first.
    ///
    /// Idempotent and re-entrant: a per-pool mutex serializes concurrent
    /// calls, and the cache's unique `(pool, id)` key makes re-ingestion a
    /// no-op. Verification failures are logged and skipped; they never
    /// abort a sync. Returns the number of newly ingested heads; fails
    /// only when no replica could be reached at all (or on cache errors,
    /// which are critical).
    pub async fn sync(&self) -> Result<u32> {
        let _guard = self.sync_lock.lock().await;

        let mut ingested = 0u32;
        let mut reachable = 0usize;
        let mut last_err: Option<PoolError> = None;

        for ex in &self.readers {
            match self.sync_replica(ex.as_ref()).await {
                Ok(count) => {
                    ingested += count;
                    reachable += 1;
                }
                Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                Err(PoolError::Cache(e)) => return Err(PoolError::Cache(e)),
                Err(e) => {
                    warn!(pool = %self.name, exchanger = %ex, "replica sync failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        if reachable == 0 {
            return Err(last_err.unwrap_or_else(|| {
                PoolError::Unreachable(format!("no replica of pool '{}'", self.name))
            }));
        }
        if ingested > 0 {
            info!(pool = %self.name, ingested, "sync complete");
        }
        Ok(ingested)
    }

    /// Cached heads strictly newer than `after_ctime`, ordered by
    /// `(ctime, id)`.
    pub async fn list(&self, after_ctime: i64) -> Result<Vec<Head>> {
        Ok(self.cache.heads_since(&self.name, after_ctime).await?)
    }

    async fn sync_replica(&self, ex: &dyn Exchanger) -> Result<u32> {
        let channel = format!("{}/h", self.name);

        let touched = self
            .bounded("touch probe", async {
                Ok::<bool, PoolError>(ex.touched(&channel).await)
            })
            .await?;
        if !touched {
            debug!(pool = %self.name, exchanger = %ex, "replica unchanged");
            return Ok(0);
        }

        let cursor = self.cache.get_cursor(&self.name, &ex.to_string()).await?;
        let entries = self
            .bounded("list heads", ex.read_dir(&channel, ListOptions::default()))
            .await?;

        let mut ids: Vec<u64> = entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| e.name.parse().ok())
            .filter(|id| *id > cursor)
            .collect();
        ids.sort_unstable();

        let mut ingested = 0u32;
        let mut new_cursor = cursor;
        // The cursor only advances across fully resolved heads: a failed
        // head below it would never be retried.
        let mut blocked = false;

        for id in ids {
            if self.cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }
            if self.is_cached(id).await? {
                if !blocked {
                    new_cursor = id;
                }
                continue;
            }

            match self.ingest(ex, id).await {
                Ok(()) => {
                    ingested += 1;
                    if !blocked {
                        new_cursor = id;
                    }
                }
                Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                Err(PoolError::Cache(e)) => return Err(PoolError::Cache(e)),
                Err(e) => {
                    warn!(pool = %self.name, id, exchanger = %ex, "head dropped: {e}");
                    let attempts = self.cache.bump_attempts(&self.name, id).await?;
                    if attempts >= self.settings.max_attempts {
                        warn!(pool = %self.name, id, attempts, "head quarantined");
                        if !blocked {
                            new_cursor = id;
                        }
                    } else {
                        blocked = true;
                    }
                }
            }
        }

        if new_cursor > cursor {
            self.cache
                .set_cursor(&self.name, &ex.to_string(), new_cursor)
                .await?;
        }
        Ok(ingested)
    }

    async fn is_cached(&self, id: u64) -> Result<bool> {
        Ok(self
            .cache
            .get_heads_range(&self.name, id.saturating_sub(1), id.saturating_add(1), 1)
            .await?
            .iter()
            .any(|h| h.id == id))
    }

    /// Fetch, verify, and ingest a single head from one replica.
    ///
    /// Checks, in order: envelope/key id binding, signature against the
    /// claimed author id, then access rights. Access-change heads are
    /// validated against the ACL replayed up to but excluding their id and
    /// applied; content heads require the author to hold at least Reader
    /// as of their id.
    async fn ingest(&self, ex: &dyn Exchanger, id: u64) -> Result<()> {
        let envelope = self
            .bounded("read envelope", ex.read(&format!("{}/h/{id}", self.name), None))
            .await?;
        let head = Head::from_json(&envelope)?;

        if head.id != id {
            return Err(PoolError::Corrupt(id));
        }
        head.verify()?;

        if head.is_access_change() {
            let body = self
                .bounded("read access body", ex.read(&format!("{}/{id}", self.name), None))
                .await?;
            if Blake3Hash::hash(&body) != head.hash {
                return Err(PoolError::Corrupt(id));
            }
            let change: AccessChange = serde_json::from_slice(&body)
                .map_err(|e| PoolError::Internal(format!("malformed access change: {e}")))?;
            self.acl
                .write()
                .unwrap()
                .apply(id, &head.author_id, change)?;
        } else {
            let level = self
                .acl
                .read()
                .unwrap()
                .level_before(&head.author_id, id);
            if level < AccessLevel::Reader {
                return Err(PoolError::NotAuthorized(format!(
                    "author {} had {level:?} as of head {id}",
                    head.author_id
                )));
            }
        }

        self.cache.set_head(&self.name, &head).await?;
        debug!(pool = %self.name, id, name = %head.name, "head ingested");
        Ok(())
    }

    /// Replay the pool's access heads from the first replica that serves
    /// them. Invalid entries are skipped; they do not abort the replay.
    pub(crate) async fn load_acl(&self) -> Result<()> {
        let dir = format!("{}/access", self.name);
        let mut last_err: Option<PoolError> = None;

        for ex in &self.readers {
            let entries = match self
                .bounded("list access heads", ex.read_dir(&dir, ListOptions::default()))
                .await
            {
                Ok(entries) => entries,
                Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                Err(e) => {
                    warn!(pool = %self.name, exchanger = %ex, "access listing failed: {e}");
                    last_err = Some(e);
                    continue;
                }
            };

            let mut ids: Vec<u64> = entries
                .iter()
                .filter(|e| !e.is_dir)
                .filter_map(|e| e.name.parse().ok())
                .collect();
            ids.sort_unstable();

            for id in ids {
                match self.ingest(ex.as_ref(), id).await {
                    Ok(()) => {}
                    Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                    Err(e) => warn!(pool = %self.name, id, "access head skipped: {e}"),
                }
            }
            return Ok(());
        }

        Err(last_err
            .unwrap_or_else(|| PoolError::Unreachable(format!("no replica of pool '{}'", self.name))))
    }
}
