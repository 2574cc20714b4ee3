//! Head publication and body retrieval.

use bytes::Bytes;
use std::future::Future;

use tracing::{debug, warn};

use rockpool_core::head::Meta;
use rockpool_core::{Blake3Hash, Head, HeadBuilder};
use rockpool_exchange::Exchanger;

use crate::acl::AccessLevel;
use crate::error::{PoolError, Result};
use crate::pool::Pool;

impl Pool {
    /// Run a remote operation under the pool's cancellation token and
    /// per-operation time budget.
    pub(crate) async fn bounded<T, E, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        PoolError: From<E>,
    {
        if self.cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PoolError::Cancelled),
            done = tokio::time::timeout(self.settings.op_timeout, fut) => match done {
                Err(_) => Err(PoolError::Timeout(what.to_string())),
                Ok(result) => result.map_err(PoolError::from),
            },
        }
    }

    /// Publish an opaque body under a namespaced logical name.
    ///
    /// Allocates the next snowflake id, hashes the body, signs the head,
    /// and writes body + envelope to every reachable publication replica.
    /// At least one replica must accept the write.
    pub async fn send(&self, name: &str, body: Bytes, meta: Option<Meta>) -> Result<Head> {
        if name.starts_with("access/") {
            return Err(PoolError::NotAuthorized(
                "access changes are published via set_access".into(),
            ));
        }
        let level = self.access_of(&self.me.id());
        if level < AccessLevel::Active {
            return Err(PoolError::NotAuthorized(format!(
                "publishing to '{}' requires Active access, have {level:?}",
                self.name
            )));
        }

        let id = self.ids.next();
        self.publish(id, name, body, meta).await
    }

    /// Build, sign, and fan out a head. Internal: access checks are the
    /// caller's responsibility.
    pub(crate) async fn publish(
        &self,
        id: u64,
        name: &str,
        body: Bytes,
        meta: Option<Meta>,
    ) -> Result<Head> {
        let hash = Blake3Hash::hash(&body);
        let mut builder = HeadBuilder::new(id, name)
            .size(body.len() as i64)
            .hash(hash);
        if let Some(meta) = meta {
            builder = builder.meta(meta);
        }
        let head = builder.sign(&self.me)?;
        let envelope = Bytes::from(head.to_json()?);

        let mut delivered = 0usize;
        for ex in &self.writers {
            match self.publish_on(ex.as_ref(), &head, &body, &envelope).await {
                Ok(()) => delivered += 1,
                Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                Err(e) => {
                    warn!(pool = %self.name, id, exchanger = %ex, "publish failed: {e}");
                }
            }
        }
        if delivered == 0 {
            return Err(PoolError::Unreachable(format!(
                "head {id} of pool '{}' was not delivered to any replica",
                self.name
            )));
        }

        // Update the local cache so the next sync does not re-ingest it.
        self.cache.set_head(&self.name, &head).await?;
        debug!(pool = %self.name, id, name, delivered, "head published");
        Ok(head)
    }

    async fn publish_on(
        &self,
        ex: &dyn Exchanger,
        head: &Head,
        body: &Bytes,
        envelope: &Bytes,
    ) -> Result<()> {
        let id = head.id;
        self.bounded("write body", ex.write(&format!("{}/{id}", self.name), body.clone()))
            .await?;
        self.bounded(
            "write envelope",
            ex.write(&format!("{}/h/{id}", self.name), envelope.clone()),
        )
        .await?;
        if head.is_access_change() {
            // Duplicated under access/ for cheap membership discovery.
            self.bounded(
                "write access envelope",
                ex.write(&format!("{}/access/{id}", self.name), envelope.clone()),
            )
            .await?;
        }
        self.bounded(
            "touch",
            ex.write(&format!("{}/h.touch", self.name), Bytes::new()),
        )
        .await?;
        Ok(())
    }

    /// Stream the body of a cached head from the first replica that has an
    /// intact copy. A digest mismatch is reported as `Corrupt` and the
    /// next replica is probed.
    pub async fn receive(&self, id: u64) -> Result<Bytes> {
        let head = self
            .cache
            .get_heads_range(&self.name, id.saturating_sub(1), id.saturating_add(1), 1)
            .await?
            .into_iter()
            .find(|h| h.id == id)
            .ok_or_else(|| PoolError::NotExist(format!("head {id} of pool '{}'", self.name)))?;

        let key = format!("{}/{id}", self.name);
        let mut last_err = PoolError::NotExist(key.clone());
        for ex in &self.readers {
            match self.bounded("read body", ex.read(&key, None)).await {
                Ok(body) => {
                    if Blake3Hash::hash(&body) == head.hash {
                        return Ok(body);
                    }
                    warn!(pool = %self.name, id, exchanger = %ex, "body digest mismatch");
                    last_err = PoolError::Corrupt(id);
                }
                Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                Err(e) => {
                    debug!(pool = %self.name, id, exchanger = %ex, "body not served: {e}");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}
