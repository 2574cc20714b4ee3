//! Pool lifecycle: create, open, close, sub-pools, and access changes.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rockpool_cache::Cache;
use rockpool_core::{IdSource, LocalIdentity, Snowflake};
use rockpool_exchange::{open_exchanger, Exchanger};

use crate::acl::{AccessChange, AccessLevel, AclState};
use crate::config::{define, load_config, Config};
use crate::error::{PoolError, Result};

/// Tunables for a pool instance.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Upper bound for every remote operation; on expiry the replica is
    /// treated as transiently failed.
    pub op_timeout: Duration,
    /// Verification attempts per head id before it is quarantined.
    pub max_attempts: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// A runtime pool: a Config bound to a local identity, with open
/// transports, the replayed ACL, and per-replica sync cursors.
pub struct Pool {
    pub(crate) name: String,
    pub(crate) config: Config,
    pub(crate) me: Arc<LocalIdentity>,
    /// All replicas in preference order: private first.
    pub(crate) readers: Vec<Arc<dyn Exchanger>>,
    /// Publication targets: the public replicas (private ones only when no
    /// public replica is configured).
    pub(crate) writers: Vec<Arc<dyn Exchanger>>,
    pub(crate) acl: RwLock<AclState>,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) ids: Arc<dyn IdSource>,
    pub(crate) sync_lock: tokio::sync::Mutex<()>,
    pub(crate) cancel: CancellationToken,
    pub(crate) settings: PoolSettings,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("name", &self.name).finish()
    }
}

impl Pool {
    /// Create a pool from its defined config: open transports, seed the
    /// ACL with self as Admin, and publish the genesis access head.
    pub async fn create(
        me: Arc<LocalIdentity>,
        cache: Arc<dyn Cache>,
        name: &str,
        apps: &[String],
    ) -> Result<Pool> {
        let mut config = load_config(cache.as_ref(), name).await?;
        if !apps.is_empty() {
            config.apps = apps.to_vec();
            define(cache.as_ref(), &config).await?;
        }

        let pool = Self::assemble(me, cache, config, PoolSettings::default())?;
        pool.set_access(&pool.me.id(), AccessLevel::Admin).await?;
        info!(pool = %pool.name, "pool created");
        Ok(pool)
    }

    /// Open an existing pool: load its config, reach at least one replica,
    /// replay the access heads, and check that self is at least a Reader.
    pub async fn open(
        me: Arc<LocalIdentity>,
        cache: Arc<dyn Cache>,
        name: &str,
    ) -> Result<Pool> {
        let config = load_config(cache.as_ref(), name).await?;
        let pool = Self::assemble(me, cache, config, PoolSettings::default())?;
        pool.load_acl().await?;

        let level = pool.access_of(&pool.me.id());
        if level < AccessLevel::Reader {
            return Err(PoolError::NotAuthorized(format!(
                "{} is not a member of pool '{}'",
                pool.me.id(),
                pool.name
            )));
        }
        info!(pool = %pool.name, ?level, "pool opened");
        Ok(pool)
    }

    fn assemble(
        me: Arc<LocalIdentity>,
        cache: Arc<dyn Cache>,
        config: Config,
        settings: PoolSettings,
    ) -> Result<Pool> {
        let mut readers: Vec<Arc<dyn Exchanger>> = Vec::new();
        let mut publics: Vec<Arc<dyn Exchanger>> = Vec::new();

        for url in config.preferred_urls() {
            match open_exchanger(url) {
                Ok(ex) => {
                    let ex: Arc<dyn Exchanger> = Arc::new(ex);
                    if config.public.contains(url) {
                        publics.push(Arc::clone(&ex));
                    }
                    readers.push(ex);
                }
                Err(e) => warn!(pool = %config.name, %url, "cannot open transport: {e}"),
            }
        }
        if readers.is_empty() {
            return Err(PoolError::Unreachable(format!(
                "no transport of pool '{}' could be opened",
                config.name
            )));
        }
        let writers = if publics.is_empty() {
            readers.clone()
        } else {
            publics
        };

        let ids: Arc<dyn IdSource> = Arc::new(Snowflake::for_identity(&me.id()));
        Ok(Pool {
            name: config.name.clone(),
            config,
            me,
            readers,
            writers,
            acl: RwLock::new(AclState::new()),
            cache,
            ids,
            sync_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            settings,
        })
    }

    /// The pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pool config this instance was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The local identity this pool is bound to.
    pub fn me(&self) -> &LocalIdentity {
        &self.me
    }

    /// The local cache backing this pool.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Allocate the next id from the pool's sequence source.
    pub fn next_id(&self) -> u64 {
        self.ids.next()
    }

    /// The current access level of an identity.
    pub fn access_of(&self, id: &str) -> AccessLevel {
        self.acl.read().unwrap().level(id)
    }

    /// Current members and their levels.
    pub fn members(&self) -> std::collections::BTreeMap<String, AccessLevel> {
        self.acl.read().unwrap().members()
    }

    /// Substitute the id allocator (tests use a deterministic counter).
    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Substitute the settings.
    pub fn with_settings(mut self, settings: PoolSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Substitute the replica set, e.g. with instrumented exchangers.
    pub fn with_exchangers(mut self, exchangers: Vec<Arc<dyn Exchanger>>) -> Self {
        self.readers = exchangers.clone();
        self.writers = exchangers;
        self
    }

    /// Publish an access change: raise, lower, or block an identity.
    ///
    /// Requires Admin (the genesis self-grant on an empty ACL is the one
    /// exception). The change is itself a signed head under `access/<id>`.
    pub async fn set_access(&self, target_id: &str, level: AccessLevel) -> Result<()> {
        let id = self.ids.next();
        let change = AccessChange {
            target_id: target_id.to_string(),
            new_level: level,
        };
        self.acl
            .read()
            .unwrap()
            .validate(id, &self.me.id(), &change)?;

        let body = serde_json::to_vec(&change)?;
        let head = self
            .publish(id, &format!("access/{id}"), body.into(), None)
            .await?;

        if let Err(e) = self
            .acl
            .write()
            .unwrap()
            .apply(id, &head.author_id, change)
        {
            warn!(pool = %self.name, id, "published access change no longer applies: {e}");
        }
        Ok(())
    }

    /// Create a nested pool sharing this pool's transports.
    ///
    /// The name is `parent/#sub`, or the sibling form when this pool is
    /// itself a `#`-pool. The supplied members are seeded as Active.
    pub async fn sub(&self, sub: &str, member_ids: &[String], apps: &[String]) -> Result<Config> {
        let name = match self.name.rsplit_once('/') {
            Some((parent, last)) if last.starts_with('#') => format!("{parent}/#{sub}"),
            _ => format!("{}/#{sub}", self.name),
        };

        let config = Config {
            name: name.clone(),
            public: self.config.public.clone(),
            private: self.config.private.clone(),
            apps: apps.to_vec(),
        };
        define(self.cache.as_ref(), &config).await?;

        let child = Pool::create(
            Arc::clone(&self.me),
            Arc::clone(&self.cache),
            &name,
            apps,
        )
        .await?;
        for id in member_ids {
            child.set_access(id, AccessLevel::Active).await?;
        }
        child.close().await?;

        Ok(config)
    }

    /// Close the pool: cancel in-flight work and release the transports.
    /// Sync cursors are already flushed per sync round.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        for ex in &self.readers {
            if let Err(e) = ex.close().await {
                warn!(pool = %self.name, exchanger = %ex, "close failed: {e}");
            }
        }
        info!(pool = %self.name, "pool closed");
        Ok(())
    }
}
