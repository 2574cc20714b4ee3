//! The process-wide session and public pool operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rockpool_cache::{Cache, SqliteCache};
use rockpool_core::{Base64Bytes, Identity, LocalIdentity};
use rockpool_invite::Invite;
use rockpool_pool::{define, list_pools, AccessLevel, Config, Pool};

use crate::error::{Error, Result};

/// The started session: cache, self identity, and open pool handles.
pub(crate) struct Session {
    pub cache: Arc<dyn Cache>,
    pub me: Arc<LocalIdentity>,
    pools: tokio::sync::RwLock<HashMap<String, Arc<Pool>>>,
}

static SESSION: RwLock<Option<Arc<Session>>> = RwLock::new(None);

/// Persisted form of the local identity seeds.
#[derive(Serialize, Deserialize)]
struct SelfRecord {
    sign: Base64Bytes,
    agree: Base64Bytes,
    nick: String,
}

const SELF_KEY: &str = "self.identity";

impl Session {
    /// Get an open pool handle, opening it on first use.
    pub async fn pool(&self, name: &str) -> Result<Arc<Pool>> {
        if let Some(pool) = self.pools.read().await.get(name) {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(
            Pool::open(Arc::clone(&self.me), Arc::clone(&self.cache), name).await?,
        );
        self.pools
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&pool));
        Ok(pool)
    }

    pub async fn adopt(&self, pool: Pool) -> Arc<Pool> {
        let pool = Arc::new(pool);
        self.pools
            .write()
            .await
            .insert(pool.name().to_string(), Arc::clone(&pool));
        pool
    }
}

pub(crate) fn session() -> Result<Arc<Session>> {
    SESSION
        .read()
        .unwrap()
        .as_ref()
        .map(Arc::clone)
        .ok_or(Error::NotStarted)
}

/// Start the session: open (or create) the local database at `db_path`
/// and load the local identity, generating and persisting it on first run.
pub async fn start(db_path: &str) -> Result<()> {
    let cache: Arc<dyn Cache> = Arc::new(SqliteCache::open(db_path)?);
    let me = load_or_create_identity(cache.as_ref()).await?;

    info!(id = %me.id(), nick = me.nick(), "session started");
    let session = Session {
        cache,
        me: Arc::new(me),
        pools: tokio::sync::RwLock::new(HashMap::new()),
    };
    *SESSION.write().unwrap() = Some(Arc::new(session));
    Ok(())
}

/// Stop the session: close every open pool and drop the handles.
pub async fn stop() -> Result<()> {
    let session = { SESSION.write().unwrap().take() };
    if let Some(session) = session {
        let pools = session.pools.write().await;
        for pool in pools.values() {
            let _ = pool.close().await;
        }
    }
    Ok(())
}

async fn load_or_create_identity(cache: &dyn Cache) -> Result<LocalIdentity> {
    if let Some(json) = cache.get_setting(SELF_KEY).await? {
        let record: SelfRecord = serde_json::from_str(&json)?;
        let sign: [u8; 32] = record
            .sign
            .as_slice()
            .try_into()
            .map_err(|_| Error::Internal("persisted identity is malformed".into()))?;
        let agree: [u8; 32] = record
            .agree
            .as_slice()
            .try_into()
            .map_err(|_| Error::Internal("persisted identity is malformed".into()))?;
        return Ok(LocalIdentity::from_seeds(&sign, &agree, record.nick));
    }

    let me = LocalIdentity::new(whoami());
    let (sign, agree) = me.seeds();
    let record = SelfRecord {
        sign: Base64Bytes::new(sign.to_vec()),
        agree: Base64Bytes::new(agree.to_vec()),
        nick: me.nick().to_string(),
    };
    cache
        .set_setting(SELF_KEY, &serde_json::to_string(&record)?)
        .await?;

    let identity_json = serde_json::to_string(&me.public())?;
    cache.set_identity(&me.id(), &identity_json, true).await?;
    Ok(me)
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "me".to_string())
}

/// The public form of the local identity.
pub async fn self_identity() -> Result<Identity> {
    Ok(session()?.me.public())
}

/// A serializable snapshot of an open pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolView {
    pub config: Config,
    pub self_id: String,
    pub access: i8,
    /// Current members and their levels.
    pub members: BTreeMap<String, i8>,
}

/// An update notification for one pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub pool: String,
    pub ctime: i64,
    pub count: u32,
}

/// Define and create a pool from a config, becoming its first Admin.
pub async fn create_pool(config: Config, apps: &[String]) -> Result<()> {
    let session = session()?;
    define(session.cache.as_ref(), &config).await?;
    let pool = Pool::create(
        Arc::clone(&session.me),
        Arc::clone(&session.cache),
        &config.name,
        apps,
    )
    .await?;
    session.adopt(pool).await;
    Ok(())
}

/// Join a pool from an invite token: validate, persist the carried
/// config, and trust the sender. Returns the joined config.
pub async fn join_pool(token: &str) -> Result<Config> {
    let session = session()?;
    let invite = rockpool_invite::decode(&session.me, session.cache.as_ref(), token).await?;
    Ok(invite.join(session.cache.as_ref()).await?)
}

/// A snapshot of a pool: config, own access, current members.
pub async fn get_pool(name: &str) -> Result<PoolView> {
    let session = session()?;
    let pool = session.pool(name).await?;

    let members = pool
        .members()
        .into_iter()
        .map(|(id, level)| (id, i8::from(level)))
        .collect();
    Ok(PoolView {
        config: pool.config().clone(),
        self_id: session.me.id(),
        access: i8::from(pool.access_of(&session.me.id())),
        members,
    })
}

/// Names of every defined pool.
pub async fn pool_list() -> Result<Vec<String>> {
    let session = session()?;
    Ok(list_pools(session.cache.as_ref()).await?)
}

/// Decode and verify an invite token without joining. The sender comes
/// from the trust store when known there.
pub async fn validate_invite(token: &str) -> Result<Invite> {
    let session = session()?;
    Ok(rockpool_invite::decode(&session.me, session.cache.as_ref(), token).await?)
}

/// Encode an invite token for the given recipients of one of our pools.
pub async fn invite_to_pool(
    pool_name: &str,
    recipient_ids: &[String],
    subject: &str,
) -> Result<String> {
    let session = session()?;
    let pool = session.pool(pool_name).await?;
    if pool.access_of(&session.me.id()) < AccessLevel::Admin {
        return Err(Error::Pool(rockpool_pool::PoolError::NotAuthorized(
            format!("inviting to '{pool_name}' requires Admin"),
        )));
    }

    let invite = Invite {
        subject: subject.to_string(),
        sender: session.me.public(),
        recipient_ids: recipient_ids.to_vec(),
        config: Some(pool.config().clone()),
    };
    Ok(rockpool_invite::encode(&invite, &session.me)?)
}

/// A known identity and its trust flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub identity: Identity,
    pub trusted: bool,
}

/// Every identity in the trust store.
pub async fn list_identities() -> Result<Vec<Contact>> {
    let session = session()?;

    let mut contacts = Vec::new();
    for stored in session.cache.list_identities().await? {
        match serde_json::from_str::<Identity>(&stored.identity) {
            Ok(identity) => contacts.push(Contact {
                identity,
                trusted: stored.trusted,
            }),
            Err(e) => warn!(id = %stored.id, "stored identity unreadable: {e}"),
        }
    }
    Ok(contacts)
}

/// Flip the trust flag of a known identity (distrust a contact, or trust
/// one observed through a third-party invite).
pub async fn set_trust(id: &str, trusted: bool) -> Result<()> {
    let session = session()?;
    session.cache.set_trust(id, trusted).await?;
    Ok(())
}

/// Pools with cached heads newer than `since_ctime`.
pub async fn get_updates(since_ctime: i64) -> Result<Vec<Notification>> {
    let session = session()?;
    let mut updates = Vec::new();

    for name in list_pools(session.cache.as_ref()).await? {
        let ctime = session.cache.max_ctime(&name).await?;
        if ctime > since_ctime {
            let count = session.cache.heads_since(&name, since_ctime).await?.len() as u32;
            updates.push(Notification { pool: name, ctime, count });
        }
    }
    Ok(updates)
}
