//! Invites: joining pools and the in-pool re-invite flow.

use serde::{Deserialize, Serialize};
use tracing::warn;

use rockpool_cache::{Cache, StoredInvite};
use rockpool_core::Identity;
use rockpool_pool::{define, Config, Pool};

use crate::error::{InviteError, Result};

/// A decoded invitation.
///
/// `config` is present only when the invite was addressed to us; a
/// third-party invite keeps its outer fields for UI listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    /// Human-readable subject line.
    pub subject: String,

    /// The sender's public identity.
    pub sender: Identity,

    /// Ids the carried config was sealed for.
    #[serde(default)]
    pub recipient_ids: Vec<String>,

    /// The pool config, when we could unseal it.
    #[serde(default)]
    pub config: Option<Config>,
}

impl Invite {
    /// Whether the invite is addressed to the given identity id.
    pub fn is_for(&self, id: &str) -> bool {
        self.recipient_ids.iter().any(|r| r == id)
    }

    /// Accept the invite: validate and persist the carried config, and
    /// record + trust the sender. The pool is then joinable with
    /// [`Pool::open`].
    pub async fn join(&self, cache: &dyn Cache) -> Result<Config> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| InviteError::NotAuthorized("invite carries no config for us".into()))?;
        if config.name.is_empty() || (config.public.is_empty() && config.private.is_empty()) {
            return Err(InviteError::InvalidToken(format!(
                "carried config '{}' names no transports",
                config.name
            )));
        }

        let sender_json = serde_json::to_string(&self.sender)
            .map_err(|e| InviteError::InvalidToken(e.to_string()))?;
        cache
            .set_identity(&self.sender.id(), &sender_json, true)
            .await?;

        define(cache, &config).await?;
        Ok(config)
    }
}

/// Republish an invite inside a pool (the re-invite flow), under an
/// `invite/<id>` head.
pub async fn add(pool: &Pool, invite: &Invite) -> Result<()> {
    let body =
        serde_json::to_vec(invite).map_err(|e| InviteError::InvalidToken(e.to_string()))?;
    let name = format!("invite/{}", pool.next_id());
    pool.send(&name, body.into(), None).await?;
    Ok(())
}

/// Sync the pool, ingest invite heads past the `invite` breakpoint into
/// the cache, and return cached invites newer than `after_ctime`,
/// optionally only those addressed to us.
pub async fn receive(pool: &Pool, after_ctime: i64, only_mine: bool) -> Result<Vec<Invite>> {
    if let Err(e) = pool.sync().await {
        warn!(pool = %pool.name(), "sync before invite scan failed: {e}");
    }

    let cache = pool.cache();
    let mut breakpoint = cache.get_breakpoint(pool.name(), "invite").await?;

    for head in pool.list(breakpoint).await? {
        if head.name.starts_with("invite/") {
            if let Err(e) = accept(pool, cache.as_ref(), head.id, head.ctime).await {
                warn!(pool = %pool.name(), id = head.id, "invite head skipped: {e}");
            }
        }
        breakpoint = head.ctime;
    }
    cache
        .set_breakpoint(pool.name(), "invite", breakpoint)
        .await?;

    let me = pool.me().id();
    let stored = cache
        .get_invites(pool.name(), after_ctime, only_mine.then_some(me.as_str()))
        .await?;

    let mut invites = Vec::with_capacity(stored.len());
    for s in stored {
        match serde_json::from_str::<Invite>(&s.invite) {
            Ok(invite) => invites.push(invite),
            Err(e) => warn!(pool = %pool.name(), "cached invite unreadable: {e}"),
        }
    }
    Ok(invites)
}

async fn accept(pool: &Pool, cache: &dyn Cache, id: u64, ctime: i64) -> Result<()> {
    let body = pool.receive(id).await?;
    let invite: Invite = serde_json::from_slice(&body)
        .map_err(|e| InviteError::InvalidToken(e.to_string()))?;

    let stored = StoredInvite {
        ctime,
        invite: serde_json::to_string(&invite)
            .map_err(|e| InviteError::InvalidToken(e.to_string()))?,
        recipients: invite.recipient_ids.clone(),
    };
    cache.set_invite(pool.name(), &stored).await?;
    Ok(())
}
