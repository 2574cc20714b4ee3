//! Chat glue: ordered messages as opaque bodies under `chat/<id>` heads.

use serde::{Deserialize, Serialize};
use tracing::warn;

use rockpool_core::Base64Bytes;
use rockpool_pool::Pool;

use crate::api::session;
use crate::error::Result;

/// A chat message as stored in a head body and in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message id (also the tail of the head name `chat/<id>`).
    pub id: u64,

    /// Author identity id. Taken from the verified head on ingest, never
    /// from the body.
    #[serde(default)]
    pub author: String,

    /// MIME type of the content.
    pub content_type: String,

    /// Text content.
    #[serde(default)]
    pub text: String,

    /// Binary content (base64 in JSON).
    #[serde(default, skip_serializing_if = "Base64Bytes::is_empty")]
    pub binary: Base64Bytes,

    /// Creation time in Unix milliseconds.
    pub ctime: i64,
}

/// Post a message to a pool's chat channel. Returns the message id.
pub async fn post_message(
    pool_name: &str,
    content_type: &str,
    text: &str,
    binary: Vec<u8>,
) -> Result<u64> {
    let session = session()?;
    let pool = session.pool(pool_name).await?;

    let id = pool.next_id();
    let message = Message {
        id,
        author: session.me.id(),
        content_type: content_type.to_string(),
        text: text.to_string(),
        binary: Base64Bytes::new(binary),
        ctime: rockpool_core::now_millis(),
    };
    let body = serde_json::to_vec(&message)?;
    let head = pool
        .send(&format!("chat/{id}"), body.into(), None)
        .await?;

    session
        .cache
        .set_message(pool_name, id, &message.author, &serde_json::to_string(&message)?, head.ctime)
        .await?;
    Ok(id)
}

/// Sync the pool, ingest new chat heads past the `chat` breakpoint, and
/// return cached messages in `(after_id, before_id)` (0 for no limit).
pub async fn get_messages(
    pool_name: &str,
    after_id: u64,
    before_id: u64,
    limit: u32,
) -> Result<Vec<Message>> {
    let session = session()?;
    let pool = session.pool(pool_name).await?;
    ingest_chat_heads(&pool).await?;

    let before = if before_id == 0 { u64::MAX } else { before_id };
    let stored = session
        .cache
        .get_messages(pool_name, after_id, before, limit)
        .await?;

    let mut messages = Vec::with_capacity(stored.len());
    for json in stored {
        match serde_json::from_str::<Message>(&json) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(pool = pool_name, "cached message unreadable: {e}"),
        }
    }
    Ok(messages)
}

async fn ingest_chat_heads(pool: &Pool) -> Result<()> {
    if let Err(e) = pool.sync().await {
        warn!(pool = %pool.name(), "sync before chat scan failed: {e}");
    }

    let cache = pool.cache();
    let mut breakpoint = cache.get_breakpoint(pool.name(), "chat").await?;

    for head in pool.list(breakpoint).await? {
        if head.name.starts_with("chat/") {
            match pool.receive(head.id).await {
                Ok(body) => match serde_json::from_slice::<Message>(&body) {
                    Ok(mut message) => {
                        // The head signature authenticates the author.
                        message.author = head.author_id.clone();
                        cache
                            .set_message(
                                pool.name(),
                                message.id,
                                &message.author,
                                &serde_json::to_string(&message)?,
                                head.ctime,
                            )
                            .await?;
                    }
                    Err(e) => warn!(pool = %pool.name(), id = head.id, "bad message body: {e}"),
                },
                Err(e) => warn!(pool = %pool.name(), id = head.id, "message body missing: {e}"),
            }
        }
        breakpoint = head.ctime;
    }
    cache.set_breakpoint(pool.name(), "chat", breakpoint).await?;
    Ok(())
}
