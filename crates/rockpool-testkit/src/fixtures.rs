//! Test fixtures: peers, shared buckets, and timing helpers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rockpool_cache::{Cache, MemoryCache};
use rockpool_core::{Blake3Hash, Head, HeadBuilder, LocalIdentity};

/// A test peer: an identity plus its own local cache.
pub struct Peer {
    pub me: Arc<LocalIdentity>,
    pub cache: Arc<dyn Cache>,
}

/// Create a peer with a random identity and an empty in-memory cache.
pub fn peer(nick: &str) -> Peer {
    Peer {
        me: Arc::new(LocalIdentity::new(nick)),
        cache: Arc::new(MemoryCache::new()),
    }
}

/// Create several peers with distinct identities.
pub fn multi_peer(count: usize) -> Vec<Peer> {
    (0..count).map(|i| peer(&format!("peer-{i}"))).collect()
}

/// A process-unique `mem://` bucket URL, so concurrent tests never share
/// a replica by accident.
pub fn unique_bucket(tag: &str) -> String {
    static N: AtomicU32 = AtomicU32::new(0);
    format!("mem://{tag}-{}", N.fetch_add(1, Ordering::SeqCst))
}

/// Let the snowflake clock advance a tick, so causally ordered writes
/// from different peers get strictly ordered ids.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// Build a signed head over the given body.
pub fn sample_head(author: &LocalIdentity, id: u64, name: &str, body: &[u8], ctime: i64) -> Head {
    HeadBuilder::new(id, name)
        .size(body.len() as i64)
        .hash(Blake3Hash::hash(body))
        .ctime(ctime)
        .sign(author)
        .expect("signing a test head")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peers_are_distinct() {
        let peers = multi_peer(3);
        assert_ne!(peers[0].me.id(), peers[1].me.id());
        assert_ne!(peers[1].me.id(), peers[2].me.id());
    }

    #[test]
    fn test_unique_buckets() {
        assert_ne!(unique_bucket("t"), unique_bucket("t"));
    }

    #[tokio::test]
    async fn test_sample_head_verifies() {
        let p = peer("alice");
        let head = sample_head(&p.me, 7, "chat/x", b"body", 100);
        head.verify().unwrap();
        p.cache.set_head("p", &head).await.unwrap();
        assert_eq!(p.cache.max_ctime("p").await.unwrap(), 100);
    }
}
