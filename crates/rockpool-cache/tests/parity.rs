//! Both cache backends must expose identical semantics.

use rockpool_cache::{Cache, MemoryCache, SqliteCache, StoredInvite};
use rockpool_core::{Blake3Hash, Head, HeadBuilder, LocalIdentity};

fn head(author: &LocalIdentity, id: u64, name: &str, ctime: i64) -> Head {
    HeadBuilder::new(id, name)
        .size(4)
        .hash(Blake3Hash::hash(b"body"))
        .ctime(ctime)
        .sign(author)
        .unwrap()
}

async fn exercise(cache: &dyn Cache) {
    let alice = LocalIdentity::new("alice");

    // configs
    cache.save_config("p", r#"{"name":"p"}"#).await.unwrap();
    cache.save_config("p", r#"{"name":"p","v":2}"#).await.unwrap();
    assert_eq!(
        cache.load_config("p").await.unwrap().unwrap(),
        r#"{"name":"p","v":2}"#
    );
    assert_eq!(cache.list_configs().await.unwrap(), vec!["p"]);
    cache.delete_config("p").await.unwrap();
    assert!(cache.load_config("p").await.unwrap().is_none());

    // heads: idempotent insert, strict range bounds, ctime ordering
    let h1 = head(&alice, 10, "chat/a", 100);
    let h2 = head(&alice, 20, "chat/b", 50);
    let h3 = head(&alice, 30, "chat/c", 200);
    for h in [&h1, &h2, &h3, &h1] {
        cache.set_head("p", h).await.unwrap();
    }

    let range = cache.get_heads_range("p", 10, 30, 0).await.unwrap();
    assert_eq!(range.iter().map(|h| h.id).collect::<Vec<_>>(), vec![20]);

    let all = cache.get_heads_range("p", 0, u64::MAX, 0).await.unwrap();
    assert_eq!(all.iter().map(|h| h.id).collect::<Vec<_>>(), vec![10, 20, 30]);

    let limited = cache.get_heads_range("p", 0, u64::MAX, 2).await.unwrap();
    assert_eq!(limited.len(), 2);

    let since = cache.heads_since("p", 50).await.unwrap();
    assert_eq!(since.iter().map(|h| h.id).collect::<Vec<_>>(), vec![10, 30]);

    assert_eq!(cache.max_ctime("p").await.unwrap(), 200);
    assert_eq!(cache.max_ctime("other").await.unwrap(), 0);

    // breakpoints
    assert_eq!(cache.get_breakpoint("p", "chat").await.unwrap(), 0);
    cache.set_breakpoint("p", "chat", 123).await.unwrap();
    cache.set_breakpoint("p", "chat", 456).await.unwrap();
    assert_eq!(cache.get_breakpoint("p", "chat").await.unwrap(), 456);

    // invites: replace on same body, filter by recipient and ctime
    let bob_invite = StoredInvite {
        ctime: 10,
        invite: r#"{"s":"join"}"#.into(),
        recipients: vec!["bob".into()],
    };
    let open_invite = StoredInvite {
        ctime: 20,
        invite: r#"{"s":"open"}"#.into(),
        recipients: vec![],
    };
    cache.set_invite("p", &bob_invite).await.unwrap();
    cache.set_invite("p", &bob_invite).await.unwrap();
    cache.set_invite("p", &open_invite).await.unwrap();

    assert_eq!(cache.get_invites("p", 0, None).await.unwrap().len(), 2);
    assert_eq!(
        cache.get_invites("p", 0, Some("bob")).await.unwrap().len(),
        1
    );
    assert_eq!(
        cache.get_invites("p", 0, Some("carol")).await.unwrap().len(),
        0
    );
    assert_eq!(cache.get_invites("p", 15, None).await.unwrap().len(), 1);

    // messages
    cache
        .set_message("p", 10, "alice", r#"{"text":"hi"}"#, 100)
        .await
        .unwrap();
    cache
        .set_message("p", 10, "alice", r#"{"text":"overwritten?"}"#, 100)
        .await
        .unwrap();
    cache
        .set_message("p", 20, "alice", r#"{"text":"again"}"#, 200)
        .await
        .unwrap();

    let messages = cache.get_messages("p", 0, u64::MAX, 0).await.unwrap();
    assert_eq!(messages, vec![r#"{"text":"hi"}"#, r#"{"text":"again"}"#]);

    // cursors & attempts
    assert_eq!(cache.get_cursor("p", "mem://a").await.unwrap(), 0);
    cache.set_cursor("p", "mem://a", 30).await.unwrap();
    assert_eq!(cache.get_cursor("p", "mem://a").await.unwrap(), 30);

    assert_eq!(cache.bump_attempts("p", 99).await.unwrap(), 1);
    assert_eq!(cache.bump_attempts("p", 99).await.unwrap(), 2);
    assert_eq!(cache.bump_attempts("p", 100).await.unwrap(), 1);

    // identities
    let id = alice.id();
    let identity_json = serde_json::to_string(&alice.public()).unwrap();
    cache.set_identity(&id, &identity_json, false).await.unwrap();
    let stored = cache.get_identity(&id).await.unwrap().unwrap();
    assert!(!stored.trusted);

    cache.set_trust(&id, true).await.unwrap();
    assert!(cache.get_identity(&id).await.unwrap().unwrap().trusted);
    assert_eq!(cache.list_identities().await.unwrap().len(), 1);

    // settings
    assert!(cache.get_setting("self").await.unwrap().is_none());
    cache.set_setting("self", "seed-material").await.unwrap();
    assert_eq!(
        cache.get_setting("self").await.unwrap().unwrap(),
        "seed-material"
    );
}

#[tokio::test]
async fn test_memory_cache_semantics() {
    exercise(&MemoryCache::new()).await;
}

#[tokio::test]
async fn test_sqlite_cache_semantics() {
    exercise(&SqliteCache::open_memory().unwrap()).await;
}

#[tokio::test]
async fn test_sqlite_cache_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let alice = LocalIdentity::new("alice");
    {
        let cache = SqliteCache::open(&path).unwrap();
        cache.set_head("p", &head(&alice, 1, "chat/a", 7)).await.unwrap();
    }

    let cache = SqliteCache::open(&path).unwrap();
    let heads = cache.get_heads_range("p", 0, u64::MAX, 0).await.unwrap();
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].ctime, 7);
    heads[0].verify().unwrap();
}
