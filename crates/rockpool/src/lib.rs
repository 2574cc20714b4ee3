//! # Rockpool
//!
//! Peer-to-peer collaboration pools over untrusted shared object storage.
//!
//! Participants form **pools**: named, cryptographically bounded groups in
//! which members publish and receive ordered, signed heads through any
//! dumb blob store (S3-compatible buckets, local directories, shared
//! memory buckets for tests). Application channels (chat, invites) sit on
//! top of the pool primitive.
//!
//! This crate is the public surface: a process-wide session created by
//! [`start`], the pool operations, invite validation, and the chat glue.
//! The layers live in their own crates:
//!
//! - `rockpool-core` - identities, crypto, signed heads, snowflake ids
//! - `rockpool-exchange` - the `Exchanger` capability over object stores
//! - `rockpool-cache` - the durable local cache and trust store
//! - `rockpool-pool` - pool lifecycle, ACL, publication, sync
//! - `rockpool-invite` - cryptographic invitations
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> rockpool::Result<()> {
//! rockpool::start("/tmp/rockpool.db").await?;
//!
//! let config = rockpool::Config {
//!     name: "team/demo".into(),
//!     public: vec!["s3://host/bucket?accessKey=k&secret=s".into()],
//!     private: vec![],
//!     apps: vec!["chat".into()],
//! };
//! rockpool::create_pool(config, &["chat".into()]).await?;
//! rockpool::post_message("team/demo", "text/plain", "hello", vec![]).await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod chat;
pub mod error;

pub use api::{
    create_pool, get_pool, get_updates, invite_to_pool, join_pool, list_identities, pool_list,
    self_identity, set_trust, start, stop, validate_invite, Contact, Notification, PoolView,
};
pub use chat::{get_messages, post_message, Message};
pub use error::{Error, Result};

pub use rockpool_core::{Identity, LocalIdentity};
pub use rockpool_invite::Invite;
pub use rockpool_pool::{AccessLevel, Config};
