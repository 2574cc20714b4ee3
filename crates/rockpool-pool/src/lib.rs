//! # Rockpool Pool
//!
//! The pool core: lifecycle (define, create, open, close), access control,
//! head publication, and multi-replica synchronization over black-box
//! object stores.
//!
//! A pool is an append-only log of signed [`Head`](rockpool_core::Head)s
//! replicated best-effort across every configured transport. Peers verify
//! everything they ingest; the bucket operator is trusted for liveness
//! only, never for integrity.

pub mod acl;
pub mod config;
pub mod error;
mod pool;
mod publish;
mod sync;

pub use acl::{AccessChange, AccessLevel, AclState};
pub use config::{define, list_pools, load_config, Config};
pub use error::{PoolError, Result};
pub use pool::{Pool, PoolSettings};
