//! Cache trait: the abstract interface for the local durable store.
//!
//! The pool core consumes this as an opaque key-value facility; the wire
//! payloads it stores (configs, invites, messages) travel as JSON strings
//! so the cache stays independent of the layers above it.

use async_trait::async_trait;
use rockpool_core::Head;

use crate::error::Result;

/// A cached invite: its head creation time, the invite JSON, and the
/// recipient ids it was addressed to (empty for open invites).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInvite {
    pub ctime: i64,
    pub invite: String,
    pub recipients: Vec<String>,
}

/// A cached identity with its trust flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIdentity {
    pub id: String,
    pub identity: String,
    pub trusted: bool,
}

/// The local durable store behind every pool.
///
/// Implementations must be thread-safe. Inserts keyed by `(pool, id)` are
/// idempotent so concurrent syncs cannot double-ingest a head.
#[async_trait]
pub trait Cache: Send + Sync {
    // ─── pool configs ────────────────────────────────────────────────────

    /// Persist a pool config (JSON), replacing any previous one.
    async fn save_config(&self, name: &str, config: &str) -> Result<()>;

    /// Load a pool config by name.
    async fn load_config(&self, name: &str) -> Result<Option<String>>;

    /// Names of all defined pools.
    async fn list_configs(&self) -> Result<Vec<String>>;

    /// Forget a pool config (explicit leave).
    async fn delete_config(&self, name: &str) -> Result<()>;

    // ─── heads ───────────────────────────────────────────────────────────

    /// Insert a head. Idempotent on `(pool, id)`.
    async fn set_head(&self, pool: &str, head: &Head) -> Result<()>;

    /// Heads with `after_id < id < before_id`, ascending id, at most
    /// `limit` (0 means no limit).
    async fn get_heads_range(
        &self,
        pool: &str,
        after_id: u64,
        before_id: u64,
        limit: u32,
    ) -> Result<Vec<Head>>;

    /// Heads strictly newer than `after_ctime`, ordered by `(ctime, id)`.
    async fn heads_since(&self, pool: &str, after_ctime: i64) -> Result<Vec<Head>>;

    /// The largest ctime among cached heads of a pool (0 when empty).
    async fn max_ctime(&self, pool: &str) -> Result<i64>;

    // ─── breakpoints ─────────────────────────────────────────────────────

    /// Record that `channel` has consumed everything strictly earlier
    /// than `ctime`.
    async fn set_breakpoint(&self, pool: &str, channel: &str, ctime: i64) -> Result<()>;

    /// The breakpoint for a channel (0 when never set).
    async fn get_breakpoint(&self, pool: &str, channel: &str) -> Result<i64>;

    // ─── invites ─────────────────────────────────────────────────────────

    /// Cache an invite observed in a pool.
    async fn set_invite(&self, pool: &str, invite: &StoredInvite) -> Result<()>;

    /// Cached invites newer than `after_ctime`; when `only_for` is set,
    /// only invites addressed to that id.
    async fn get_invites(
        &self,
        pool: &str,
        after_ctime: i64,
        only_for: Option<&str>,
    ) -> Result<Vec<StoredInvite>>;

    // ─── messages (application channel glue) ─────────────────────────────

    /// Cache an application message (JSON) keyed by head id.
    async fn set_message(
        &self,
        pool: &str,
        id: u64,
        author: &str,
        message: &str,
        ctime: i64,
    ) -> Result<()>;

    /// Messages with `after_id < id < before_id`, ascending id, at most
    /// `limit` (0 means no limit).
    async fn get_messages(
        &self,
        pool: &str,
        after_id: u64,
        before_id: u64,
        limit: u32,
    ) -> Result<Vec<String>>;

    // ─── replica cursors & quarantine ────────────────────────────────────

    /// Persist the sync cursor for a replica of a pool.
    async fn set_cursor(&self, pool: &str, replica: &str, id: u64) -> Result<()>;

    /// The sync cursor for a replica (0 when never synced).
    async fn get_cursor(&self, pool: &str, replica: &str) -> Result<u64>;

    /// Count one more failed verification attempt for a head id and
    /// return the new total.
    async fn bump_attempts(&self, pool: &str, id: u64) -> Result<u32>;

    // ─── identities (process-wide trust store) ───────────────────────────

    /// Store or update an identity (JSON) and its trust flag.
    async fn set_identity(&self, id: &str, identity: &str, trusted: bool) -> Result<()>;

    /// Look up an identity by id.
    async fn get_identity(&self, id: &str) -> Result<Option<StoredIdentity>>;

    /// Flip the trust flag of a known identity.
    async fn set_trust(&self, id: &str, trusted: bool) -> Result<()>;

    /// All known identities.
    async fn list_identities(&self) -> Result<Vec<StoredIdentity>>;

    // ─── settings (small local key-value) ────────────────────────────────

    /// Store a local setting (e.g. the persisted self identity seeds).
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Read a local setting.
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
}
