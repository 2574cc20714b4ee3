//! The Exchanger capability trait.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::Result;

/// Metadata for a single object or listing prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Name relative to the listed prefix (or the full key for `stat`).
    pub name: String,
    /// Object size in bytes (0 for prefixes).
    pub size: i64,
    /// Last modification time reported by the store.
    pub mod_time: DateTime<Utc>,
    /// Whether this entry is a listing prefix rather than an object.
    pub is_dir: bool,
}

/// Options for [`Exchanger::read_dir`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Descend into nested prefixes instead of stopping at the first `/`.
    pub recursive: bool,
}

/// A half-open byte range `[from, to)` for partial reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRange {
    pub from: u64,
    pub to: u64,
}

/// Uniform capability over an object store backing a pool replica.
///
/// Implementations must be thread-safe; the pool layer calls them from
/// many concurrent tasks. All failures are considered transient by callers
/// unless they are [`NotExist`](crate::ExchangeError::NotExist).
#[async_trait]
pub trait Exchanger: Send + Sync + fmt::Display {
    /// Read an object, fully or a byte range of it.
    async fn read(&self, name: &str, range: Option<ReadRange>) -> Result<Bytes>;

    /// Write an object. Atomic from the observer's viewpoint: a partial
    /// write must never become visible.
    async fn write(&self, name: &str, data: Bytes) -> Result<()>;

    /// List the objects under a prefix, non-recursive unless requested.
    async fn read_dir(&self, prefix: &str, opts: ListOptions) -> Result<Vec<FileEntry>>;

    /// Metadata for a single object.
    async fn stat(&self, name: &str) -> Result<FileEntry>;

    /// Rename an object.
    async fn rename(&self, old: &str, new: &str) -> Result<()>;

    /// Delete the object and, when `name/` is a prefix, everything
    /// underneath it.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Cheap change probe for a logical channel.
    ///
    /// Compares the `<name>.touch` sentinel's last-modified timestamp with
    /// the locally remembered one; strictly-after counts as touched, equal
    /// does not. A missing sentinel is always touched. On an observed
    /// change the sentinel is re-written to reset the race window and the
    /// fresh timestamp is remembered, so a quiet channel probes `false`.
    async fn touched(&self, name: &str) -> bool;

    /// Release any underlying connection.
    async fn close(&self) -> Result<()>;
}
