//! Exchanger over the `object_store` backends.
//!
//! Supported transport URL schemes:
//!
//! - `s3://host/bucket?accessKey=...&secret=...[&region=...][&http=1]`
//! - `file:///path/to/dir`
//! - `mem://name` - a process-shared named in-memory bucket, so several
//!   peers in one test observe the same replica

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{GetOptions, GetRange, ObjectMeta, ObjectStore};
use once_cell::sync::Lazy;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ExchangeError, Result};
use crate::traits::{Exchanger, FileEntry, ListOptions, ReadRange};

/// Named in-memory buckets shared across the process.
static MEMORY_BUCKETS: Lazy<Mutex<HashMap<String, Arc<InMemory>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// An [`Exchanger`] backed by any `object_store` provider.
#[derive(Debug)]
pub struct ObjectExchanger {
    inner: Arc<dyn ObjectStore>,
    repr: String,
    touch: Mutex<HashMap<String, DateTime<Utc>>>,
}

/// Open an exchanger for a transport URL.
pub fn open_exchanger(connection_url: &str) -> Result<ObjectExchanger> {
    let url = Url::parse(connection_url)
        .map_err(|e| ExchangeError::InvalidUrl(format!("{connection_url}: {e}")))?;

    match url.scheme() {
        "s3" => open_s3(&url),
        "file" => open_file(&url),
        "mem" => open_memory(&url),
        other => Err(ExchangeError::InvalidUrl(format!(
            "unknown scheme '{other}' in {connection_url}"
        ))),
    }
}

fn open_s3(url: &Url) -> Result<ObjectExchanger> {
    let host = url
        .host_str()
        .ok_or_else(|| ExchangeError::InvalidUrl(format!("{url}: missing host")))?;
    let bucket = url.path().trim_matches('/');
    if bucket.is_empty() {
        return Err(ExchangeError::InvalidUrl(format!("{url}: missing bucket")));
    }

    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    let access_key = query.get("accessKey").cloned().unwrap_or_default();
    let secret = query.get("secret").cloned().unwrap_or_default();
    let plain_http = query.get("http").map(String::as_str) == Some("1");
    let endpoint = if plain_http {
        format!("http://{host}")
    } else {
        format!("https://{host}")
    };

    let store = AmazonS3Builder::new()
        .with_endpoint(&endpoint)
        .with_bucket_name(bucket)
        .with_access_key_id(&access_key)
        .with_secret_access_key(&secret)
        .with_region(query.get("region").map(String::as_str).unwrap_or("us-east-1"))
        .with_allow_http(plain_http)
        .build()
        .map_err(|e| ExchangeError::InvalidUrl(e.to_string()))?;

    Ok(ObjectExchanger::new(
        Arc::new(store),
        format!("s3://{host}/{bucket}"),
    ))
}

fn open_file(url: &Url) -> Result<ObjectExchanger> {
    let path = url
        .to_file_path()
        .map_err(|_| ExchangeError::InvalidUrl(format!("{url}: not a file path")))?;
    std::fs::create_dir_all(&path)?;

    let store = LocalFileSystem::new_with_prefix(&path)
        .map_err(|e| ExchangeError::InvalidUrl(e.to_string()))?;
    Ok(ObjectExchanger::new(
        Arc::new(store),
        format!("file://{}", path.display()),
    ))
}

fn open_memory(url: &Url) -> Result<ObjectExchanger> {
    let name = url
        .host_str()
        .ok_or_else(|| ExchangeError::InvalidUrl(format!("{url}: missing bucket name")))?;

    let store = {
        let mut buckets = MEMORY_BUCKETS.lock().unwrap();
        Arc::clone(
            buckets
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemory::new())),
        )
    };
    Ok(ObjectExchanger::new(store, format!("mem://{name}")))
}

impl ObjectExchanger {
    fn new(inner: Arc<dyn ObjectStore>, repr: String) -> Self {
        Self {
            inner,
            repr,
            touch: Mutex::new(HashMap::new()),
        }
    }
}

fn entry_from_meta(meta: &ObjectMeta, strip: &str) -> FileEntry {
    let location = meta.location.as_ref();
    let name = location.strip_prefix(strip).unwrap_or(location).to_string();
    FileEntry {
        name,
        size: meta.size as i64,
        mod_time: meta.last_modified,
        is_dir: false,
    }
}

#[async_trait::async_trait]
impl Exchanger for ObjectExchanger {
    async fn read(&self, name: &str, range: Option<ReadRange>) -> Result<Bytes> {
        let path = ObjectPath::from(name);
        let result = match range {
            None => self.inner.get(&path).await?,
            Some(r) => {
                let opts = GetOptions {
                    range: Some(GetRange::Bounded(r.from as usize..r.to as usize)),
                    ..Default::default()
                };
                self.inner.get_opts(&path, opts).await?
            }
        };
        Ok(result.bytes().await?)
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<()> {
        debug!(exchanger = %self.repr, name, size = data.len(), "write object");
        self.inner.put(&ObjectPath::from(name), data.into()).await?;
        Ok(())
    }

    async fn read_dir(&self, prefix: &str, opts: ListOptions) -> Result<Vec<FileEntry>> {
        let path = ObjectPath::from(prefix);
        let strip = format!("{}/", path.as_ref());

        if opts.recursive {
            let metas: Vec<ObjectMeta> = self.inner.list(Some(&path)).try_collect().await?;
            return Ok(metas.iter().map(|m| entry_from_meta(m, &strip)).collect());
        }

        let listing = self.inner.list_with_delimiter(Some(&path)).await?;
        let mut entries: Vec<FileEntry> = listing
            .objects
            .iter()
            .map(|m| entry_from_meta(m, &strip))
            .collect();
        for common in &listing.common_prefixes {
            let location = common.as_ref();
            entries.push(FileEntry {
                name: location.strip_prefix(&strip).unwrap_or(location).to_string(),
                size: 0,
                mod_time: DateTime::<Utc>::MIN_UTC,
                is_dir: true,
            });
        }
        Ok(entries)
    }

    async fn stat(&self, name: &str) -> Result<FileEntry> {
        let meta = self.inner.head(&ObjectPath::from(name)).await?;
        Ok(FileEntry {
            name: name.to_string(),
            size: meta.size as i64,
            mod_time: meta.last_modified,
            is_dir: false,
        })
    }

    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.inner
            .rename(&ObjectPath::from(old), &ObjectPath::from(new))
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        // Delete the subtree when the name is a prefix; fall back to a
        // single-key delete when the listing comes back empty.
        let path = ObjectPath::from(name);
        let metas: Vec<ObjectMeta> = self.inner.list(Some(&path)).try_collect().await?;
        if metas.is_empty() {
            self.inner.delete(&path).await?;
            return Ok(());
        }
        for meta in metas {
            self.inner.delete(&meta.location).await?;
        }
        Ok(())
    }

    async fn touched(&self, name: &str) -> bool {
        let touch_name = format!("{name}.touch");
        let touch_path = ObjectPath::from(touch_name.as_str());

        let remote = match self.inner.head(&touch_path).await {
            Ok(meta) => meta.last_modified,
            // No sentinel yet: always touched.
            Err(_) => return true,
        };

        let seen = self.touch.lock().unwrap().get(name).copied();
        let changed = match seen {
            Some(seen) => remote > seen,
            None => true,
        };
        if !changed {
            return false;
        }

        // Reset the race window, then remember the sentinel we wrote so a
        // quiet channel probes false next time.
        match self.inner.put(&touch_path, Bytes::new().into()).await {
            Ok(_) => {
                let fresh = self
                    .inner
                    .head(&touch_path)
                    .await
                    .map(|m| m.last_modified)
                    .unwrap_or(remote);
                self.touch.lock().unwrap().insert(name.to_string(), fresh);
            }
            Err(e) => warn!(exchanger = %self.repr, name, "cannot rewrite touch sentinel: {e}"),
        }
        true
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl fmt::Display for ObjectExchanger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static N: AtomicU32 = AtomicU32::new(0);
        format!("mem://{name}{}", N.fetch_add(1, Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let ex = open_exchanger(&unique("rw")).unwrap();
        ex.write("p/1", Bytes::from_static(b"hello")).await.unwrap();

        let data = ex.read("p/1", None).await.unwrap();
        assert_eq!(data.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_exist() {
        let ex = open_exchanger(&unique("missing")).unwrap();
        let err = ex.read("nope", None).await.unwrap_err();
        assert!(matches!(err, ExchangeError::NotExist(_)));
    }

    #[tokio::test]
    async fn test_ranged_read() {
        let ex = open_exchanger(&unique("range")).unwrap();
        ex.write("blob", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        let part = ex
            .read("blob", Some(ReadRange { from: 2, to: 6 }))
            .await
            .unwrap();
        assert_eq!(part.as_ref(), b"2345");
    }

    #[tokio::test]
    async fn test_shared_memory_bucket() {
        let url = unique("shared");
        let a = open_exchanger(&url).unwrap();
        let b = open_exchanger(&url).unwrap();

        a.write("k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(b.read("k", None).await.unwrap().as_ref(), b"v");
    }

    #[tokio::test]
    async fn test_read_dir_non_recursive() {
        let ex = open_exchanger(&unique("list")).unwrap();
        ex.write("p/h/1", Bytes::from_static(b"a")).await.unwrap();
        ex.write("p/h/2", Bytes::from_static(b"b")).await.unwrap();
        ex.write("p/h/sub/3", Bytes::from_static(b"c")).await.unwrap();

        let entries = ex.read_dir("p/h", ListOptions::default()).await.unwrap();
        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["1", "2", "sub"]);
        assert!(entries.iter().any(|e| e.name == "sub" && e.is_dir));
    }

    #[tokio::test]
    async fn test_read_dir_recursive() {
        let ex = open_exchanger(&unique("listr")).unwrap();
        ex.write("p/h/1", Bytes::from_static(b"a")).await.unwrap();
        ex.write("p/h/sub/3", Bytes::from_static(b"c")).await.unwrap();

        let entries = ex
            .read_dir("p/h", ListOptions { recursive: true })
            .await
            .unwrap();
        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["1", "sub/3"]);
    }

    #[tokio::test]
    async fn test_stat_and_rename() {
        let ex = open_exchanger(&unique("stat")).unwrap();
        ex.write("old", Bytes::from_static(b"abc")).await.unwrap();

        let entry = ex.stat("old").await.unwrap();
        assert_eq!(entry.size, 3);

        ex.rename("old", "new").await.unwrap();
        assert!(matches!(
            ex.stat("old").await.unwrap_err(),
            ExchangeError::NotExist(_)
        ));
        assert_eq!(ex.read("new", None).await.unwrap().as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_delete_recursive_with_fallback() {
        let ex = open_exchanger(&unique("del")).unwrap();
        ex.write("tree/a", Bytes::from_static(b"1")).await.unwrap();
        ex.write("tree/b/c", Bytes::from_static(b"2")).await.unwrap();

        ex.delete("tree").await.unwrap();
        assert!(ex.read("tree/a", None).await.is_err());
        assert!(ex.read("tree/b/c", None).await.is_err());

        // Single object: the listing is empty, the fallback path deletes it.
        ex.write("single", Bytes::from_static(b"x")).await.unwrap();
        ex.delete("single").await.unwrap();
        assert!(ex.read("single", None).await.is_err());
    }

    #[tokio::test]
    async fn test_touched_lifecycle() {
        let url = unique("touch");
        let writer = open_exchanger(&url).unwrap();
        let reader = open_exchanger(&url).unwrap();

        // No sentinel yet: always touched, nothing is written.
        assert!(reader.touched("h").await);
        assert!(reader.touched("h").await);

        // A publisher creates the sentinel: touched once, then the probe's
        // own rewrite is remembered and the channel goes quiet.
        writer.write("h.touch", Bytes::new()).await.unwrap();
        assert!(reader.touched("h").await);
        assert!(!reader.touched("h").await);
        assert!(!reader.touched("h").await);

        // The publisher bumps it again: touched exactly once.
        writer.write("h.touch", Bytes::new()).await.unwrap();
        assert!(reader.touched("h").await);
        assert!(!reader.touched("h").await);
    }

    #[tokio::test]
    async fn test_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().display());
        let ex = open_exchanger(&url).unwrap();

        ex.write("p/h/1", Bytes::from_static(b"data")).await.unwrap();
        assert_eq!(ex.read("p/h/1", None).await.unwrap().as_ref(), b"data");

        let entries = ex.read_dir("p/h", ListOptions::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        assert!(matches!(
            open_exchanger("gopher://x/y").unwrap_err(),
            ExchangeError::InvalidUrl(_)
        ));
    }
}
