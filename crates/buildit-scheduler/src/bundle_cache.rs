//! On-disk cache of extracted job bundles (C10 step 2): refcounted, TTL-evicted,
//! with in-process deduplication of concurrent downloads of the same (slug, version).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use buildit_bundle_store::BundleStore;
use buildit_core::bundle::JobBundleVersion;

use crate::error::{Result, SchedulerError};

/// One cached (slug, version) extraction. `refcount` tracks in-flight users; `last_used`
/// (millis since cache start) is only read/written by the GC sweep and guard drop, both
/// cheap atomics rather than an async lock.
struct CacheEntry {
    dir: PathBuf,
    refcount: AtomicUsize,
    last_released: AtomicI64,
}

/// Held while a caller is using a cached bundle directory; releases the refcount on drop
/// so the GC sweep can reclaim it once idle past the TTL.
pub struct BundleGuard {
    dir: PathBuf,
    entry: Arc<CacheEntry>,
}

impl BundleGuard {
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl Drop for BundleGuard {
    fn drop(&mut self) {
        self.entry.refcount.fetch_sub(1, Ordering::SeqCst);
        self.entry
            .last_released
            .store(Instant::now().elapsed().as_millis() as i64, Ordering::SeqCst);
    }
}

pub struct BundleCache {
    root: PathBuf,
    ttl: Duration,
    started: Instant,
    /// `fetch_lock` serializes population of a single key: the first caller downloads and
    /// extracts, later concurrent callers for the same key await the same lock and then
    /// find the entry already populated.
    fetch_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    entries: tokio::sync::Mutex<HashMap<String, Arc<CacheEntry>>>,
}

impl BundleCache {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            started: Instant::now(),
            fetch_locks: tokio::sync::Mutex::new(HashMap::new()),
            entries: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn key(slug: &str, version: &str) -> String {
        format!("{slug}@{version}")
    }

    /// Ensures `bundle`'s checksum-verified artifact is extracted on disk, downloading and
    /// untarring it through `store` if this is the first acquire (or the prior copy was
    /// evicted), and returns a guard pointing at the extracted directory.
    pub async fn acquire(&self, bundle: &JobBundleVersion, store: &dyn BundleStore) -> Result<BundleGuard> {
        let key = Self::key(&bundle.slug, &bundle.version);

        let fetch_lock = {
            let mut locks = self.fetch_locks.lock().await;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _guard = fetch_lock.lock().await;

        if let Some(entry) = self.entries.lock().await.get(&key).cloned() {
            entry.refcount.fetch_add(1, Ordering::SeqCst);
            return Ok(BundleGuard {
                dir: entry.dir.clone(),
                entry,
            });
        }

        let dir = self.root.join(sanitize(&bundle.slug)).join(sanitize(&bundle.version));
        extract_bundle(bundle, store, &dir).await?;

        let entry = Arc::new(CacheEntry {
            dir: dir.clone(),
            refcount: AtomicUsize::new(1),
            last_released: AtomicI64::new(i64::MAX),
        });
        self.entries.lock().await.insert(key, entry.clone());
        Ok(BundleGuard { dir, entry })
    }

    /// Removes from disk and from the cache any entry that is both unreferenced and idle
    /// past the configured TTL. Intended to be called periodically from a maintenance task.
    pub async fn evict_idle(&self) {
        let now_ms = self.started.elapsed().as_millis() as i64;
        let ttl_ms = self.ttl.as_millis() as i64;

        let mut entries = self.entries.lock().await;
        let mut to_remove = Vec::new();
        for (key, entry) in entries.iter() {
            if entry.refcount.load(Ordering::SeqCst) != 0 {
                continue;
            }
            let last_released = entry.last_released.load(Ordering::SeqCst);
            if last_released == i64::MAX || now_ms.saturating_sub(last_released) < ttl_ms {
                continue;
            }
            to_remove.push((key.clone(), entry.dir.clone()));
        }
        for (key, dir) in to_remove {
            entries.remove(&key);
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to evict bundle cache entry");
                }
            }
        }
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn extract_bundle(bundle: &JobBundleVersion, store: &dyn BundleStore, dest: &PathBuf) -> Result<()> {
    let data = store.get(bundle).await?;
    let actual = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&data);
        hex::encode(hasher.finalize())
    };
    if actual != bundle.checksum {
        return Err(SchedulerError::Core(buildit_core::Error::ChecksumMismatch {
            expected: bundle.checksum.clone(),
            actual,
        }));
    }

    if dest.exists() {
        tokio::fs::remove_dir_all(dest).await?;
    }
    tokio::fs::create_dir_all(dest).await?;

    let dest = dest.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let decoder = flate2::read::GzDecoder::new(data.as_ref());
        let mut archive = tar::Archive::new(decoder);
        archive.unpack(&dest)
    })
    .await
    .map_err(|e| SchedulerError::Io(std::io::Error::other(e.to_string())))??;

    Ok(())
}
