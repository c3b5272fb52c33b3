//! Flat-directory track store with count-bounded eviction

use crate::error::{CacheError, Result};
use crate::types::{CacheEntry, CacheStats};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Maximum number of cached tracks unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 5;

/// Only files with this suffix take part in lookups and eviction
pub const DEFAULT_EXTENSION: &str = ".mp3";

/// Suffix for in-progress writes, never matched by the extension filter
const PARTIAL_SUFFIX: &str = ".part";

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// A bounded store of named track files in a single directory
///
/// The directory listing is the source of truth: there is no in-memory index,
/// so entries written by an earlier process are picked up as-is. Eviction and
/// writes serialize on one lock shared by all clones of the store, so the
/// count bound holds when several new keys arrive at once.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where tracks are stored
    cache_dir: PathBuf,
    /// Maximum number of valid entries after a completed write
    capacity: usize,
    /// File suffix that marks a cache entry
    extension: String,
    /// Held across every evict and write
    write_lock: Arc<Mutex<()>>,
}

/// Removes an in-progress file unless it was moved into place
///
/// Runs on drop so a write future cancelled mid-transfer cleans up too.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn is_partial_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

impl CacheStore {
    /// Create a store rooted at `cache_dir` holding at most `capacity` tracks
    pub fn new(cache_dir: PathBuf, capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("Cache capacity of 0 cannot hold a playable track, using 1");
            1
        } else {
            capacity
        };

        Self {
            cache_dir,
            capacity,
            extension: DEFAULT_EXTENSION.to_string(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Override the file suffix used to recognise cache entries
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Ensure the cache directory exists and clear partial files left by an
    /// earlier process
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        let swept = self.sweep_partials().await?;
        info!(
            cache_dir = ?self.cache_dir,
            capacity = self.capacity,
            extension = %self.extension,
            swept,
            "Track cache initialized"
        );
        Ok(())
    }

    async fn sweep_partials(&self) -> Result<usize> {
        let _lock = self.write_lock.lock().await;
        let mut dir = fs::read_dir(&self.cache_dir).await?;

        let mut swept = 0;
        while let Some(item) = dir.next_entry().await? {
            let is_partial = item.file_name().to_str().is_some_and(is_partial_name);
            if !is_partial {
                continue;
            }
            match fs::remove_file(item.path()).await {
                Ok(()) => swept += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if swept > 0 {
            debug!(swept, "Removed stale partial files");
        }
        Ok(swept)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether `name` can be stored: one path component carrying the extension
    pub fn is_valid_name(&self, name: &str) -> bool {
        name.len() > self.extension.len()
            && name.ends_with(&self.extension)
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0'])
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.is_valid_name(name) {
            Ok(())
        } else {
            Err(CacheError::InvalidName(name.to_string()))
        }
    }

    /// True iff a non-empty file is stored under `name`
    pub async fn contains(&self, name: &str) -> bool {
        if !self.is_valid_name(name) {
            return false;
        }

        match fs::metadata(self.location_of(name)).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Local path for `name`. Does not check that the entry exists.
    pub fn location_of(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    /// All valid entries, in directory enumeration order
    pub async fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let Some(name) = item.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !self.is_valid_name(&name) {
                continue;
            }

            // Files can disappear between listing and stat under concurrent eviction
            let meta = match item.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(name = %name, error = %e, "Skipping unreadable cache entry");
                    continue;
                }
            };
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }

            entries.push(CacheEntry {
                name,
                path: item.path(),
                size: meta.len(),
                modified_at: DateTime::<Utc>::from(meta.modified()?),
            });
        }

        Ok(entries)
    }

    /// Names of all valid entries, sorted
    pub async fn list_all(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .list_entries()
            .await?
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Make room for one new key by deleting the least recently modified entries
    ///
    /// Must run before any write that introduces a new key. When the store
    /// already holds `capacity` or more entries, the oldest are removed until
    /// `capacity - 1` remain. Entries with equal timestamps keep their
    /// directory enumeration order. Returns the evicted names.
    pub async fn evict_if_full(&self) -> Result<Vec<String>> {
        let _lock = self.write_lock.lock().await;
        self.evict_locked().await
    }

    async fn evict_locked(&self) -> Result<Vec<String>> {
        let mut entries = self.list_entries().await?;
        if entries.len() < self.capacity {
            return Ok(Vec::new());
        }

        entries.sort_by_key(|e| e.modified_at);
        let excess = entries.len() - self.capacity + 1;

        let mut evicted = Vec::with_capacity(excess);
        for entry in entries.into_iter().take(excess) {
            match fs::remove_file(&entry.path).await {
                Ok(()) => {}
                // Already gone, so it was not ours to evict
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            debug!(name = %entry.name, modified_at = %entry.modified_at, "Evicted cached track");
            evicted.push(entry.name);
        }

        info!(
            evicted = evicted.len(),
            capacity = self.capacity,
            "Cache full, evicted oldest tracks"
        );
        Ok(evicted)
    }

    /// Store `data` under `name`, replacing any existing entry
    ///
    /// The payload lands in a hidden partial file first and is renamed into
    /// place once fully written, so a failed write never leaves a truncated
    /// entry behind.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<CacheEntry> {
        self.check_name(name)?;
        if data.is_empty() {
            return Err(CacheError::EmptyPayload(name.to_string()));
        }

        let _lock = self.write_lock.lock().await;
        self.write_locked(name, data).await
    }

    /// Evict if needed and store `data` under a new or existing `name`
    ///
    /// Both steps run under the store lock, so concurrent callers with
    /// different names cannot all claim the same free slot. Overwriting an
    /// existing entry evicts nothing. Returns the entry and the evicted names.
    pub async fn write_new(&self, name: &str, data: &[u8]) -> Result<(CacheEntry, Vec<String>)> {
        self.check_name(name)?;
        if data.is_empty() {
            return Err(CacheError::EmptyPayload(name.to_string()));
        }

        let _lock = self.write_lock.lock().await;
        let evicted = if self.contains(name).await {
            Vec::new()
        } else {
            self.evict_locked().await?
        };
        let entry = self.write_locked(name, data).await?;
        Ok((entry, evicted))
    }

    async fn write_locked(&self, name: &str, data: &[u8]) -> Result<CacheEntry> {
        let path = self.location_of(name);
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut partial = PartialFile {
            path: self.cache_dir.join(format!(
                ".{}-{}{}",
                std::process::id(),
                seq,
                PARTIAL_SUFFIX
            )),
            committed: false,
        };

        if let Err(e) = write_synced(&partial.path, data).await {
            warn!(name = %name, error = %e, "Failed to write track, discarding partial file");
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&partial.path, &path).await {
            warn!(name = %name, error = %e, "Failed to move track into place");
            return Err(e.into());
        }
        partial.committed = true;

        let meta = fs::metadata(&path).await?;
        let entry = CacheEntry {
            name: name.to_string(),
            path,
            size: meta.len(),
            modified_at: DateTime::<Utc>::from(meta.modified()?),
        };

        debug!(name = %name, size = entry.size, "Cached track");
        Ok(entry)
    }

    /// Delete one entry, returning whether it existed
    pub async fn remove(&self, name: &str) -> Result<bool> {
        self.check_name(name)?;

        match fs::remove_file(self.location_of(name)).await {
            Ok(()) => {
                debug!(name = %name, "Removed cached track");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Current entry count and total size
    pub async fn stats(&self) -> Result<CacheStats> {
        let entries = self.list_entries().await?;
        Ok(CacheStats {
            entries: entries.len(),
            total_size: entries.iter().map(|e| e.size).sum(),
            capacity: self.capacity,
        })
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
