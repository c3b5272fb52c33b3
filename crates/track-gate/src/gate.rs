//! Cache-or-fetch resolution

use crate::error::{GateError, Result};
use crate::types::{GateStats, Resolved, Source, Track};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use track_cache::{CacheError, CacheStore};
use track_fetcher::Fetch;
use tracing::{debug, info, warn};

type KeyLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Resolves track names to local files, downloading on a cache miss
///
/// Concurrent requests for the same missing name share one download: the
/// first request fetches while the others wait on a per-name lock and then
/// find the track in the cache. Requests for different names download in
/// parallel; the store serializes their evict-and-write step.
pub struct FetchGate<F> {
    store: CacheStore,
    fetcher: F,
    /// Per-name locks for requests currently on the miss path
    in_flight: KeyLocks,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

/// A registered interest in a name's lock
///
/// Registered before the lock is awaited, so a request cancelled while
/// waiting still clears its registry slot when it is the last one out.
struct InFlight<'a> {
    registry: &'a KeyLocks,
    name: &'a str,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut locks = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        // One handle in the registry plus ours: nobody else is waiting
        if locks
            .get(self.name)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2)
        {
            locks.remove(self.name);
        }
    }
}

impl<F: Fetch> FetchGate<F> {
    pub fn new(store: CacheStore, fetcher: F) -> Self {
        Self {
            store,
            fetcher,
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolve `name` to a local file, fetching `url` if it is not cached
    ///
    /// A cache hit returns immediately without touching the network or the
    /// eviction path. On a miss the payload is downloaded in full before
    /// anything in the store changes, so a failed fetch leaves every existing
    /// entry as it was.
    pub async fn resolve(&self, name: &str, url: &str) -> Result<Resolved> {
        if self.store.contains(name).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(name = %name, "Cache hit");
            return Ok(Resolved {
                location: self.store.location_of(name),
                source: Source::Cache,
            });
        }

        if !self.store.is_valid_name(name) {
            return Err(GateError::Cache(CacheError::InvalidName(name.to_string())));
        }

        let in_flight = self.register(name);
        let _guard = in_flight.lock.lock().await;

        // Another request may have finished the download while we waited
        if self.store.contains(name).await {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(name = %name, "Cache hit after waiting on in-flight fetch");
            return Ok(Resolved {
                location: self.store.location_of(name),
                source: Source::Cache,
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(name = %name, url = %url, "Cache miss");

        self.fetch_and_store(name, url).await.inspect_err(|e| {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(name = %name, url = %url, error = %e, "Failed to resolve track");
        })
    }

    /// Resolve a catalog track under its cache key
    pub async fn resolve_track(&self, track: &Track) -> Result<Resolved> {
        let key = track.cache_key(self.store.extension());
        self.resolve(&key, &track.download_url).await
    }

    async fn fetch_and_store(&self, name: &str, url: &str) -> Result<Resolved> {
        let data = self.fetcher.fetch(url).await?;

        let (entry, evicted) = self
            .store
            .write_new(name, &data)
            .await
            .map_err(GateError::PartialWrite)?;

        info!(
            name = %name,
            size = entry.size,
            evicted = evicted.len(),
            "Fetched and cached track"
        );

        Ok(Resolved {
            location: entry.path,
            source: Source::Network,
        })
    }

    fn register<'a>(&'a self, name: &'a str) -> InFlight<'a> {
        let mut locks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        InFlight {
            registry: &self.in_flight,
            name,
            lock: locks.entry(name.to_string()).or_default().clone(),
        }
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl<F: Fetch + 'static> FetchGate<F> {
    /// Like [`FetchGate::resolve`], but the work runs on its own task
    ///
    /// Dropping the returned future only stops the wait. A download that has
    /// started still completes and lands in the cache for the next request.
    pub async fn resolve_detached(self: &Arc<Self>, name: &str, url: &str) -> Result<Resolved> {
        let gate = Arc::clone(self);
        let (name, url) = (name.to_string(), url.to_string());

        tokio::spawn(async move { gate.resolve(&name, &url).await })
            .await
            .map_err(|e| GateError::Task(e.to_string()))?
    }

    /// Detached variant of [`FetchGate::resolve_track`]
    pub async fn resolve_track_detached(self: &Arc<Self>, track: &Track) -> Result<Resolved> {
        let key = track.cache_key(self.store.extension());
        self.resolve_detached(&key, &track.download_url).await
    }
}
