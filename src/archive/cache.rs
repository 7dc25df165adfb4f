//! Bounded LRU cache of open archive handles.
//!
//! # Structure
//!
//! ```text
//! ArchiveCache
//! ├── state: Mutex<CacheState>            bookkeeping only, never held across I/O
//! │   └── FxHashMap<archive path, Slot { handle, last_used }>
//! ├── loading: DashMap<archive path, gate>  one loader per path (single-flight)
//! └── sweeper task                        retires unused handles every interval
//! ```
//!
//! # Eviction
//!
//! Capacity pressure (on insert, and whenever a handle's last lease is
//! released) evicts least-recently-used handles that nobody is reading.
//! Occupied handles are skipped, so the cache may stay over capacity until
//! they become free. The idle sweep evicts every unoccupied handle.
//!
//! Eviction first retires the handle under the cache lock (after which no
//! lease can be taken) and closes it after the lock is dropped.
//!
//! # Loading
//!
//! Archives are opened from base storage. Only when base storage cannot
//! reach the path is it read as an entry of the enclosing archive and
//! copied into memory.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handle::ArchiveHandle;
use super::reader::EntryReader;
use crate::config::OverlayConfig;
use crate::error::{Error, Result};
use crate::io::{MemoryReader, ReadAt, prealloc_len};
use crate::path::enclosing_archive;
use crate::storage::BaseStorage;

/// Attempts to lease a handle that keeps getting evicted before use.
const MAX_OPEN_ATTEMPTS: usize = 8;

type HandleFuture = Pin<Box<dyn Future<Output = Result<Arc<ArchiveHandle>>> + Send>>;
type ReaderFuture = Pin<Box<dyn Future<Output = Result<EntryReader>> + Send>>;

/// Counters for monitoring the cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Archives opened and parsed.
    pub loads: u64,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Handles evicted (capacity, sweep or shutdown).
    pub evictions: u64,
    /// Handles currently cached.
    pub open: usize,
}

struct Slot {
    handle: Arc<ArchiveHandle>,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: FxHashMap<String, Slot>,
    tick: u64,
}

struct Sweeper {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct CacheShared {
    storage: Arc<dyn BaseStorage>,
    capacity: usize,
    exclusive: bool,
    state: Mutex<CacheState>,
    loading: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    shut_down: AtomicBool,
    loads: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

/// LRU cache of [`ArchiveHandle`]s keyed by archive path.
///
/// Must be created inside a tokio runtime: construction spawns the idle
/// sweep task. The task stops on [`ArchiveCache::close`] or when the cache
/// is dropped.
pub struct ArchiveCache {
    shared: Arc<CacheShared>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl ArchiveCache {
    pub fn new(storage: Arc<dyn BaseStorage>, config: &OverlayConfig) -> Self {
        let shared = Arc::new(CacheShared {
            storage,
            capacity: config.capacity.max(1),
            exclusive: config.exclusive_reads,
            state: Mutex::new(CacheState::default()),
            loading: DashMap::new(),
            shut_down: AtomicBool::new(false),
            loads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        });

        let token = CancellationToken::new();
        let interval = config.sweep_interval.max(Duration::from_millis(1));
        let task = tokio::spawn(run_sweeper(
            Arc::downgrade(&shared),
            interval,
            token.clone(),
        ));

        Self {
            shared,
            sweeper: Mutex::new(Some(Sweeper { token, task })),
        }
    }

    /// Get the handle for `archive`, opening and parsing it on a miss.
    ///
    /// Concurrent misses for the same path share one load. Failed loads
    /// are not remembered; the next call tries again.
    pub async fn get(&self, archive: &str) -> Result<Arc<ArchiveHandle>> {
        self.shared.get(archive).await
    }

    /// Open `internal` inside `archive`, reloading the archive if its
    /// handle was evicted between lookup and lease.
    pub async fn open_entry(&self, archive: &str, internal: &str) -> Result<EntryReader> {
        self.shared.open_entry(archive, internal).await
    }

    /// Evict every handle that is not currently being read.
    ///
    /// Returns the number of handles closed. This is what the background
    /// task runs each interval.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    pub fn contains(&self, archive: &str) -> bool {
        self.shared.state.lock().entries.contains_key(archive)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            loads: self.shared.loads.load(Ordering::Relaxed),
            hits: self.shared.hits.load(Ordering::Relaxed),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
            open: self.len(),
        }
    }

    /// Stop the sweep task and close every handle, occupied or not.
    ///
    /// Readers still open at this point keep their own reference to the
    /// source and release it when they are closed. Later calls do nothing;
    /// lookups after close fail with [`Error::ArchiveClosed`].
    pub async fn close(&self) {
        self.shared.shut_down.store(true, Ordering::Release);

        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.token.cancel();
            if let Err(e) = sweeper.task.await {
                warn!(error = %e, "Idle sweep task ended abnormally");
            }
        }

        let handles: Vec<Arc<ArchiveHandle>> = {
            let mut state = self.shared.state.lock();
            state.entries.drain().map(|(_, slot)| slot.handle).collect()
        };
        for handle in &handles {
            handle.force_retire();
        }
        self.shared.close_evicted(handles, "shutdown");
    }
}

impl Drop for ArchiveCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.token.cancel();
        }
    }
}

impl std::fmt::Debug for ArchiveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCache")
            .field("capacity", &self.shared.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CacheShared {
    async fn get(self: &Arc<Self>, key: &str) -> Result<Arc<ArchiveHandle>> {
        loop {
            if self.shut_down.load(Ordering::Acquire) {
                return Err(Error::ArchiveClosed {
                    path: key.to_string(),
                });
            }
            if let Some(handle) = self.lookup(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(handle);
            }

            let gate = Arc::clone(self.loading.entry(key.to_string()).or_default().value());
            let _guard = gate.lock().await;

            // The previous holder finished (or failed) and retired this gate;
            // start over so there is only ever one live gate per key.
            let current = self
                .loading
                .get(key)
                .is_some_and(|g| Arc::ptr_eq(g.value(), &gate));
            if !current {
                continue;
            }
            // A loader that finished between our miss and taking this gate
            // has already inserted its handle.
            if let Some(handle) = self.lookup(key) {
                self.loading.remove_if(key, |_, g| Arc::ptr_eq(g, &gate));
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(handle);
            }

            let outcome = match self.load(key).await {
                Ok(handle) if self.shut_down.load(Ordering::Acquire) => {
                    // Closed while loading; nothing may be cached after close.
                    handle.force_retire();
                    if let Err(e) = handle.close() {
                        warn!(
                            archive = key,
                            error = %e,
                            "Failed to close archive loaded during shutdown"
                        );
                    }
                    Err(Error::ArchiveClosed {
                        path: key.to_string(),
                    })
                }
                result => result.map(|handle| self.insert(key, handle)),
            };
            self.loading.remove_if(key, |_, g| Arc::ptr_eq(g, &gate));
            return outcome;
        }
    }

    fn get_boxed(self: &Arc<Self>, key: String) -> HandleFuture {
        let this = Arc::clone(self);
        Box::pin(async move { this.get(&key).await })
    }

    fn open_entry_boxed(self: &Arc<Self>, archive: String, internal: String) -> ReaderFuture {
        let this = Arc::clone(self);
        Box::pin(async move { this.open_entry(&archive, &internal).await })
    }

    async fn open_entry(self: &Arc<Self>, archive: &str, internal: &str) -> Result<EntryReader> {
        let mut attempts = 0;
        loop {
            let handle = self.get_boxed(archive.to_string()).await?;
            match handle.open(internal).await {
                Err(Error::ArchiveClosed { .. }) if attempts + 1 < MAX_OPEN_ATTEMPTS => {
                    attempts += 1;
                    debug!(archive, attempts, "Handle evicted before lease, reloading");
                }
                other => return other,
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Arc<ArchiveHandle>> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        let slot = state.entries.get_mut(key)?;
        slot.last_used = tick;
        Some(Arc::clone(&slot.handle))
    }

    async fn load(self: &Arc<Self>, key: &str) -> Result<ArchiveHandle> {
        let source: Arc<dyn ReadAt> = match self.storage.open(key).await {
            Ok(source) => source,
            Err(err) => match enclosing_archive(key) {
                // `.zip` directories in base storage take precedence.
                Some((outer, inner)) if is_unreachable(&err) => {
                    self.read_nested(&outer, &inner).await?
                }
                _ => return Err(Error::archive_open(key, err)),
            },
        };

        let handle = ArchiveHandle::load(key, source, self.exclusive).await?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!(
            archive = key,
            entries = handle.index().len(),
            "Archive loaded"
        );
        Ok(handle)
    }

    /// Copy an archive stored inside another archive into memory.
    async fn read_nested(self: &Arc<Self>, outer: &str, inner: &str) -> Result<Arc<dyn ReadAt>> {
        // The outer lease is held only while the inner archive is copied.
        let mut reader = self
            .open_entry_boxed(outer.to_string(), inner.to_string())
            .await?;
        let mut data = Vec::with_capacity(prealloc_len(reader.info().size));
        reader.read_to_end(&mut data).await?;
        reader.close();
        Ok(Arc::new(MemoryReader::new(data)))
    }

    fn insert(self: &Arc<Self>, key: &str, handle: ArchiveHandle) -> Arc<ArchiveHandle> {
        let handle = Arc::new(handle);
        let weak = Arc::downgrade(self);
        handle.set_idle_hook(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.trim(None);
            }
        }));

        let evicted = {
            let mut state = self.state.lock();
            state.tick += 1;
            let tick = state.tick;
            state.entries.insert(
                key.to_string(),
                Slot {
                    handle: Arc::clone(&handle),
                    last_used: tick,
                },
            );
            // The new handle has no lease yet; keep it out of reach of its
            // own insertion.
            self.collect_over_capacity(&mut state, Some(key))
        };
        self.close_evicted(evicted, "capacity");
        handle
    }

    /// Evict least-recently-used free handles while over capacity.
    fn trim(&self, keep: Option<&str>) {
        let evicted = {
            let mut state = self.state.lock();
            self.collect_over_capacity(&mut state, keep)
        };
        self.close_evicted(evicted, "capacity");
    }

    fn collect_over_capacity(
        &self,
        state: &mut CacheState,
        keep: Option<&str>,
    ) -> Vec<Arc<ArchiveHandle>> {
        if state.entries.len() <= self.capacity {
            return Vec::new();
        }

        let mut candidates: Vec<(u64, String)> = state
            .entries
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != keep)
            .map(|(key, slot)| (slot.last_used, key.clone()))
            .collect();
        candidates.sort_unstable();

        let mut evicted = Vec::new();
        for (_, key) in candidates {
            if state.entries.len() <= self.capacity {
                break;
            }
            let retired = state
                .entries
                .get(&key)
                .is_some_and(|slot| slot.handle.try_retire());
            if retired && let Some(slot) = state.entries.remove(&key) {
                evicted.push(slot.handle);
            }
        }
        evicted
    }

    fn sweep(&self) -> usize {
        let evicted: Vec<Arc<ArchiveHandle>> = {
            let mut state = self.state.lock();
            // Iterating leaves `last_used` untouched.
            let idle: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, slot)| !slot.handle.is_occupied())
                .map(|(key, _)| key.clone())
                .collect();

            let mut evicted = Vec::new();
            for key in idle {
                let retired = state
                    .entries
                    .get(&key)
                    .is_some_and(|slot| slot.handle.try_retire());
                if retired && let Some(slot) = state.entries.remove(&key) {
                    evicted.push(slot.handle);
                }
            }
            evicted
        };
        let count = evicted.len();
        self.close_evicted(evicted, "idle");
        count
    }

    fn close_evicted(&self, handles: Vec<Arc<ArchiveHandle>>, reason: &str) {
        for handle in handles {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            match handle.close() {
                Ok(()) => debug!(archive = handle.path(), reason, "Archive evicted"),
                Err(e) => warn!(archive = handle.path(), reason, error = %e, "Failed to close evicted archive"),
            }
        }
    }
}

/// Base-storage failures that leave room for the path being inside an
/// archive rather than on disk.
fn is_unreachable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound
            | std::io::ErrorKind::NotADirectory
            | std::io::ErrorKind::IsADirectory
    )
}

async fn run_sweeper(shared: Weak<CacheShared>, period: Duration, shutdown: CancellationToken) {
    info!(interval_ms = period.as_millis() as u64, "Idle sweep starting");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    interval.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Idle sweep shutting down");
                break;
            }

            _ = interval.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let closed = shared.sweep();
                if closed > 0 {
                    debug!(closed, "Idle sweep evicted archives");
                }
            }
        }
    }
}
