//! Decoded tile cache with single-flight decoding.
//!
//! Tiles are cached by [`TileKey`] and bounded by the total size of their
//! pixel buffers. Entries leave in least-recently-used order, except that an
//! entry is never evicted while a [`TileRef`] to it is alive.
//!
//! # Single flight
//!
//! Only one decode per key runs at a time. The first caller to miss becomes
//! the leader and registers an in-flight marker; later callers for the same
//! key wait on the marker's [`Notify`] and then look the key up again. Locks
//! are held for bookkeeping only, never across the decode itself.

use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use lru::LruCache;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::buffer::PixelBuffer;
use crate::error::SlideError;

/// Default cache capacity: 256MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

// =============================================================================
// Cache Key
// =============================================================================

/// Identifies one decodable tile of an open slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileKey {
    /// Pyramid level (0 = full resolution)
    pub level: usize,

    /// Tile column
    pub col: u32,

    /// Tile row
    pub row: u32,
}

impl TileKey {
    pub fn new(level: usize, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }
}

// =============================================================================
// Tile References
// =============================================================================

/// A decoded tile handed out by the cache.
///
/// Holding a `TileRef` pins the cache entry it came from.
#[derive(Debug)]
pub struct TileRef {
    tile: Arc<PixelBuffer>,
    pins: Arc<AtomicUsize>,
}

impl TileRef {
    fn pinned(tile: Arc<PixelBuffer>, pins: Arc<AtomicUsize>) -> Self {
        pins.fetch_add(1, Ordering::AcqRel);
        Self { tile, pins }
    }

    /// Shared handle to the pixels, valid independently of the cache.
    pub fn buffer(&self) -> Arc<PixelBuffer> {
        Arc::clone(&self.tile)
    }
}

impl Deref for TileRef {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        &self.tile
    }
}

impl Clone for TileRef {
    fn clone(&self) -> Self {
        Self::pinned(Arc::clone(&self.tile), Arc::clone(&self.pins))
    }
}

impl Drop for TileRef {
    fn drop(&mut self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters describing cache behavior since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache, including callers that waited on
    /// another caller's decode
    pub hits: u64,

    /// Lookups that started a decode
    pub misses: u64,

    /// Decodes that completed successfully
    pub decodes: u64,

    /// Entries removed to make room
    pub evictions: u64,

    /// Entries currently cached
    pub entries: usize,

    /// Bytes currently cached
    pub bytes: usize,
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheEntry {
    tile: Arc<PixelBuffer>,
    pins: Arc<AtomicUsize>,
    size: usize,
}

struct CacheState {
    entries: LruCache<TileKey, CacheEntry>,
    size: usize,
}

/// Bounded cache of decoded tiles.
///
/// Share it across tasks through the owning [`Slide`](crate::slide::Slide).
pub struct TileCache {
    state: Mutex<CacheState>,
    in_flight: StdMutex<HashMap<TileKey, Arc<Notify>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    decodes: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    /// Create a new tile cache with default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache holding at most `capacity` bytes of pixels.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                size: 0,
            }),
            in_flight: StdMutex::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            decodes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Maximum total size of cached tiles in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the cached tile for `key`, decoding it with `decode` on a miss.
    ///
    /// Concurrent callers for the same key share one decode. A failed decode
    /// is not cached: its error goes to the leader, and waiting callers
    /// retry with their own `decode`.
    pub async fn get_or_decode<F, Fut>(
        &self,
        key: TileKey,
        decode: F,
    ) -> Result<TileRef, SlideError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PixelBuffer, SlideError>>,
    {
        loop {
            if let Some(tile) = self.get(&key).await {
                return Ok(tile);
            }

            let waiting_on = {
                let mut in_flight = self.lock_in_flight();
                match in_flight.get(&key) {
                    Some(notify) => Some(Arc::clone(notify)),
                    None => {
                        in_flight.insert(key, Arc::new(Notify::new()));
                        None
                    }
                }
            };

            if let Some(notify) = waiting_on {
                let notified = notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                // The leader may have finished before we registered
                if self.is_leader_marker(&key, &notify) {
                    notified.await;
                }
                continue;
            }

            // Leader from here on; the guard clears the marker on every exit
            let _guard = InFlightGuard { cache: self, key };

            // A previous leader may have inserted between our lookup and
            // registering the marker
            if let Some(tile) = self.get(&key).await {
                return Ok(tile);
            }

            self.misses.fetch_add(1, Ordering::Relaxed);
            let buffer = decode().await?;
            self.decodes.fetch_add(1, Ordering::Relaxed);
            return Ok(self.insert(key, buffer).await);
        }
    }

    /// Look up a tile, marking it recently used.
    pub async fn get(&self, key: &TileKey) -> Option<TileRef> {
        let mut state = self.state.lock().await;
        let entry = state.entries.get(key)?;
        let tile = TileRef::pinned(Arc::clone(&entry.tile), Arc::clone(&entry.pins));
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(tile)
    }

    /// Check if a tile is cached without updating LRU order.
    pub async fn contains(&self, key: &TileKey) -> bool {
        self.state.lock().await.entries.contains(key)
    }

    /// Insert a decoded tile and return a pinned reference to it.
    ///
    /// A tile larger than the whole capacity is returned without being
    /// retained.
    pub async fn insert(&self, key: TileKey, buffer: PixelBuffer) -> TileRef {
        let size = buffer.byte_len();
        let tile = Arc::new(buffer);
        let pins = Arc::new(AtomicUsize::new(0));
        let tile_ref = TileRef::pinned(Arc::clone(&tile), Arc::clone(&pins));

        if size > self.capacity {
            debug!(
                level = key.level,
                col = key.col,
                row = key.row,
                size,
                capacity = self.capacity,
                "tile exceeds cache capacity, not retained"
            );
            return tile_ref;
        }

        let mut state = self.state.lock().await;
        if let Some(old) = state.entries.put(key, CacheEntry { tile, pins, size }) {
            state.size = state.size.saturating_sub(old.size);
        }
        state.size += size;
        self.evict(&mut state);
        tile_ref
    }

    /// Evict unpinned entries, oldest first, until within capacity.
    fn evict(&self, state: &mut CacheState) {
        while state.size > self.capacity {
            let victim = state
                .entries
                .iter()
                .rev()
                .find(|(_, entry)| entry.pins.load(Ordering::Acquire) == 0)
                .map(|(key, _)| *key);
            let Some(key) = victim else {
                // Everything left is pinned; retry on the next insert
                break;
            };
            if let Some(entry) = state.entries.pop(&key) {
                state.size = state.size.saturating_sub(entry.size);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    level = key.level,
                    col = key.col,
                    row = key.row,
                    size = entry.size,
                    "evicted tile"
                );
            }
        }
    }

    /// Drop every entry. Outstanding [`TileRef`]s stay valid.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.size = 0;
    }

    /// Current number of cached tiles.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        self.state.lock().await.size
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            decodes: self.decodes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: state.entries.len(),
            bytes: state.size,
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<TileKey, Arc<Notify>>> {
        // The map stays consistent even if a holder panicked
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_leader_marker(&self, key: &TileKey, notify: &Arc<Notify>) -> bool {
        self.lock_in_flight()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, notify))
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a leader's in-flight marker and wakes its waiters.
struct InFlightGuard<'a> {
    cache: &'a TileCache,
    key: TileKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(notify) = self.cache.lock_in_flight().remove(&self.key) {
            notify.notify_waiters();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
