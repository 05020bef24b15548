//! Tile cache for encoded PNG tiles.
//!
//! Entries are keyed by [`TileAddress`] and bounded by entry count: once the
//! cache holds `capacity` tiles, inserting a new one evicts the
//! least-recently-used entry. A hit refreshes the entry's recency. There is no
//! TTL; capacity is the only eviction trigger.
//!
//! Empty (out-of-extent) tiles are cached like any other, so repeated requests
//! for blank areas skip the pipeline entirely.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use super::grid::TileAddress;

/// Default number of cached tiles.
pub const DEFAULT_CACHE_TILES: NonZeroUsize = match NonZeroUsize::new(2000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Mutable cache state, kept behind one lock.
struct CacheState {
    entries: LruCache<TileAddress, Bytes>,

    /// Total payload bytes currently cached
    bytes: usize,
}

/// LRU cache of encoded tiles with a fixed maximum entry count.
///
/// # Thread Safety
///
/// Lookups reorder the recency list, so both `get` and `put` take the same
/// mutex. The lock is never held across tile rendering.
pub struct TileCache {
    state: Mutex<CacheState>,
    capacity: NonZeroUsize,
}

impl TileCache {
    /// Create a cache holding the default 2000 tiles.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_TILES)
    }

    /// Create a cache holding at most `capacity` tiles.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                bytes: 0,
            }),
            capacity,
        }
    }

    /// Get a tile, marking it most recently used.
    pub async fn get(&self, key: &TileAddress) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        state.entries.get(key).cloned()
    }

    /// Check for a tile without touching recency order.
    pub async fn contains(&self, key: &TileAddress) -> bool {
        let state = self.state.lock().await;
        state.entries.contains(key)
    }

    /// Store a tile.
    ///
    /// A new key at capacity evicts the least-recently-used tile. Storing a key
    /// that is already cached replaces its payload in place and marks it most
    /// recently used; it never evicts another tile, even at capacity. This
    /// happens when concurrent misses render the same tile.
    pub async fn put(&self, key: TileAddress, data: Bytes) {
        let mut state = self.state.lock().await;
        let size = data.len();

        if let Some((_, old)) = state.entries.push(key, data) {
            // Either the replaced payload for this key or the evicted LRU tile
            state.bytes = state.bytes.saturating_sub(old.len());
        }
        state.bytes += size;
    }

    /// Remove all tiles.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.bytes = 0;
    }

    /// Number of cached tiles.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Total payload bytes cached.
    pub async fn size(&self) -> usize {
        self.state.lock().await.bytes
    }

    /// Maximum number of tiles.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
