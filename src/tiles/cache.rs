use fxhash::FxBuildHasher;
use lru::LruCache;

use crate::core::tile_id::{OverscaledTileId, TileKey};
use crate::tiles::tile::Tile;

/// Out-of-view tiles kept for reuse, evicting the least recently inserted.
///
/// Entries are keyed by the tile's primary-world id so a tile cached in one
/// world copy can be restored into another. The capacity is logical: the
/// underlying [`LruCache`] is unbounded and trimmed by hand so that callers
/// receive every evicted tile and can unload it.
pub struct TileCache {
    cache: LruCache<TileKey, Tile, FxBuildHasher>,
    max_size: usize,
}

impl TileCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: LruCache::unbounded_with_hasher(FxBuildHasher::default()),
            max_size,
        }
    }

    /// Insert a tile, returning whatever had to make room for it
    pub fn insert(&mut self, tile: Tile) -> Vec<Tile> {
        if self.max_size == 0 {
            return vec![tile];
        }
        let key = tile.tile_id.wrapped().key();
        let mut evicted: Vec<Tile> = self.cache.put(key, tile).into_iter().collect();
        evicted.extend(self.trim());
        evicted
    }

    /// Remove and return the tile cached for `tile_id`, in any world copy
    pub fn pop(&mut self, tile_id: &OverscaledTileId) -> Option<Tile> {
        self.cache.pop(&tile_id.wrapped().key())
    }

    /// Look at a cached tile without touching its recency
    pub fn peek(&self, tile_id: &OverscaledTileId) -> Option<&Tile> {
        self.cache.peek(&tile_id.wrapped().key())
    }

    pub fn contains(&self, tile_id: &OverscaledTileId) -> bool {
        self.cache.contains(&tile_id.wrapped().key())
    }

    /// Change the capacity, returning tiles evicted by a shrink
    pub fn set_max_size(&mut self, max_size: usize) -> Vec<Tile> {
        self.max_size = max_size;
        self.trim()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Empty the cache, returning everything it held
    pub fn clear(&mut self) -> Vec<Tile> {
        let mut drained = Vec::with_capacity(self.cache.len());
        while let Some((_, tile)) = self.cache.pop_lru() {
            drained.push(tile);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn trim(&mut self) -> Vec<Tile> {
        let mut evicted = Vec::new();
        while self.cache.len() > self.max_size {
            match self.cache.pop_lru() {
                Some((_, tile)) => evicted.push(tile),
                None => break,
            }
        }
        evicted
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("len", &self.cache.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::tile::TileState;
    use instant::Instant;

    fn loaded(z: u8, x: u32, y: u32, wrap: i32) -> Tile {
        let mut tile = Tile::new(OverscaledTileId::new(z, wrap, z, x, y), Instant::now());
        tile.state = TileState::Loaded;
        tile
    }

    #[test]
    fn test_tile_cache_basic_operations() {
        let mut cache = TileCache::new(2);
        assert!(cache.is_empty());

        assert!(cache.insert(loaded(1, 0, 0, 0)).is_empty());
        assert_eq!(cache.len(), 1);

        let id = OverscaledTileId::new(1, 0, 1, 0, 0);
        assert!(cache.contains(&id));
        assert_eq!(cache.peek(&id).map(|t| t.tile_id), Some(id));

        let popped = cache.pop(&id).unwrap();
        assert_eq!(popped.tile_id, id);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tile_cache_lru_eviction() {
        let mut cache = TileCache::new(2);
        cache.insert(loaded(1, 0, 0, 0));
        cache.insert(loaded(1, 1, 0, 0));

        // peeking does not refresh recency
        cache.peek(&OverscaledTileId::new(1, 0, 1, 0, 0));

        let evicted = cache.insert(loaded(1, 0, 1, 0));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].tile_id, OverscaledTileId::new(1, 0, 1, 0, 0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_world_copies_share_a_slot() {
        let mut cache = TileCache::new(4);
        cache.insert(loaded(2, 1, 1, 2));

        let other_world = OverscaledTileId::new(2, -1, 2, 1, 1);
        let restored = cache.pop(&other_world).unwrap();
        assert_eq!(restored.tile_id.wrap, 2);

        cache.insert(loaded(2, 1, 1, 0));
        let replaced = cache.insert(loaded(2, 1, 1, 1));
        assert_eq!(replaced.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shrinking_evicts_oldest() {
        let mut cache = TileCache::new(3);
        cache.insert(loaded(1, 0, 0, 0));
        cache.insert(loaded(1, 1, 0, 0));
        cache.insert(loaded(1, 0, 1, 0));

        let evicted = cache.set_max_size(1);
        assert_eq!(evicted.len(), 2);
        assert!(cache.contains(&OverscaledTileId::new(1, 0, 1, 0, 1)));

        assert_eq!(cache.set_max_size(0).len(), 1);
        assert_eq!(cache.insert(loaded(1, 1, 1, 0)).len(), 1);
        assert_eq!(cache.clear().len(), 0);
    }
}
