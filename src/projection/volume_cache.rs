use std::cell::RefCell;
use std::mem;

use crate::core::tile_id::CanonicalTileId;
use crate::prelude::HashMap;

/// Memoizes per-tile bounding volumes across the two most recent frames.
///
/// Volumes are keyed by canonical tile only. A lookup checks the current
/// generation, then the previous one (moving a hit forward), and computes a
/// fresh volume otherwise. [`recalculate_cache`](Self::recalculate_cache)
/// drops the previous generation and demotes the current one, but only if
/// something was computed since the last rotation, so a static view keeps
/// everything it has.
#[derive(Debug)]
pub struct BoundingVolumeCache<V> {
    generations: RefCell<Generations<V>>,
}

#[derive(Debug)]
struct Generations<V> {
    current: HashMap<CanonicalTileId, V>,
    previous: HashMap<CanonicalTileId, V>,
    dirty: bool,
}

impl<V: Clone> BoundingVolumeCache<V> {
    pub fn new() -> Self {
        Self {
            generations: RefCell::new(Generations {
                current: HashMap::default(),
                previous: HashMap::default(),
                dirty: false,
            }),
        }
    }

    pub fn get_or_compute<F>(&self, tile_id: &CanonicalTileId, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        let mut generations = self.generations.borrow_mut();
        if let Some(volume) = generations.current.get(tile_id) {
            return volume.clone();
        }
        if let Some(volume) = generations.previous.remove(tile_id) {
            generations.current.insert(*tile_id, volume.clone());
            return volume;
        }

        let volume = compute();
        generations.current.insert(*tile_id, volume.clone());
        generations.dirty = true;
        volume
    }

    /// Advances to the next frame
    pub fn recalculate_cache(&self) {
        let mut guard = self.generations.borrow_mut();
        let generations = &mut *guard;
        if !generations.dirty {
            return;
        }
        generations.previous = mem::take(&mut generations.current);
        generations.dirty = false;
    }

    /// Number of volumes held across both generations
    pub fn len(&self) -> usize {
        let generations = self.generations.borrow();
        generations.current.len() + generations.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for BoundingVolumeCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn tile(x: u32, y: u32) -> CanonicalTileId {
        CanonicalTileId::new(1, x, y)
    }

    /// Looks a tile up, returning whether the factory had to run
    fn fetch(cache: &BoundingVolumeCache<u32>, id: CanonicalTileId, counter: &Cell<u32>) -> bool {
        let before = counter.get();
        cache.get_or_compute(&id, || {
            counter.set(counter.get() + 1);
            id.x * 10 + id.y
        });
        counter.get() != before
    }

    #[test]
    fn test_retains_volumes_from_last_frame() {
        let cache = BoundingVolumeCache::new();
        let computed = Cell::new(0);

        assert!(fetch(&cache, tile(0, 0), &computed));
        cache.recalculate_cache();
        assert!(!fetch(&cache, tile(0, 0), &computed));
        assert_eq!(computed.get(), 1);
    }

    #[test]
    fn test_clears_volumes_untouched_for_a_frame() {
        let cache = BoundingVolumeCache::new();
        let computed = Cell::new(0);

        for id in [tile(0, 0), tile(1, 0), tile(0, 1)] {
            assert!(fetch(&cache, id, &computed));
        }
        cache.recalculate_cache();

        assert!(!fetch(&cache, tile(1, 0), &computed));
        assert!(!fetch(&cache, tile(0, 1), &computed));
        assert!(fetch(&cache, tile(1, 1), &computed));
        cache.recalculate_cache();

        assert!(fetch(&cache, tile(0, 0), &computed));
        assert!(!fetch(&cache, tile(0, 1), &computed));
        assert!(!fetch(&cache, tile(1, 1), &computed));
        assert_eq!(computed.get(), 5);
    }

    #[test]
    fn test_static_frames_do_not_rotate() {
        let cache = BoundingVolumeCache::new();
        let computed = Cell::new(0);

        for id in [tile(0, 0), tile(1, 0), tile(0, 1)] {
            fetch(&cache, id, &computed);
        }
        cache.recalculate_cache();

        assert!(!fetch(&cache, tile(1, 0), &computed));
        assert!(!fetch(&cache, tile(0, 1), &computed));
        cache.recalculate_cache();

        assert!(!fetch(&cache, tile(0, 0), &computed));
        assert!(!fetch(&cache, tile(0, 1), &computed));
        assert_eq!(computed.get(), 3);
        assert_eq!(cache.len(), 3);
    }
}
