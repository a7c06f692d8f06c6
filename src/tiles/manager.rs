//! Tile retention engine.
//!
//! [`TileManager`] owns every resident tile of one source. Each update takes
//! the ideal tiles from the coverage selector and decides what stays
//! resident:
//!
//! * ideal tiles are always kept, and requested if new;
//! * ideal tiles without data are stood in for by loaded descendants, or
//!   failing that by the nearest loaded ancestor;
//! * raster tiles still fading in keep their loaded parent around;
//! * everything else leaves: loaded tiles go to the LRU cache, tiles without
//!   data are aborted and unloaded.
//!
//! Loads complete asynchronously through a channel and are applied at the
//! start of the next update. Each request carries a stamp, so completions
//! for tiles that were removed or re-requested in the meantime are ignored.

use crossbeam_channel::{unbounded, Receiver, Sender};
use fxhash::{FxHashMap, FxHashSet};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    config::{CoveringTilesOptions, TileCacheProfile, TileManagerConfig},
    constants::{MAX_OVERZOOMING, MAX_UNDERZOOMING, MAX_WRAP, MIN_WRAP},
    tile_id::{CanonicalTileId, OverscaledTileId, TileKey},
    transform::Transform,
};
use crate::projection::ElevationProvider;
use crate::tiles::{
    cache::TileCache,
    covering::{compute_coverage, covering_zoom_level},
    loader::{LoadError, TileCompletion, TileRequest},
    source::{validate_source, TileSource},
    tile::{Tile, TileState},
};
use crate::Result;

/// Lowest zoom of the extra ancestor kept for terrain sampling
const TERRAIN_ANCESTOR_MAX_ZOOM: u8 = 5;

/// Per-tile notifications, collected until [`TileManager::drain_events`]
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    /// A new tile was created and its load started
    DataLoading(OverscaledTileId),
    Loaded(OverscaledTileId),
    Error {
        tile_id: OverscaledTileId,
        error: LoadError,
    },
    /// A tile was removed before its load finished
    Aborted(OverscaledTileId),
}

/// Keeps the tiles of one source resident across view changes
pub struct TileManager<S: TileSource> {
    source: S,
    config: TileManagerConfig,
    /// Options derived from the source, without terrain
    source_options: CoveringTilesOptions,
    options: CoveringTilesOptions,
    terrain: Option<Arc<dyn ElevationProvider>>,
    tiles: FxHashMap<TileKey, Tile>,
    cache: TileCache,
    /// Parents kept only for fading; resident but not rendered
    covered: FxHashSet<TileKey>,
    /// Request stamp to the key of the tile waiting for it
    pending: FxHashMap<u64, TileKey>,
    next_request_id: u64,
    completion_tx: Sender<TileCompletion>,
    completion_rx: Receiver<TileCompletion>,
    events: Vec<TileEvent>,
    prev_lng: Option<f64>,
    cancel_pending_while_zooming: bool,
}

impl<S: TileSource> TileManager<S> {
    /// Create a manager, rejecting an invalid config or source zoom range
    pub fn new(source: S, config: TileManagerConfig) -> Result<Self> {
        config.validate()?;
        validate_source(&source)?;
        let source_options = source.covering_options()?;
        let (completion_tx, completion_rx) = unbounded();

        Ok(Self {
            cache: TileCache::new(config.max_tile_cache_size.unwrap_or(0)),
            cancel_pending_while_zooming: config.cancel_pending_while_zooming,
            options: source_options.clone(),
            source_options,
            source,
            config,
            terrain: None,
            tiles: FxHashMap::default(),
            covered: FxHashSet::default(),
            pending: FxHashMap::default(),
            next_request_id: 0,
            completion_tx,
            completion_rx,
            events: Vec::new(),
            prev_lng: None,
        })
    }

    pub fn with_profile(source: S, profile: TileCacheProfile) -> Result<Self> {
        Self::new(source, profile.resolve())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn config(&self) -> &TileManagerConfig {
        &self.config
    }

    /// Coverage options used by [`TileManager::update`]
    pub fn covering_options(&self) -> &CoveringTilesOptions {
        &self.options
    }

    /// Raise while the user zooms in to let go of parents that are still
    /// loading. Read again on every update.
    pub fn set_cancel_pending_while_zooming(&mut self, cancel: bool) {
        self.cancel_pending_while_zooming = cancel;
    }

    /// Terrain enlarges tile volumes during coverage and turns off fading
    pub fn set_terrain(&mut self, terrain: Option<Arc<dyn ElevationProvider>>) -> Result<()> {
        self.options = match &terrain {
            Some(terrain) => self
                .source_options
                .to_builder()
                .terrain(Arc::clone(terrain))
                .build()?,
            None => self.source_options.clone(),
        };
        self.terrain = terrain;
        Ok(())
    }

    pub fn set_raster_fade_duration(&mut self, duration: Duration) {
        self.config.raster_fade_duration_ms = duration.as_millis() as u64;
        if duration.is_zero() {
            return;
        }
        for tile in self.tiles.values_mut().filter(|tile| tile.has_data()) {
            tile.register_fade_duration(duration);
        }
    }

    /// Apply finished loads, then bring the resident set in line with the view
    pub fn update(&mut self, transform: &Transform) {
        self.update_at(transform, Instant::now());
    }

    pub fn update_at(&mut self, transform: &Transform, now: Instant) {
        self.process_completions_at(now);
        self.update_cache_size(transform);
        self.handle_wrap_jump(transform.center().lng);

        let mut ideal = compute_coverage(transform, &self.options);
        ideal.retain(|tile_id| self.source.has_tile(tile_id));
        if self.config.used_for_terrain {
            ideal = self.add_terrain_ideal_tiles(ideal);
        }

        let zoom = covering_zoom_level(transform, &self.options);
        self.update_with_ideal(&ideal, zoom, now);
    }

    /// Retain `ideal` and its substitutes, releasing every other tile.
    ///
    /// `zoom` is the covering zoom of the view; substitute parents are only
    /// searched down to `MAX_UNDERZOOMING` levels below it.
    pub fn update_with_ideal(&mut self, ideal: &[OverscaledTileId], zoom: u8, now: Instant) {
        let mut retain = self.update_retained_tiles(ideal, zoom, now);

        self.covered.clear();
        if self.fade_enabled() {
            self.update_fading_tiles(&mut retain, zoom, now);
        }

        let released: Vec<TileKey> = self
            .tiles
            .keys()
            .filter(|key| !retain.contains(key))
            .copied()
            .collect();
        for key in released {
            self.remove_tile(key);
        }

        log::trace!(
            "retained {} tiles for {} ideal ({} cached, {} pending)",
            self.tiles.len(),
            ideal.len(),
            self.cache.len(),
            self.pending.len()
        );
    }

    pub fn process_completions(&mut self) {
        self.process_completions_at(Instant::now());
    }

    pub fn process_completions_at(&mut self, now: Instant) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.handle_completion(completion, now);
        }
    }

    fn handle_completion(&mut self, completion: TileCompletion, now: Instant) {
        let fade = self.fade_duration();
        let Some(key) = self.pending.remove(&completion.request_id) else {
            log::trace!(
                "dropping stale completion for {} (request {})",
                completion.tile_id,
                completion.request_id
            );
            return;
        };
        let Some(tile) = self
            .tiles
            .get_mut(&key)
            .filter(|tile| tile.request_id == completion.request_id)
        else {
            log::trace!("dropping completion for removed tile {}", completion.tile_id);
            return;
        };

        match completion.result {
            Ok(()) => {
                tile.state = TileState::Loaded;
                tile.time_added = now;
                if let Some(fade) = fade {
                    tile.register_fade_duration(fade);
                }
                self.events.push(TileEvent::Loaded(tile.tile_id));
            }
            Err(LoadError::NotFound) => {
                log::debug!("tile {} not found", tile.tile_id);
                tile.state = TileState::Errored;
            }
            Err(LoadError::Aborted) => {
                log::debug!("tile {} aborted by its source", tile.tile_id);
                tile.state = TileState::Errored;
            }
            Err(error) => {
                log::warn!("failed to load tile {}: {}", tile.tile_id, error);
                tile.state = TileState::Errored;
                self.events.push(TileEvent::Error {
                    tile_id: tile.tile_id,
                    error,
                });
            }
        }
    }

    fn update_retained_tiles(
        &mut self,
        ideal: &[OverscaledTileId],
        zoom: u8,
        now: Instant,
    ) -> FxHashSet<TileKey> {
        let mut missing = Vec::new();
        for tile_id in ideal {
            if !self.add_tile(*tile_id, now).has_data() {
                missing.push(*tile_id);
            }
        }

        let mut retain: FxHashSet<TileKey> = ideal.iter().map(OverscaledTileId::key).collect();
        let incomplete = self.retain_loaded_children(&mut retain, &missing);

        // Walk up from each ideal tile the children could not cover. A parent
        // is only requested when the tile below it already failed.
        let mut checked = FxHashSet::default();
        let min_covering_zoom = zoom
            .saturating_sub(MAX_UNDERZOOMING)
            .max(self.source.min_zoom());
        for tile_id in incomplete {
            let mut parent_was_requested = self
                .tiles
                .get(&tile_id.key())
                .is_some_and(Tile::was_requested);

            for overscaled_z in (min_covering_zoom..tile_id.overscaled_z).rev() {
                let parent_id = tile_id.scaled_to(overscaled_z);
                let parent_key = parent_id.key();
                if !checked.insert(parent_key) {
                    break;
                }

                if parent_was_requested && !self.tiles.contains_key(&parent_key) {
                    self.add_tile(parent_id, now);
                }
                let Some(parent) = self.tiles.get(&parent_key) else {
                    continue;
                };

                let has_data = parent.has_data();
                if has_data || !self.cancel_pending_while_zooming || parent_was_requested {
                    retain.insert(parent_key);
                }
                parent_was_requested = parent.was_requested();
                if has_data {
                    break;
                }
            }
        }

        retain
    }

    /// Retains the shallowest generation of loaded descendants of each
    /// target, at most `MAX_OVERZOOMING` levels down. Returns the targets
    /// that generation does not cover completely.
    fn retain_loaded_children(
        &self,
        retain: &mut FxHashSet<TileKey>,
        targets: &[OverscaledTileId],
    ) -> Vec<OverscaledTileId> {
        let mut incomplete = Vec::new();
        for target in targets {
            let max_covering_zoom = target.overscaled_z.saturating_add(MAX_OVERZOOMING);
            let candidates: Vec<OverscaledTileId> = self
                .tiles
                .values()
                .filter(|tile| tile.has_data() && tile.tile_id.is_child_of(target))
                .map(|tile| tile.tile_id)
                .filter(|tile_id| tile_id.overscaled_z <= max_covering_zoom)
                .collect();

            let Some(top_zoom) = candidates.iter().map(|tile_id| tile_id.overscaled_z).min() else {
                incomplete.push(*target);
                continue;
            };
            let generation: Vec<OverscaledTileId> = candidates
                .into_iter()
                .filter(|tile_id| tile_id.overscaled_z == top_zoom)
                .collect();
            retain.extend(generation.iter().map(OverscaledTileId::key));

            if !descendants_complete(&generation, top_zoom, target.overscaled_z) {
                incomplete.push(*target);
            }
        }
        incomplete
    }

    fn update_fading_tiles(&mut self, retain: &mut FxHashSet<TileKey>, zoom: u8, now: Instant) {
        let min_covering_zoom = zoom
            .saturating_sub(MAX_UNDERZOOMING)
            .max(self.source.min_zoom());
        let fading: Vec<OverscaledTileId> = retain
            .iter()
            .filter_map(|key| self.tiles.get(key))
            .filter(|tile| tile.is_fading(now))
            .map(|tile| tile.tile_id)
            .collect();

        let mut parents = Vec::new();
        for tile_id in &fading {
            if let Some(parent) = self.find_loaded_parent_at(tile_id, min_covering_zoom, now) {
                parents.push(parent);
            }
        }

        // Children stay while a parent fades in on top of them; the fading
        // tile itself covers any gap they leave
        let _incomplete = self.retain_loaded_children(retain, &fading);

        for parent in parents {
            let key = parent.key();
            if retain.insert(key) {
                self.covered.insert(key);
            }
        }
    }

    fn add_terrain_ideal_tiles(&self, mut ideal: Vec<OverscaledTileId>) -> Vec<OverscaledTileId> {
        let min_zoom = self.source.min_zoom();
        let mut seen: FxHashSet<TileKey> = ideal.iter().map(OverscaledTileId::key).collect();
        let mut ancestors = Vec::new();
        for tile_id in &ideal {
            let z = tile_id.canonical.z;
            if z <= min_zoom {
                continue;
            }
            let parent = tile_id.scaled_to(z - 1);
            let low = tile_id.scaled_to(min_zoom.max(z.min(TERRAIN_ANCESTOR_MAX_ZOOM)));
            for ancestor in [parent, low] {
                if seen.insert(ancestor.key()) {
                    ancestors.push(ancestor);
                }
            }
        }
        ideal.extend(ancestors);
        ideal
    }

    /// Make `tile_id` resident: reuse it, restore it from the cache, or
    /// create it and start its load
    fn add_tile(&mut self, tile_id: OverscaledTileId, now: Instant) -> &mut Tile {
        let key = tile_id.key();
        if !self.tiles.contains_key(&key) {
            let tile = match self.cache.pop(&tile_id) {
                Some(tile) => self.restore_cached(tile, tile_id, now),
                None => self.create_tile(tile_id, now),
            };
            self.tiles.insert(key, tile);
        }

        let tile = self
            .tiles
            .entry(key)
            .or_insert_with(|| Tile::new(tile_id, now));
        tile.uses += 1;
        tile
    }

    fn restore_cached(&self, mut tile: Tile, tile_id: OverscaledTileId, now: Instant) -> Tile {
        // the cached copy may come from another world copy
        tile.tile_id = tile_id;
        tile.reset_fade();
        if let Some(fade) = self.fade_duration() {
            tile.time_added = now;
            tile.register_fade_duration(fade);
        }
        log::trace!("restored tile {} from cache", tile_id);
        tile
    }

    fn create_tile(&mut self, tile_id: OverscaledTileId, now: Instant) -> Tile {
        let mut tile = Tile::new(tile_id, now);
        self.request_load(&mut tile);
        self.events.push(TileEvent::DataLoading(tile_id));
        tile
    }

    fn request_load(&mut self, tile: &mut Tile) {
        self.next_request_id += 1;
        tile.request_id = self.next_request_id;
        self.pending.insert(tile.request_id, tile.tile_id.key());
        log::debug!("requesting tile {} (request {})", tile.tile_id, tile.request_id);
        self.source.load_tile(TileRequest::new(
            tile.tile_id,
            tile.request_id,
            self.completion_tx.clone(),
        ));
    }

    fn reload_tile(&mut self, key: TileKey, state: TileState) {
        let Some(mut tile) = self.tiles.remove(&key) else {
            return;
        };
        // a tile without data cannot start rendering old data
        if tile.state != TileState::Loading {
            tile.state = state;
        }
        self.pending.remove(&tile.request_id);
        self.request_load(&mut tile);
        self.tiles.insert(key, tile);
    }

    fn remove_tile(&mut self, key: TileKey) {
        self.covered.remove(&key);
        if let Some(tile) = self.tiles.remove(&key) {
            self.dispose_tile(tile);
        }
    }

    fn dispose_tile(&mut self, mut tile: Tile) {
        tile.uses = tile.uses.saturating_sub(1);
        if tile.has_data() && tile.state != TileState::Reloading {
            let evicted = self.cache.insert(tile);
            self.unload_evicted(evicted);
            return;
        }

        self.pending.remove(&tile.request_id);
        if tile.is_loading() {
            log::debug!("aborting tile {}", tile.tile_id);
            tile.aborted = true;
            self.source.abort_tile(&tile);
            self.events.push(TileEvent::Aborted(tile.tile_id));
        }
        self.source.unload_tile(&tile);
    }

    fn unload_evicted(&mut self, evicted: Vec<Tile>) {
        for tile in evicted {
            log::debug!("evicting cached tile {}", tile.tile_id);
            self.source.unload_tile(&tile);
        }
    }

    /// Size the cache to hold `cache_zoom_levels` viewports worth of tiles
    pub fn update_cache_size(&mut self, transform: &Transform) {
        let tile_size = f64::from(self.source.tile_size());
        let width_in_tiles = (transform.width() / tile_size).ceil() as usize + 1;
        let height_in_tiles = (transform.height() / tile_size).ceil() as usize + 1;
        let view_dependent = width_in_tiles * height_in_tiles * self.config.cache_zoom_levels;
        let max_size = self
            .config
            .max_tile_cache_size
            .map_or(view_dependent, |cap| cap.min(view_dependent));

        let evicted = self.cache.set_max_size(max_size);
        self.unload_evicted(evicted);
    }

    /// Re-key resident tiles when the center longitude jumps by whole worlds,
    /// so the same tiles keep rendering in their new world copy
    pub fn handle_wrap_jump(&mut self, lng: f64) {
        let prev_lng = self.prev_lng.unwrap_or(lng);
        let wrap_delta = ((lng - prev_lng) / 360.0).round() as i32;
        self.prev_lng = Some(lng);
        if wrap_delta == 0 {
            return;
        }

        log::debug!("wrap jump of {} worlds, re-keying {} tiles", wrap_delta, self.tiles.len());
        let tiles = std::mem::take(&mut self.tiles);
        let covered = std::mem::take(&mut self.covered);
        for (old_key, mut tile) in tiles {
            let wrap = tile.tile_id.wrap + wrap_delta;
            if !(MIN_WRAP..=MAX_WRAP).contains(&wrap) {
                self.dispose_tile(tile);
                continue;
            }
            tile.tile_id = tile.tile_id.unwrap_to(wrap);
            let key = tile.tile_id.key();
            if let Some(pending_key) = self.pending.get_mut(&tile.request_id) {
                *pending_key = key;
            }
            if covered.contains(&old_key) {
                self.covered.insert(key);
            }
            self.tiles.insert(key, tile);
        }
    }

    /// Drop the cache and fetch every resident tile again. Loaded tiles keep
    /// rendering their old data meanwhile.
    pub fn reload(&mut self) {
        let evicted = self.cache.clear();
        self.unload_evicted(evicted);

        let keys: Vec<TileKey> = self
            .tiles
            .iter()
            .filter(|(_, tile)| tile.state != TileState::Errored)
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.reload_tile(key, TileState::Reloading);
        }
    }

    /// Fetch the listed tiles again, errored ones included
    pub fn refresh_tiles(&mut self, tile_ids: &[CanonicalTileId]) {
        let targets: Vec<(TileKey, TileState)> = self
            .tiles
            .iter()
            .filter(|(key, tile)| {
                (self.is_renderable(key, tile) || tile.state == TileState::Errored)
                    && tile_ids.contains(&tile.tile_id.canonical)
            })
            .map(|(key, tile)| {
                let state = if tile.state == TileState::Errored {
                    TileState::Loading
                } else {
                    TileState::Reloading
                };
                (*key, state)
            })
            .collect();
        for (key, state) in targets {
            self.reload_tile(key, state);
        }
    }

    /// Remove every tile, resident and cached, through the source
    pub fn clear_tiles(&mut self) {
        let keys: Vec<TileKey> = self.tiles.keys().copied().collect();
        for key in keys {
            self.remove_tile(key);
        }
        let evicted = self.cache.clear();
        self.unload_evicted(evicted);
        self.covered.clear();
    }

    /// True once no resident tile is waiting on a load
    pub fn are_tiles_loaded(&self) -> bool {
        self.tiles
            .values()
            .all(|tile| matches!(tile.state, TileState::Loaded | TileState::Errored))
    }

    pub fn get_tile(&self, tile_id: &OverscaledTileId) -> Option<&Tile> {
        self.tiles.get(&tile_id.key())
    }

    /// Resident tile with data; cached tiles do not count
    pub fn get_loaded_tile(&self, tile_id: &OverscaledTileId) -> Option<&Tile> {
        self.get_tile(tile_id).filter(|tile| tile.has_data())
    }

    /// Every resident tile id, in render order
    pub fn tile_ids(&self) -> Vec<OverscaledTileId> {
        let mut ids: Vec<OverscaledTileId> = self.tiles.values().map(|tile| tile.tile_id).collect();
        ids.sort_by(|a, b| a.render_cmp(b));
        ids
    }

    /// Tiles to draw: resident with data and not only kept for fading
    pub fn get_renderable_ids(&self) -> Vec<OverscaledTileId> {
        let mut ids: Vec<OverscaledTileId> = self
            .tiles
            .iter()
            .filter(|(key, tile)| self.is_renderable(key, tile))
            .map(|(_, tile)| tile.tile_id)
            .collect();
        ids.sort_by(|a, b| a.render_cmp(b));
        ids
    }

    pub fn is_covered(&self, tile_id: &OverscaledTileId) -> bool {
        self.covered.contains(&tile_id.key())
    }

    /// Nearest ancestor with data at or above `min_zoom`. An ancestor found
    /// in the cache is made resident again.
    pub fn find_loaded_parent(
        &mut self,
        tile_id: &OverscaledTileId,
        min_zoom: u8,
    ) -> Option<OverscaledTileId> {
        self.find_loaded_parent_at(tile_id, min_zoom, Instant::now())
    }

    fn find_loaded_parent_at(
        &mut self,
        tile_id: &OverscaledTileId,
        min_zoom: u8,
        now: Instant,
    ) -> Option<OverscaledTileId> {
        for z in (min_zoom..tile_id.overscaled_z).rev() {
            let parent = tile_id.scaled_to(z);
            if self.get_loaded_tile(&parent).is_some() {
                return Some(parent);
            }
            if self.cache.peek(&parent).is_some_and(Tile::has_data) {
                self.add_tile(parent, now);
                return Some(parent);
            }
        }
        None
    }

    /// The tile itself with data, resident or cached in any world copy
    pub fn find_loaded_sibling(&self, tile_id: &OverscaledTileId) -> Option<&Tile> {
        self.get_loaded_tile(tile_id)
            .or_else(|| self.cache.peek(tile_id).filter(|tile| tile.has_data()))
    }

    /// Whether the nearest loaded ancestor of `tile_id` is drawn
    pub fn has_renderable_parent(&self, tile_id: &OverscaledTileId) -> bool {
        (0..tile_id.overscaled_z)
            .rev()
            .map(|z| tile_id.scaled_to(z))
            .find_map(|parent| {
                let key = parent.key();
                self.tiles
                    .get(&key)
                    .filter(|tile| tile.has_data())
                    .map(|tile| self.is_renderable(&key, tile))
            })
            .unwrap_or(false)
    }

    pub fn drain_events(&mut self) -> Vec<TileEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_max_size(&self) -> usize {
        self.cache.max_size()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn is_renderable(&self, key: &TileKey, tile: &Tile) -> bool {
        tile.has_data() && !self.covered.contains(key)
    }

    fn fade_duration(&self) -> Option<Duration> {
        let duration = self.config.raster_fade_duration();
        (!duration.is_zero() && self.source.is_raster()).then_some(duration)
    }

    fn fade_enabled(&self) -> bool {
        self.fade_duration().is_some() && self.terrain.is_none()
    }
}

impl<S: TileSource + std::fmt::Debug> std::fmt::Debug for TileManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("source", &self.source)
            .field("config", &self.config)
            .field("tiles", &self.tiles.len())
            .field("cache", &self.cache)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// A generation covers its ancestor when it is a single overscaled tile or
/// holds all `4^dz` tiles
fn descendants_complete(generation: &[OverscaledTileId], generation_z: u8, ancestor_z: u8) -> bool {
    if let [only] = generation {
        if only.is_overscaled() {
            return only.overscaled_z == generation_z;
        }
    }
    let expected = 4usize.checked_pow(u32::from(generation_z.saturating_sub(ancestor_z)));
    expected == Some(generation.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;
    use crate::tiles::loader::TileLoadResult;

    /// Source that records requests and leaves them open until told otherwise
    #[derive(Debug, Default)]
    struct ManualSource {
        max_zoom: Option<u8>,
        requests: Vec<TileRequest>,
        aborted: Vec<OverscaledTileId>,
        unloaded: Vec<OverscaledTileId>,
    }

    impl ManualSource {
        fn finish(&mut self, tile_id: OverscaledTileId, result: TileLoadResult) {
            let index = self
                .requests
                .iter()
                .rposition(|request| request.tile_id() == tile_id)
                .expect("no open request for tile");
            self.requests.remove(index).complete(result);
        }

        fn finish_all(&mut self) {
            for request in self.requests.drain(..) {
                request.complete(Ok(()));
            }
        }
    }

    impl TileSource for ManualSource {
        fn max_zoom(&self) -> u8 {
            self.max_zoom.unwrap_or(22)
        }

        fn load_tile(&mut self, request: TileRequest) {
            self.requests.push(request);
        }

        fn abort_tile(&mut self, tile: &Tile) {
            self.aborted.push(tile.tile_id);
        }

        fn unload_tile(&mut self, tile: &Tile) {
            self.unloaded.push(tile.tile_id);
        }
    }

    fn id(z: u8, x: u32, y: u32) -> OverscaledTileId {
        OverscaledTileId::new(z, 0, z, x, y)
    }

    fn manager() -> TileManager<ManualSource> {
        TileManager::new(ManualSource::default(), TileManagerConfig::default()).unwrap()
    }

    fn set(ids: &[OverscaledTileId]) -> FxHashSet<OverscaledTileId> {
        ids.iter().copied().collect()
    }

    fn resident(manager: &TileManager<ManualSource>) -> FxHashSet<OverscaledTileId> {
        manager.tile_ids().into_iter().collect()
    }

    #[test]
    fn test_new_tile_is_requested_once() {
        let mut manager = manager();
        let now = Instant::now();
        manager.update_with_ideal(&[id(1, 0, 0)], 1, now);
        manager.update_with_ideal(&[id(1, 0, 0)], 1, now);

        assert_eq!(manager.source().requests.len(), 1);
        assert_eq!(manager.get_tile(&id(1, 0, 0)).unwrap().uses, 2);
        assert_eq!(manager.drain_events(), vec![TileEvent::DataLoading(id(1, 0, 0))]);
        assert!(!manager.are_tiles_loaded());
    }

    #[test]
    fn test_completion_marks_loaded() {
        let mut manager = manager();
        let now = Instant::now();
        manager.update_with_ideal(&[id(1, 0, 0)], 1, now);
        manager.source_mut().finish_all();
        manager.process_completions_at(now);

        assert_eq!(manager.get_tile(&id(1, 0, 0)).unwrap().state, TileState::Loaded);
        assert!(manager.are_tiles_loaded());
        assert_eq!(manager.get_renderable_ids(), vec![id(1, 0, 0)]);
    }

    #[test]
    fn test_not_found_errors_quietly() {
        let mut manager = manager();
        let now = Instant::now();
        manager.update_with_ideal(&[id(2, 1, 1), id(2, 2, 1)], 2, now);
        manager.drain_events();
        manager.source_mut().finish(id(2, 1, 1), Err(LoadError::NotFound));
        manager
            .source_mut()
            .finish(id(2, 2, 1), Err(LoadError::Failed("HTTP 500".into())));
        manager.process_completions_at(now);

        assert_eq!(manager.get_tile(&id(2, 1, 1)).unwrap().state, TileState::Errored);
        assert_eq!(
            manager.drain_events(),
            vec![TileEvent::Error {
                tile_id: id(2, 2, 1),
                error: LoadError::Failed("HTTP 500".into()),
            }]
        );
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut manager = manager();
        let now = Instant::now();
        manager.update_with_ideal(&[id(3, 1, 1)], 3, now);
        let stale = manager.source_mut().requests.remove(0);

        manager.reload();
        stale.complete(Err(LoadError::Failed("late".into())));
        manager.process_completions_at(now);
        assert_eq!(manager.get_tile(&id(3, 1, 1)).unwrap().state, TileState::Loading);

        manager.source_mut().finish_all();
        manager.process_completions_at(now);
        assert_eq!(manager.get_tile(&id(3, 1, 1)).unwrap().state, TileState::Loaded);
    }

    #[test]
    fn test_descendants_complete() {
        let children = id(1, 0, 0).children(22);
        assert!(descendants_complete(&children, 2, 1));
        assert!(!descendants_complete(&children[..3], 2, 1));

        let overscaled = [OverscaledTileId::new(9, 0, 8, 3, 3)];
        assert!(descendants_complete(&overscaled, 9, 8));
    }

    #[test]
    fn test_terrain_adds_parent_and_low_ancestor() {
        let manager = manager();
        let ideal = vec![id(8, 100, 90), id(8, 101, 90)];
        let with_ancestors = manager.add_terrain_ideal_tiles(ideal);
        assert_eq!(
            set(&with_ancestors),
            set(&[id(8, 100, 90), id(8, 101, 90), id(7, 50, 45), id(5, 12, 11)])
        );
        assert_eq!(with_ancestors.len(), 4);
    }

    #[test]
    fn test_loaded_overzoomed_parent_is_kept() {
        let mut manager = TileManager::new(
            ManualSource {
                max_zoom: Some(7),
                ..ManualSource::default()
            },
            TileManagerConfig::default(),
        )
        .unwrap();
        let now = Instant::now();
        let parents = [id(7, 0, 0), id(7, 1, 0)];
        manager.update_with_ideal(&parents, 7, now);
        manager.source_mut().finish_all();
        manager.process_completions_at(now);

        let overzoomed = [
            OverscaledTileId::new(8, 0, 7, 0, 0),
            OverscaledTileId::new(8, 0, 7, 1, 0),
        ];
        manager.update_with_ideal(&overzoomed, 8, now);

        let mut expected = set(&overzoomed);
        expected.extend(parents);
        assert_eq!(resident(&manager), expected);
    }

    #[test]
    fn test_wrap_jump_rekeys_pending_tiles() {
        let mut manager = manager();
        let now = Instant::now();
        manager.handle_wrap_jump(370.0);
        manager.update_with_ideal(&[OverscaledTileId::new(2, 1, 2, 1, 1)], 2, now);

        manager.handle_wrap_jump(10.0);
        let moved = OverscaledTileId::new(2, 0, 2, 1, 1);
        assert_eq!(manager.tile_ids(), vec![moved]);

        manager.source_mut().finish_all();
        manager.process_completions_at(now);
        assert_eq!(manager.get_tile(&moved).unwrap().state, TileState::Loaded);
    }

    #[test]
    fn test_cache_size_follows_viewport() {
        let mut manager = manager();
        let transform = Transform::new(LatLng::default(), 3.0, 512.0, 512.0);
        manager.update_cache_size(&transform);
        assert_eq!(manager.cache_max_size(), 20);

        let mut capped = TileManager::new(
            ManualSource::default(),
            TileManagerConfig {
                max_tile_cache_size: Some(8),
                ..TileManagerConfig::default()
            },
        )
        .unwrap();
        capped.update_cache_size(&transform);
        assert_eq!(capped.cache_max_size(), 8);
    }
}
