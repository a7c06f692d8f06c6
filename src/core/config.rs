//! Configuration for coverage selection and tile retention
//!
//! [`CoveringTilesOptions`] describes a tile source's geometry and is
//! validated when built. [`TileManagerConfig`] tunes the retention engine
//! and can be picked from a [`TileCacheProfile`] preset or customized.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::constants::{
    DEFAULT_RASTER_FADE_DURATION_MS, MAX_TILE_CACHE_ZOOM_LEVELS, MAX_TILE_ZOOM, TILE_SIZE,
};
use crate::projection::ElevationProvider;
use crate::{Result, TileError};

/// Per-tile zoom policy.
///
/// Arguments: requested center zoom, 2-D distance from the camera to the
/// tile, camera height above the center, 3-D distance from the camera to the
/// center (all with a world of size 1) and the vertical field of view in
/// degrees. Returns the fractional zoom the tile should be displayed at.
pub type CalculateTileZoomFn = Arc<dyn Fn(f64, f64, f64, f64, f64) -> f64 + Send + Sync>;

/// How a tile source wants the view covered
#[derive(Clone)]
pub struct CoveringTilesOptions {
    min_zoom: u8,
    max_zoom: Option<u8>,
    tile_size: u32,
    round_zoom: bool,
    reparse_overscaled: bool,
    render_world_copies: bool,
    terrain: Option<Arc<dyn ElevationProvider>>,
    calculate_tile_zoom: Option<CalculateTileZoomFn>,
}

impl CoveringTilesOptions {
    pub fn builder() -> CoveringTilesOptionsBuilder {
        CoveringTilesOptionsBuilder::default()
    }

    /// Builder seeded with a copy of these options
    pub fn to_builder(&self) -> CoveringTilesOptionsBuilder {
        CoveringTilesOptionsBuilder {
            options: self.clone(),
        }
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    /// Deepest zoom tiles are requested at; `None` defers to the transform
    pub fn max_zoom(&self) -> Option<u8> {
        self.max_zoom
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn round_zoom(&self) -> bool {
        self.round_zoom
    }

    pub fn reparse_overscaled(&self) -> bool {
        self.reparse_overscaled
    }

    pub fn render_world_copies(&self) -> bool {
        self.render_world_copies
    }

    pub fn terrain(&self) -> Option<&Arc<dyn ElevationProvider>> {
        self.terrain.as_ref()
    }

    pub fn calculate_tile_zoom(&self) -> Option<&CalculateTileZoomFn> {
        self.calculate_tile_zoom.as_ref()
    }
}

impl Default for CoveringTilesOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: None,
            tile_size: TILE_SIZE,
            round_zoom: false,
            reparse_overscaled: false,
            render_world_copies: true,
            terrain: None,
            calculate_tile_zoom: None,
        }
    }
}

impl fmt::Debug for CoveringTilesOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoveringTilesOptions")
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .field("tile_size", &self.tile_size)
            .field("round_zoom", &self.round_zoom)
            .field("reparse_overscaled", &self.reparse_overscaled)
            .field("render_world_copies", &self.render_world_copies)
            .field("terrain", &self.terrain.is_some())
            .field("calculate_tile_zoom", &self.calculate_tile_zoom.is_some())
            .finish()
    }
}

/// Builder for [`CoveringTilesOptions`]; `build` rejects inconsistent values
#[derive(Debug, Default)]
pub struct CoveringTilesOptionsBuilder {
    options: CoveringTilesOptions,
}

impl CoveringTilesOptionsBuilder {
    pub fn min_zoom(mut self, min_zoom: u8) -> Self {
        self.options.min_zoom = min_zoom;
        self
    }

    pub fn max_zoom(mut self, max_zoom: u8) -> Self {
        self.options.max_zoom = Some(max_zoom);
        self
    }

    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.options.tile_size = tile_size;
        self
    }

    pub fn round_zoom(mut self, round_zoom: bool) -> Self {
        self.options.round_zoom = round_zoom;
        self
    }

    pub fn reparse_overscaled(mut self, reparse_overscaled: bool) -> Self {
        self.options.reparse_overscaled = reparse_overscaled;
        self
    }

    pub fn render_world_copies(mut self, render_world_copies: bool) -> Self {
        self.options.render_world_copies = render_world_copies;
        self
    }

    pub fn terrain(mut self, terrain: Arc<dyn ElevationProvider>) -> Self {
        self.options.terrain = Some(terrain);
        self
    }

    pub fn calculate_tile_zoom<F>(mut self, calculate_tile_zoom: F) -> Self
    where
        F: Fn(f64, f64, f64, f64, f64) -> f64 + Send + Sync + 'static,
    {
        self.options.calculate_tile_zoom = Some(Arc::new(calculate_tile_zoom));
        self
    }

    pub fn build(self) -> Result<CoveringTilesOptions> {
        let options = self.options;
        if options.tile_size == 0 || !options.tile_size.is_power_of_two() {
            return Err(TileError::InvalidTileSize(options.tile_size));
        }
        if options.min_zoom > MAX_TILE_ZOOM {
            return Err(TileError::ZoomOutOfRange(options.min_zoom));
        }
        if let Some(max_zoom) = options.max_zoom {
            if max_zoom > MAX_TILE_ZOOM {
                return Err(TileError::ZoomOutOfRange(max_zoom));
            }
            if options.min_zoom > max_zoom {
                return Err(TileError::InvalidZoomRange {
                    min: options.min_zoom,
                    max: max_zoom,
                });
            }
        }
        Ok(options)
    }
}

/// Preset retention-engine tunings
#[derive(Debug, Clone, PartialEq)]
pub enum TileCacheProfile {
    Balanced,
    LowMemory,
    HighQuality,
    Custom(TileManagerConfig),
}

impl TileCacheProfile {
    pub fn resolve(&self) -> TileManagerConfig {
        match self {
            Self::Balanced => TileManagerConfig::default(),
            Self::LowMemory => TileManagerConfig {
                cache_zoom_levels: 2,
                max_tile_cache_size: Some(64),
                raster_fade_duration_ms: 0,
                cancel_pending_while_zooming: true,
                used_for_terrain: false,
            },
            Self::HighQuality => TileManagerConfig {
                cache_zoom_levels: 8,
                max_tile_cache_size: None,
                raster_fade_duration_ms: DEFAULT_RASTER_FADE_DURATION_MS,
                cancel_pending_while_zooming: false,
                used_for_terrain: false,
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

impl Default for TileCacheProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Tuning knobs for [`TileManager`](crate::tiles::manager::TileManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileManagerConfig {
    /// Viewport-sized tile sets kept in the LRU cache
    pub cache_zoom_levels: usize,
    /// Hard cap on cached tiles, applied after the viewport-based size
    pub max_tile_cache_size: Option<usize>,
    /// Cross-fade length for raster tiles; zero disables fade retention
    pub raster_fade_duration_ms: u64,
    /// Drop still-loading parents while the zoom is increasing
    pub cancel_pending_while_zooming: bool,
    /// Keep each ideal tile's parents resident for terrain sampling
    pub used_for_terrain: bool,
}

impl TileManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_zoom_levels == 0 {
            return Err(TileError::InvalidConfig(
                "cache_zoom_levels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn raster_fade_duration(&self) -> Duration {
        Duration::from_millis(self.raster_fade_duration_ms)
    }

    /// Parses a JSON config, rejecting invalid values
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for TileManagerConfig {
    fn default() -> Self {
        Self {
            cache_zoom_levels: MAX_TILE_CACHE_ZOOM_LEVELS,
            max_tile_cache_size: None,
            raster_fade_duration_ms: 0,
            cancel_pending_while_zooming: false,
            used_for_terrain: false,
        }
    }
}
