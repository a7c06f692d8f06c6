//! Per-projection geometry used by the coverage selector.
//!
//! Planar and spherical cameras disagree on what a tile's bounding volume
//! looks like, how far a point is from a tile, and which world copy a tile
//! belongs to. [`CoveringTilesDetailsProvider`] captures those differences so
//! the quadtree descent in [`crate::tiles::covering`] stays projection-agnostic.

pub mod globe;
pub mod mercator;
pub mod volume_cache;

use std::fmt;

use crate::core::{
    config::CoveringTilesOptions,
    geo::MercatorCoordinate,
    tile_id::{CanonicalTileId, OverscaledTileId},
    transform::{ProjectionKind, Transform},
};
use crate::spatial::BoundingVolume;

pub use globe::GlobeDetailsProvider;
pub use mercator::MercatorDetailsProvider;
pub use volume_cache::BoundingVolumeCache;

/// Projection-specific answers needed while descending the tile quadtree
pub trait CoveringTilesDetailsProvider: fmt::Debug {
    /// Distance from a point in normalized Mercator space to the tile,
    /// with a world of size 1
    fn distance_to_tile_2d(
        &self,
        point_x: f64,
        point_y: f64,
        tile_id: &CanonicalTileId,
        volume: &BoundingVolume,
    ) -> f64;

    /// World copy a tile belongs to, given the wrap inherited from its parent
    fn tile_wrap(
        &self,
        center_coord: &MercatorCoordinate,
        tile_id: &CanonicalTileId,
        parent_wrap: i32,
    ) -> i32;

    /// Bounding volume of the tile in the space the camera frustum lives in.
    ///
    /// Without terrain the volume lies at sea level. With terrain it spans
    /// the tile's height range, falling back to sea level through
    /// `elevation` (meters) when the terrain has no data for the tile.
    fn tile_bounding_volume(
        &self,
        tile_id: &CanonicalTileId,
        wrap: i32,
        elevation: f64,
        options: &CoveringTilesOptions,
    ) -> BoundingVolume;

    /// Whether tiles may pick their own zoom level based on camera distance
    fn allow_variable_zoom(&self, transform: &Transform, options: &CoveringTilesOptions) -> bool;

    /// Whether repeated copies of the world are traversed at all
    fn allow_world_copies(&self) -> bool;

    /// Advances any per-frame cache to the next frame
    fn recalculate_cache(&self);
}

/// Supplies terrain height ranges for tiles
pub trait ElevationProvider: Send + Sync {
    /// Minimum and maximum elevation in meters inside the tile, if known
    fn min_max_elevation(&self, tile_id: &OverscaledTileId) -> Option<(f64, f64)>;
}

impl fmt::Debug for dyn ElevationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElevationProvider")
    }
}

/// Height range in meters the volume of a tile spans, or `None` without
/// terrain
fn terrain_height_range(
    tile_id: &CanonicalTileId,
    wrap: i32,
    elevation: f64,
    options: &CoveringTilesOptions,
) -> Option<(f64, f64)> {
    let terrain = options.terrain()?;
    let id = OverscaledTileId {
        overscaled_z: tile_id.z,
        wrap,
        canonical: *tile_id,
    };
    Some(
        terrain
            .min_max_elevation(&id)
            .unwrap_or((elevation.min(0.0), elevation.max(0.0))),
    )
}

/// The provider a transform of the given projection kind owns
pub fn details_provider_for(kind: ProjectionKind) -> Box<dyn CoveringTilesDetailsProvider> {
    match kind {
        ProjectionKind::Mercator => Box::new(MercatorDetailsProvider),
        ProjectionKind::Globe => Box::new(GlobeDetailsProvider::new()),
    }
}
