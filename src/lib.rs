//! # maplet-tiles
//!
//! Tile coverage and retention for map views.
//!
//! The crate answers two questions every frame:
//!
//! * which tiles cover the screen at the right level of detail, for planar
//!   (Web Mercator) and spherical (globe) cameras, including pitched views
//!   where distant tiles use coarser zooms ([`tiles::covering`]);
//! * which tiles must stay resident while loads are in flight so the view
//!   never shows holes, which go back to the LRU cache, and which get
//!   aborted or unloaded ([`tiles::manager`]).
//!
//! Fetching and decoding tile data is left to a [`TileSource`].

pub mod core;
pub mod prelude;
pub mod projection;
pub mod spatial;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{CoveringTilesOptions, TileCacheProfile, TileManagerConfig},
    geo::{LatLng, MercatorCoordinate, Point},
    tile_id::{CanonicalTileId, OverscaledTileId, TileKey},
    transform::{ProjectionKind, Transform},
};

pub use projection::{CoveringTilesDetailsProvider, ElevationProvider};

pub use spatial::{Aabb, BoundingVolume, ConvexVolume, Frustum, IntersectionResult};

pub use tiles::{
    covering::{compute_coverage, covering_zoom_level},
    loader::{LoadError, TileRequest},
    manager::{TileEvent, TileManager},
    source::TileSource,
    tile::{Tile, TileState},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TileError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Invalid zoom range: min zoom {min} is greater than max zoom {max}")]
    InvalidZoomRange { min: u8, max: u8 },

    #[error("Invalid tile size: {0} (must be a non-zero power of two)")]
    InvalidTileSize(u32),

    #[error("Zoom level out of range: {0}")]
    ZoomOutOfRange(u8),

    #[error("Invalid tile id: {0}")]
    InvalidTileId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error type alias for convenience
pub type Error = TileError;

/// Installs `env_logger` so the crate's `log` output becomes visible.
///
/// Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
