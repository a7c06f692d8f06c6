//! Prelude module for common maplet-tiles types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use maplet_tiles::prelude::*;`

pub use crate::core::{
    config::{CoveringTilesOptions, TileCacheProfile, TileManagerConfig},
    geo::{LatLng, MercatorCoordinate, Point},
    tile_id::{CanonicalTileId, OverscaledTileId, TileKey},
    transform::{ProjectionKind, Transform},
};

pub use crate::projection::{CoveringTilesDetailsProvider, ElevationProvider};

pub use crate::tiles::{
    covering::{compute_coverage, covering_zoom_level, create_calculate_tile_zoom_function},
    loader::{LoadError, TileLoadResult, TileRequest},
    manager::{TileEvent, TileManager},
    source::TileSource,
    tile::{Tile, TileState},
};

#[cfg(feature = "tokio-runtime")]
pub use crate::tiles::async_source::{AsyncTileSource, TileFetcher};

pub use crate::{Error as TilesError, Result};

pub use std::{sync::Arc, time::Duration};

pub use instant::Instant;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
