//! Core constants shared by the coverage selector and the retention engine.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 512;

/// Deepest canonical zoom a tile id may carry.
pub const MAX_TILE_ZOOM: u8 = 25;

/// How far above its canonical zoom a tile may be overscaled.
pub const MAX_OVERSCALE_DELTA: u8 = 15;

/// World-copy indices that fit into a packed [`TileKey`](crate::core::tile_id::TileKey).
pub const MIN_WRAP: i32 = -16;
pub const MAX_WRAP: i32 = 15;

/// Number of repeated world copies seeded on each side of the primary world.
pub const NUM_WORLD_COPIES: i32 = 3;

/// Latitude limit of the square Web Mercator world.
pub const MAX_VALID_LATITUDE: f64 = 85.051129;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_008.8;

/// Earth circumference at the equator in meters.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * std::f64::consts::PI * EARTH_RADIUS;

/// Camera pitch is clamped to this many degrees.
pub const MAX_PITCH: f64 = 85.0;

/// Default vertical field of view in degrees.
pub const DEFAULT_FOV: f64 = 36.869_897_645_844_02;

/// Default zoom bounds of a transform.
pub const DEFAULT_MIN_ZOOM: f64 = 0.0;
pub const DEFAULT_MAX_ZOOM: f64 = 22.0;

/// How fast the default per-tile zoom drops with the angle a tile is seen at.
pub const DEFAULT_PITCH_TILE_LOADING_BEHAVIOR: f64 = 1.0;

/// Pitch (degrees) below which planar views keep a single zoom level.
pub const MAX_CONSTANT_ZOOM_PITCH: f64 = 60.0;

/// Globe views below this covering zoom keep a single zoom level.
pub const GLOBE_VARIABLE_ZOOM_THRESHOLD: f64 = 4.0;

/// How many zoom levels below the ideal zoom a substitute parent may be.
pub const MAX_UNDERZOOMING: u8 = 10;

/// How many zoom levels above the ideal zoom a substitute child may be.
pub const MAX_OVERZOOMING: u8 = 3;

/// Zoom levels worth of viewport-sized tile sets kept in the LRU cache.
pub const MAX_TILE_CACHE_ZOOM_LEVELS: usize = 5;

/// Default raster cross-fade in milliseconds.
pub const DEFAULT_RASTER_FADE_DURATION_MS: u64 = 300;
