pub mod cache;
pub mod covering;
pub mod loader;
pub mod manager;
pub mod source;
pub mod tile;

#[cfg(feature = "tokio-runtime")]
pub mod async_source;

// Re-exports for convenience
pub use covering::{compute_coverage, covering_zoom_level, create_calculate_tile_zoom_function};
pub use manager::{TileEvent, TileManager};
pub use source::TileSource;
