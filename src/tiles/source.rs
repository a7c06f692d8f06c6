use crate::core::{
    config::{CalculateTileZoomFn, CoveringTilesOptions},
    constants::{DEFAULT_MAX_ZOOM, TILE_SIZE},
    tile_id::OverscaledTileId,
};
use crate::tiles::{loader::TileRequest, tile::Tile};
use crate::{Result, TileError};

/// The collaborator that fetches, decodes and frees tile data.
///
/// The manager never waits on a source: `load_tile` starts work and the
/// source reports back through the request whenever it is done.
pub trait TileSource {
    fn tile_size(&self) -> u32 {
        TILE_SIZE
    }

    fn min_zoom(&self) -> u8 {
        0
    }

    /// Deepest zoom the source has data for; deeper views overscale
    fn max_zoom(&self) -> u8 {
        DEFAULT_MAX_ZOOM as u8
    }

    fn round_zoom(&self) -> bool {
        false
    }

    fn reparse_overscaled(&self) -> bool {
        false
    }

    fn render_world_copies(&self) -> bool {
        true
    }

    /// Raster tiles cross-fade and keep their parents around while doing so
    fn is_raster(&self) -> bool {
        true
    }

    fn calculate_tile_zoom(&self) -> Option<CalculateTileZoomFn> {
        None
    }

    /// Lets sparse or bounded sources skip tiles they do not have
    fn has_tile(&self, _tile_id: &OverscaledTileId) -> bool {
        true
    }

    fn load_tile(&mut self, request: TileRequest);

    fn abort_tile(&mut self, _tile: &Tile) {}

    fn unload_tile(&mut self, _tile: &Tile) {}

    /// Coverage options describing this source
    fn covering_options(&self) -> Result<CoveringTilesOptions> {
        let mut builder = CoveringTilesOptions::builder()
            .min_zoom(self.min_zoom())
            .max_zoom(self.max_zoom())
            .tile_size(self.tile_size())
            .round_zoom(self.round_zoom())
            .reparse_overscaled(self.reparse_overscaled())
            .render_world_copies(self.render_world_copies());
        if let Some(calculate_tile_zoom) = self.calculate_tile_zoom() {
            builder = builder.calculate_tile_zoom(move |a, b, c, d, e| calculate_tile_zoom(a, b, c, d, e));
        }
        builder.build()
    }
}

/// Checks a source's zoom range before a manager is built around it
pub(crate) fn validate_source<S: TileSource + ?Sized>(source: &S) -> Result<()> {
    if source.min_zoom() > source.max_zoom() {
        return Err(TileError::InvalidZoomRange {
            min: source.min_zoom(),
            max: source.max_zoom(),
        });
    }
    Ok(())
}
