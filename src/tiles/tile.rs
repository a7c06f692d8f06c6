use instant::Instant;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::tile_id::OverscaledTileId;

/// Load state of a resident tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileState {
    /// Requested, no data yet
    Loading,
    Loaded,
    /// Being fetched again while the previous data keeps rendering
    Reloading,
    Errored,
}

/// A tile owned by the [`TileManager`](crate::tiles::manager::TileManager)
#[derive(Debug, Clone)]
pub struct Tile {
    pub tile_id: OverscaledTileId,
    pub state: TileState,
    /// Stamp of the most recent load request; completions carrying an older
    /// stamp are stale
    pub request_id: u64,
    /// How many times the tile was handed out by the manager
    pub uses: u32,
    pub time_added: Instant,
    /// `None` until a fade-in has been scheduled
    pub fade_end_time: Option<Instant>,
    pub aborted: bool,
}

impl Tile {
    pub fn new(tile_id: OverscaledTileId, now: Instant) -> Self {
        Self {
            tile_id,
            state: TileState::Loading,
            request_id: 0,
            uses: 0,
            time_added: now,
            fade_end_time: None,
            aborted: false,
        }
    }

    /// Whether there is data to draw, old data included while reloading
    pub fn has_data(&self) -> bool {
        matches!(self.state, TileState::Loaded | TileState::Reloading)
    }

    /// Whether at least one load attempt has finished
    pub fn was_requested(&self) -> bool {
        matches!(
            self.state,
            TileState::Errored | TileState::Loaded | TileState::Reloading
        )
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, TileState::Loading | TileState::Reloading)
    }

    /// Schedules the fade-in relative to when the data arrived. A fade end
    /// already further out is kept.
    pub fn register_fade_duration(&mut self, duration: Duration) {
        let fade_end_time = self.time_added + duration;
        if self.fade_end_time.is_some_and(|current| fade_end_time < current) {
            return;
        }
        self.fade_end_time = Some(fade_end_time);
    }

    /// True while the fade-in is pending or running at `now`
    pub fn is_fading(&self, now: Instant) -> bool {
        self.fade_end_time.map_or(true, |end| end > now)
    }

    pub(crate) fn reset_fade(&mut self) {
        self.fade_end_time = None;
    }
}
