use crossbeam_channel::Sender;

use crate::core::tile_id::OverscaledTileId;

/// Why a tile load did not produce data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The source has no tile at this id; not worth surfacing to users
    #[error("tile not found")]
    NotFound,

    #[error("tile load failed: {0}")]
    Failed(String),

    #[error("tile load aborted")]
    Aborted,
}

/// Outcome a source reports for one request
pub type TileLoadResult = std::result::Result<(), LoadError>;

/// Completion message delivered to the manager's channel
#[derive(Debug, Clone, PartialEq)]
pub struct TileCompletion {
    pub tile_id: OverscaledTileId,
    pub request_id: u64,
    pub result: TileLoadResult,
}

/// A pending load handed to a [`TileSource`](crate::tiles::source::TileSource).
///
/// The source finishes it from any thread with [`TileRequest::complete`].
/// Completing a request whose tile has since been removed or re-requested
/// is harmless; the manager drops it.
#[derive(Debug, Clone)]
pub struct TileRequest {
    tile_id: OverscaledTileId,
    request_id: u64,
    sender: Sender<TileCompletion>,
}

impl TileRequest {
    pub(crate) fn new(tile_id: OverscaledTileId, request_id: u64, sender: Sender<TileCompletion>) -> Self {
        Self {
            tile_id,
            request_id,
            sender,
        }
    }

    pub fn tile_id(&self) -> OverscaledTileId {
        self.tile_id
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Report the outcome. Returns `false` if the manager no longer exists.
    pub fn complete(self, result: TileLoadResult) -> bool {
        let completion = TileCompletion {
            tile_id: self.tile_id,
            request_id: self.request_id,
            result,
        };
        self.sender.send(completion).is_ok()
    }
}
