//! [`TileSource`] adapter that runs fetches as tokio tasks.
//!
//! Every load request becomes one task on the given runtime; aborting a tile
//! aborts its task. A fetch that finishes after its tile was dropped still
//! reports back, and the manager discards it as stale.

use async_trait::async_trait;
use fxhash::FxHashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::core::{
    constants::{DEFAULT_MAX_ZOOM, TILE_SIZE},
    tile_id::OverscaledTileId,
};
use crate::tiles::{
    loader::{TileLoadResult, TileRequest},
    source::TileSource,
    tile::Tile,
};
use crate::{Result, TileError};

/// Fetches and decodes tile data; where the data ends up is up to the
/// implementation
#[async_trait]
pub trait TileFetcher: Send + Sync + 'static {
    async fn fetch(&self, tile_id: OverscaledTileId) -> TileLoadResult;

    /// Release whatever `fetch` stored for the tile
    fn unload(&self, _tile_id: &OverscaledTileId) {}
}

pub struct AsyncTileSource<F: TileFetcher> {
    fetcher: Arc<F>,
    runtime: Handle,
    tasks: FxHashMap<u64, JoinHandle<()>>,
    tile_size: u32,
    min_zoom: u8,
    max_zoom: u8,
}

impl<F: TileFetcher> AsyncTileSource<F> {
    /// Adapter on the runtime the caller is running in
    pub fn new(fetcher: F) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| TileError::InvalidConfig(format!("no tokio runtime: {e}")))?;
        Ok(Self::with_handle(fetcher, runtime))
    }

    pub fn with_handle(fetcher: F, runtime: Handle) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            runtime,
            tasks: FxHashMap::default(),
            tile_size: TILE_SIZE,
            min_zoom: 0,
            max_zoom: DEFAULT_MAX_ZOOM as u8,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }

    /// Wait for every outstanding fetch to finish or be aborted
    pub async fn flush(&mut self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.drain().map(|(_, task)| task).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                if e.is_panic() {
                    log::warn!("tile fetch task panicked: {}", e);
                }
            }
        }
    }
}

impl<F: TileFetcher> TileSource for AsyncTileSource<F> {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn load_tile(&mut self, request: TileRequest) {
        self.tasks.retain(|_, task| !task.is_finished());

        let fetcher = Arc::clone(&self.fetcher);
        let request_id = request.request_id();
        let task = self.runtime.spawn(async move {
            let result = fetcher.fetch(request.tile_id()).await;
            request.complete(result);
        });
        self.tasks.insert(request_id, task);
    }

    fn abort_tile(&mut self, tile: &Tile) {
        if let Some(task) = self.tasks.remove(&tile.request_id) {
            task.abort();
        }
    }

    fn unload_tile(&mut self, tile: &Tile) {
        self.tasks.remove(&tile.request_id);
        self.fetcher.unload(&tile.tile_id);
    }
}

impl<F: TileFetcher> std::fmt::Debug for AsyncTileSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTileSource")
            .field("tasks", &self.tasks.len())
            .field("tile_size", &self.tile_size)
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::loader::LoadError;

    struct EvenOnly;

    #[async_trait]
    impl TileFetcher for EvenOnly {
        async fn fetch(&self, tile_id: OverscaledTileId) -> TileLoadResult {
            if tile_id.canonical.x % 2 == 0 {
                Ok(())
            } else {
                Err(LoadError::NotFound)
            }
        }
    }

    #[test]
    fn test_new_requires_runtime() {
        assert!(matches!(
            AsyncTileSource::new(EvenOnly),
            Err(TileError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_zoom_range_and_size() {
        let source = AsyncTileSource::new(EvenOnly)
            .unwrap()
            .with_tile_size(256)
            .with_zoom_range(2, 14);
        assert_eq!(source.tile_size(), 256);
        assert_eq!(source.min_zoom(), 2);
        assert_eq!(source.max_zoom(), 14);
        assert_eq!(source.in_flight(), 0);
    }
}
