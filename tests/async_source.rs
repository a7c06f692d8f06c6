#![cfg(feature = "tokio-runtime")]

use async_trait::async_trait;
use std::sync::Mutex;

use maplet_tiles::prelude::*;

/// Tokio-backed source driving a real manager
#[cfg(test)]
mod async_source_tests {
    use super::*;

    /// Even columns load, odd columns do not exist
    struct Checkerboard {
        delay: Duration,
        unloaded: Mutex<Vec<OverscaledTileId>>,
    }

    impl Checkerboard {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                unloaded: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TileFetcher for Checkerboard {
        async fn fetch(&self, tile_id: OverscaledTileId) -> TileLoadResult {
            tokio::time::sleep(self.delay).await;
            if tile_id.canonical.x % 2 == 0 {
                Ok(())
            } else {
                Err(LoadError::NotFound)
            }
        }

        fn unload(&self, tile_id: &OverscaledTileId) {
            self.unloaded.lock().unwrap().push(*tile_id);
        }
    }

    fn id(z: u8, x: u32, y: u32) -> OverscaledTileId {
        OverscaledTileId::new(z, 0, z, x, y)
    }

    #[tokio::test]
    async fn test_fetches_complete_through_manager() {
        let source = AsyncTileSource::new(Checkerboard::new(Duration::from_millis(5))).unwrap();
        let mut manager = TileManager::new(source, TileManagerConfig::default()).unwrap();
        let ideal = [id(2, 0, 1), id(2, 1, 1)];

        manager.update_with_ideal(&ideal, 2, Instant::now());
        assert_eq!(manager.pending_len(), 2);

        manager.source_mut().flush().await;
        manager.process_completions();

        assert!(manager.are_tiles_loaded());
        assert_eq!(manager.pending_len(), 0);
        assert_eq!(manager.get_tile(&id(2, 0, 1)).unwrap().state, TileState::Loaded);
        assert_eq!(manager.get_tile(&id(2, 1, 1)).unwrap().state, TileState::Errored);
        assert_eq!(manager.get_renderable_ids(), vec![id(2, 0, 1)]);
        assert_eq!(manager.source().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_removed_tile_aborts_its_fetch() {
        let source = AsyncTileSource::new(Checkerboard::new(Duration::from_secs(30))).unwrap();
        let mut manager = TileManager::new(source, TileManagerConfig::default()).unwrap();

        manager.update_with_ideal(&[id(4, 2, 2)], 4, Instant::now());
        assert_eq!(manager.source().in_flight(), 1);

        manager.clear_tiles();
        manager.source_mut().flush().await;
        manager.process_completions();

        assert!(manager.is_empty());
        assert_eq!(manager.source().in_flight(), 0);
        assert_eq!(*manager.source().fetcher().unloaded.lock().unwrap(), vec![id(4, 2, 2)]);
        assert_eq!(
            manager.drain_events(),
            vec![TileEvent::DataLoading(id(4, 2, 2)), TileEvent::Aborted(id(4, 2, 2))]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_view_settles_on_multi_thread_runtime() {
        let source = AsyncTileSource::new(Checkerboard::new(Duration::from_millis(2)))
            .unwrap()
            .with_zoom_range(0, 14);
        let mut manager = TileManager::new(source, TileManagerConfig::default()).unwrap();
        let transform = Transform::new(LatLng::new(48.8566, 2.3522), 5.5, 640.0, 480.0);

        manager.update(&transform);
        assert!(!manager.is_empty());
        manager.source_mut().flush().await;
        manager.process_completions();

        assert!(manager.are_tiles_loaded());
        let ideal = compute_coverage(&transform, manager.covering_options());
        for tile_id in ideal {
            assert!(manager.get_tile(&tile_id).is_some(), "{tile_id} missing");
        }
    }
}
