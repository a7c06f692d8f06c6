use async_trait::async_trait;
use fxhash::FxHashSet;
use std::sync::Mutex;
use std::time::Duration;

use maplet_tiles::{
    prelude::*,
    tiles::async_source::{AsyncTileSource, TileFetcher},
};

/// Pretends to download tiles; a few never exist
struct SimulatedFetcher {
    latency: Duration,
    stored: Mutex<FxHashSet<TileKey>>,
}

impl SimulatedFetcher {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            stored: Mutex::new(FxHashSet::default()),
        }
    }

    fn stored(&self) -> usize {
        self.stored.lock().map(|stored| stored.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TileFetcher for SimulatedFetcher {
    async fn fetch(&self, tile_id: OverscaledTileId) -> TileLoadResult {
        tokio::time::sleep(self.latency).await;
        let canonical = tile_id.canonical;
        if canonical.z > 4 && (canonical.x + canonical.y) % 97 == 0 {
            return Err(LoadError::NotFound);
        }
        if let Ok(mut stored) = self.stored.lock() {
            stored.insert(tile_id.wrapped().key());
        }
        Ok(())
    }

    fn unload(&self, tile_id: &OverscaledTileId) {
        if let Ok(mut stored) = self.stored.lock() {
            stored.remove(&tile_id.wrapped().key());
        }
    }
}

/// One leg of the flyover
struct Stop {
    name: &'static str,
    center: LatLng,
    zoom: f64,
    pitch: f64,
    bearing: f64,
    projection: ProjectionKind,
}

const STOPS: [Stop; 6] = [
    Stop {
        name: "World",
        center: LatLng { lat: 0.0, lng: 0.0 },
        zoom: 1.0,
        pitch: 0.0,
        bearing: 0.0,
        projection: ProjectionKind::Mercator,
    },
    Stop {
        name: "San Francisco",
        center: LatLng { lat: 37.7749, lng: -122.4194 },
        zoom: 12.0,
        pitch: 0.0,
        bearing: 0.0,
        projection: ProjectionKind::Mercator,
    },
    Stop {
        name: "San Francisco, pitched",
        center: LatLng { lat: 37.7749, lng: -122.4194 },
        zoom: 14.5,
        pitch: 60.0,
        bearing: 30.0,
        projection: ProjectionKind::Mercator,
    },
    Stop {
        name: "Tokyo, across the antimeridian",
        center: LatLng { lat: 35.6762, lng: 139.6503 + 360.0 },
        zoom: 11.0,
        pitch: 45.0,
        bearing: -20.0,
        projection: ProjectionKind::Mercator,
    },
    Stop {
        name: "Pacific globe",
        center: LatLng { lat: 10.0, lng: 179.5 },
        zoom: 2.5,
        pitch: 0.0,
        bearing: 0.0,
        projection: ProjectionKind::Globe,
    },
    Stop {
        name: "Cape Town globe",
        center: LatLng { lat: -33.9249, lng: 18.4241 },
        zoom: 6.0,
        pitch: 40.0,
        bearing: 15.0,
        projection: ProjectionKind::Globe,
    },
];

/// Frames rendered per stop while waiting for tiles
const FRAMES_PER_STOP: usize = 12;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    maplet_tiles::init_logging();

    let source = AsyncTileSource::new(SimulatedFetcher::new(Duration::from_millis(15)))?
        .with_tile_size(512)
        .with_zoom_range(0, 16);
    let mut manager = TileManager::with_profile(source, TileCacheProfile::Balanced)?;
    manager.set_raster_fade_duration(Duration::from_millis(100));

    let mut transform = Transform::new(LatLng::default(), 0.0, 1200.0, 800.0);

    for stop in &STOPS {
        manager.set_cancel_pending_while_zooming(stop.zoom > transform.zoom());

        transform.set_projection(stop.projection);
        transform.set_center(stop.center);
        transform.set_zoom(stop.zoom);
        transform.set_pitch(stop.pitch);
        transform.set_bearing(stop.bearing);

        for _ in 0..FRAMES_PER_STOP {
            manager.update(&transform);
            transform.prepare_next_frame();
            if manager.are_tiles_loaded() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut loaded = 0;
        let mut errors = 0;
        let mut aborted = 0;
        for event in manager.drain_events() {
            match event {
                TileEvent::Loaded(_) => loaded += 1,
                TileEvent::Error { tile_id, error } => {
                    log::warn!("{}: tile {} failed: {}", stop.name, tile_id, error);
                    errors += 1;
                }
                TileEvent::Aborted(_) => aborted += 1,
                TileEvent::DataLoading(_) => {}
            }
        }

        log::info!(
            "{:<32} z{:<5.1} ideal zoom {:>2} | resident {:>3} renderable {:>3} cached {:>3}/{:<3} | loaded {} errors {} aborted {} stored {}",
            stop.name,
            stop.zoom,
            covering_zoom_level(&transform, manager.covering_options()),
            manager.len(),
            manager.get_renderable_ids().len(),
            manager.cache_len(),
            manager.cache_max_size(),
            loaded,
            errors,
            aborted,
            manager.source().fetcher().stored(),
        );
    }

    manager.clear_tiles();
    manager.source_mut().flush().await;
    log::info!(
        "cleared: {} resident, {} cached, {} stored",
        manager.len(),
        manager.cache_len(),
        manager.source().fetcher().stored()
    );

    Ok(())
}
