use nalgebra::Vector3;

use super::{terrain_height_range, CoveringTilesDetailsProvider};
use crate::core::{
    config::CoveringTilesOptions,
    constants::MAX_CONSTANT_ZOOM_PITCH,
    geo::MercatorCoordinate,
    tile_id::CanonicalTileId,
    transform::Transform,
};
use crate::spatial::{Aabb, BoundingVolume};

/// Details provider for the flat Web Mercator world.
///
/// Boxes are laid out in normalized Mercator units horizontally, shifted by
/// the world copy, with heights in meters. Boxes are cheap to build and
/// depend on the wrap, so nothing is cached between frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct MercatorDetailsProvider;

impl CoveringTilesDetailsProvider for MercatorDetailsProvider {
    fn distance_to_tile_2d(
        &self,
        point_x: f64,
        point_y: f64,
        _tile_id: &CanonicalTileId,
        volume: &BoundingVolume,
    ) -> f64 {
        let aabb = volume.aabb();
        let point = [point_x, point_y];
        aabb.distance_x(point).hypot(aabb.distance_y(point))
    }

    fn tile_wrap(
        &self,
        _center_coord: &MercatorCoordinate,
        _tile_id: &CanonicalTileId,
        parent_wrap: i32,
    ) -> i32 {
        parent_wrap
    }

    fn tile_bounding_volume(
        &self,
        tile_id: &CanonicalTileId,
        wrap: i32,
        elevation: f64,
        options: &CoveringTilesOptions,
    ) -> BoundingVolume {
        let (min_elevation, max_elevation) =
            terrain_height_range(tile_id, wrap, elevation, options).unwrap_or((0.0, 0.0));

        let num_tiles = f64::from(1u32 << tile_id.z);
        let wrap = f64::from(wrap);
        BoundingVolume::Box(Aabb::new(
            Vector3::new(
                wrap + f64::from(tile_id.x) / num_tiles,
                f64::from(tile_id.y) / num_tiles,
                min_elevation,
            ),
            Vector3::new(
                wrap + f64::from(tile_id.x + 1) / num_tiles,
                f64::from(tile_id.y + 1) / num_tiles,
                max_elevation,
            ),
        ))
    }

    fn allow_variable_zoom(&self, transform: &Transform, options: &CoveringTilesOptions) -> bool {
        let max_constant_zoom_pitch =
            (78.5 - transform.fov() / 2.0).clamp(0.0, MAX_CONSTANT_ZOOM_PITCH);
        options.terrain().is_some() || transform.pitch() > max_constant_zoom_pitch
    }

    fn allow_world_copies(&self) -> bool {
        true
    }

    fn recalculate_cache(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{geo::LatLng, tile_id::OverscaledTileId};
    use crate::projection::ElevationProvider;
    use std::sync::Arc;

    struct Hills;

    impl ElevationProvider for Hills {
        fn min_max_elevation(&self, _tile_id: &OverscaledTileId) -> Option<(f64, f64)> {
            Some((100.0, 2500.0))
        }
    }

    /// Terrain that has no height data loaded yet
    struct Unloaded;

    impl ElevationProvider for Unloaded {
        fn min_max_elevation(&self, _tile_id: &OverscaledTileId) -> Option<(f64, f64)> {
            None
        }
    }

    #[test]
    fn test_bounding_volume_follows_wrap() {
        let options = CoveringTilesOptions::default();
        let volume = MercatorDetailsProvider.tile_bounding_volume(
            &CanonicalTileId::new(1, 1, 0),
            -1,
            0.0,
            &options,
        );
        assert_eq!(volume.aabb().min, Vector3::new(-0.5, 0.0, 0.0));
        assert_eq!(volume.aabb().max, Vector3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn test_volume_stays_at_sea_level_without_terrain() {
        let volume = MercatorDetailsProvider.tile_bounding_volume(
            &CanonicalTileId::new(2, 1, 1),
            0,
            1200.0,
            &CoveringTilesOptions::default(),
        );
        assert_eq!(volume.aabb().min.z, 0.0);
        assert_eq!(volume.aabb().max.z, 0.0);
    }

    #[test]
    fn test_terrain_extends_volume() {
        let options = CoveringTilesOptions::builder()
            .terrain(Arc::new(Hills))
            .build()
            .unwrap();
        let volume = MercatorDetailsProvider.tile_bounding_volume(
            &CanonicalTileId::new(2, 1, 1),
            0,
            0.0,
            &options,
        );
        assert_eq!(volume.aabb().min.z, 100.0);
        assert_eq!(volume.aabb().max.z, 2500.0);

        let unloaded = CoveringTilesOptions::builder()
            .terrain(Arc::new(Unloaded))
            .build()
            .unwrap();
        let volume = MercatorDetailsProvider.tile_bounding_volume(
            &CanonicalTileId::new(2, 1, 1),
            0,
            -40.0,
            &unloaded,
        );
        assert_eq!(volume.aabb().min.z, -40.0);
        assert_eq!(volume.aabb().max.z, 0.0);
    }

    #[test]
    fn test_distance_is_zero_inside_tile() {
        let provider = MercatorDetailsProvider;
        let options = CoveringTilesOptions::default();
        let id = CanonicalTileId::new(1, 0, 0);
        let volume = provider.tile_bounding_volume(&id, 0, 0.0, &options);

        assert_eq!(provider.distance_to_tile_2d(0.25, 0.25, &id, &volume), 0.0);
        assert!((provider.distance_to_tile_2d(0.8, 0.9, &id, &volume) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_variable_zoom_needs_pitch_or_terrain() {
        let provider = MercatorDetailsProvider;
        let options = CoveringTilesOptions::default();
        let mut transform = Transform::new(LatLng::default(), 5.0, 512.0, 512.0);
        assert!(!provider.allow_variable_zoom(&transform, &options));

        // top padding alone keeps a single zoom level
        transform.set_padding_top(16.0);
        assert!(!provider.allow_variable_zoom(&transform, &options));

        transform.set_pitch(61.0);
        assert!(provider.allow_variable_zoom(&transform, &options));

        transform.set_pitch(0.0);
        let with_terrain = CoveringTilesOptions::builder()
            .terrain(Arc::new(Hills))
            .build()
            .unwrap();
        assert!(provider.allow_variable_zoom(&transform, &with_terrain));
    }

    #[test]
    fn test_wrap_is_inherited() {
        let center = MercatorCoordinate::new(0.5, 0.5, 0.0);
        let id = CanonicalTileId::new(3, 7, 2);
        assert_eq!(MercatorDetailsProvider.tile_wrap(&center, &id, -2), -2);
        assert!(MercatorDetailsProvider.allow_world_copies());
    }
}
