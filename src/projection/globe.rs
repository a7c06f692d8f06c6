use nalgebra::{Vector3, Vector4};
use std::f64::consts::{FRAC_PI_2, PI};

use super::{terrain_height_range, BoundingVolumeCache, CoveringTilesDetailsProvider};
use crate::core::{
    config::CoveringTilesOptions,
    constants::{EARTH_RADIUS, GLOBE_VARIABLE_ZOOM_THRESHOLD},
    geo::{lat_from_mercator_y, lng_from_mercator_x, MercatorCoordinate},
    tile_id::CanonicalTileId,
    transform::Transform,
};
use crate::spatial::{Aabb, BoundingVolume, ConvexVolume};
use crate::tiles::covering::covering_zoom_level;

/// Slack below the lowest point of a tile's patch
const PLANE_EPSILON: f64 = 1e-9;

/// Distance along one axis from `point` to the span `[tile, tile + tile_size]`
fn distance_to_tile_simple(point: f64, tile: f64, tile_size: f64) -> f64 {
    let delta = point - tile;
    if delta < 0.0 {
        -delta
    } else {
        (delta - tile_size).max(0.0)
    }
}

/// Like [`distance_to_tile_simple`] on both axes, but measuring x around
/// the antimeridian when that is shorter
fn distance_to_tile_wrap_x(
    point_x: f64,
    point_y: f64,
    tile_corner_x: f64,
    tile_corner_y: f64,
    tile_size: f64,
) -> f64 {
    let corner_to_point_x = point_x - tile_corner_x;
    let distance_x = if corner_to_point_x < 0.0 {
        (-corner_to_point_x).min(1.0 + corner_to_point_x - tile_size)
    } else if corner_to_point_x > 1.0 {
        (corner_to_point_x - tile_size).max(0.0).min(1.0 - corner_to_point_x)
    } else {
        0.0
    };
    distance_x.max(distance_to_tile_simple(point_y, tile_corner_y, tile_size))
}

/// Point on the unit sphere for a normalized Mercator position.
///
/// X points at 90°E, Y at the north pole and Z at 0°N 0°E.
pub fn mercator_to_sphere(x: f64, y: f64) -> Vector3<f64> {
    let lng = lng_from_mercator_x(x).to_radians();
    let lat = lat_from_mercator_y(y).to_radians();
    Vector3::new(lng.sin() * lat.cos(), lat.sin(), lng.cos() * lat.cos())
}

/// Details provider for the spherical world.
///
/// Volumes live in unit-sphere space and do not depend on the wrap, so they
/// are memoized across frames in a [`BoundingVolumeCache`].
#[derive(Debug, Default)]
pub struct GlobeDetailsProvider {
    cache: BoundingVolumeCache<BoundingVolume>,
}

impl GlobeDetailsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convex shell around the tile's patch of sphere between the radii
    /// `min_radius` and `max_radius`.
    ///
    /// Below z2 a tile covers a whole hemisphere quarter, so an axis-aligned
    /// box is already tight. Deeper tiles are cut by their meridian planes,
    /// their parallels (turned into planes along the y axis), a plane tangent
    /// above the tile center and a plane just below the lowest point of the
    /// patch.
    fn compute_tile_volume(tile_id: &CanonicalTileId, min_radius: f64, max_radius: f64) -> BoundingVolume {
        let r = max_radius;
        if tile_id.z == 0 {
            return Aabb::new(Vector3::new(-r, -r, -r), Vector3::new(r, r, r)).into();
        }
        if tile_id.z == 1 {
            let (min_x, max_x) = if tile_id.x == 0 { (-r, 0.0) } else { (0.0, r) };
            let (min_y, max_y) = if tile_id.y == 0 { (0.0, r) } else { (-r, 0.0) };
            return Aabb::new(Vector3::new(min_x, min_y, -r), Vector3::new(max_x, max_y, r)).into();
        }

        let num_tiles = f64::from(1u32 << tile_id.z);
        let x0 = f64::from(tile_id.x) / num_tiles;
        let y0 = f64::from(tile_id.y) / num_tiles;
        let x1 = f64::from(tile_id.x + 1) / num_tiles;
        let y1 = f64::from(tile_id.y + 1) / num_tiles;
        let x_mid = (x0 + x1) / 2.0;
        let y_mid = (y0 + y1) / 2.0;
        let north_edge = tile_id.y == 0;
        let south_edge = tile_id.y + 1 == 1 << tile_id.z;

        let corners = [
            mercator_to_sphere(x0, y0),
            mercator_to_sphere(x1, y0),
            mercator_to_sphere(x1, y1),
            mercator_to_sphere(x0, y1),
        ];
        // Tiles on the Mercator edge stand in for the cap up to the pole.
        let pole = if north_edge {
            Some(Vector3::new(0.0, 1.0, 0.0))
        } else if south_edge {
            Some(Vector3::new(0.0, -1.0, 0.0))
        } else {
            None
        };

        let west_lng = x0 * 2.0 * PI - PI;
        let east_lng = x1 * 2.0 * PI - PI;
        let north_lat = if north_edge { FRAC_PI_2 } else { lat_from_mercator_y(y0).to_radians() };
        let south_lat = if south_edge { -FRAC_PI_2 } else { lat_from_mercator_y(y1).to_radians() };

        let normal = mercator_to_sphere(x_mid, y_mid);
        let lowest = corners
            .iter()
            .copied()
            .chain([
                mercator_to_sphere(x_mid, y0),
                mercator_to_sphere(x_mid, y1),
                mercator_to_sphere(x0, y_mid),
                mercator_to_sphere(x1, y_mid),
            ])
            .chain(pole)
            .map(|point| normal.dot(&point))
            .fold(f64::INFINITY, f64::min);

        let mut planes = vec![
            Vector4::new(west_lng.cos(), 0.0, -west_lng.sin(), 0.0),
            Vector4::new(-east_lng.cos(), 0.0, east_lng.sin(), 0.0),
        ];
        if !south_edge {
            let south = south_lat.sin();
            planes.push(Vector4::new(0.0, 1.0, 0.0, -(min_radius * south).min(max_radius * south)));
        }
        if !north_edge {
            let north = north_lat.sin();
            planes.push(Vector4::new(0.0, -1.0, 0.0, (min_radius * north).max(max_radius * north)));
        }
        planes.push(Vector4::new(-normal.x, -normal.y, -normal.z, max_radius));
        planes.push(Vector4::new(
            normal.x,
            normal.y,
            normal.z,
            -(min_radius * lowest - PLANE_EPSILON),
        ));

        match ConvexVolume::from_planes(planes) {
            Some(volume) => volume.into(),
            None => {
                let mut points = corners.to_vec();
                points.extend(pole);
                Aabb::from_points(&points)
                    .unwrap_or_else(|| Aabb::new(Vector3::new(-r, -r, -r), Vector3::new(r, r, r)))
                    .into()
            }
        }
    }
}

impl CoveringTilesDetailsProvider for GlobeDetailsProvider {
    /// Handles the sphere's topology: x wraps at the antimeridian, and past
    /// a pole y mirrors while x shifts by half a world.
    fn distance_to_tile_2d(
        &self,
        point_x: f64,
        point_y: f64,
        tile_id: &CanonicalTileId,
        _volume: &BoundingVolume,
    ) -> f64 {
        let scale = f64::from(1u32 << tile_id.z);
        let tile_size = 1.0 / scale;
        let corner_x = f64::from(tile_id.x) / scale;
        let corner_y = f64::from(tile_id.y) / scale;

        let same_world = distance_to_tile_wrap_x(point_x, point_y, corner_x, corner_y, tile_size);
        let up = distance_to_tile_wrap_x(
            point_x,
            point_y,
            corner_x + 0.5,
            -corner_y - tile_size,
            tile_size,
        );
        let down = distance_to_tile_wrap_x(
            point_x,
            point_y,
            corner_x + 0.5,
            2.0 - corner_y - tile_size,
            tile_size,
        );
        same_world.min(up).min(down)
    }

    fn tile_wrap(
        &self,
        center_coord: &MercatorCoordinate,
        tile_id: &CanonicalTileId,
        _parent_wrap: i32,
    ) -> i32 {
        let scale = f64::from(1u32 << tile_id.z);
        let tile_size = 1.0 / scale;
        let tile_x = f64::from(tile_id.x) / scale;

        let current = distance_to_tile_simple(center_coord.x, tile_x, tile_size);
        let left = distance_to_tile_simple(center_coord.x, tile_x - 1.0, tile_size);
        let right = distance_to_tile_simple(center_coord.x, tile_x + 1.0, tile_size);
        let smallest = current.min(left).min(right);

        if smallest == right {
            1
        } else if smallest == left {
            -1
        } else {
            0
        }
    }

    fn tile_bounding_volume(
        &self,
        tile_id: &CanonicalTileId,
        _wrap: i32,
        elevation: f64,
        options: &CoveringTilesOptions,
    ) -> BoundingVolume {
        self.cache.get_or_compute(tile_id, || {
            let (min_radius, max_radius) = terrain_height_range(tile_id, 0, elevation, options)
                .map_or((1.0, 1.0), |(min, max)| {
                    (1.0 + min / EARTH_RADIUS, 1.0 + max / EARTH_RADIUS)
                });
            Self::compute_tile_volume(tile_id, min_radius, max_radius)
        })
    }

    fn allow_variable_zoom(&self, transform: &Transform, options: &CoveringTilesOptions) -> bool {
        f64::from(covering_zoom_level(transform, options)) > GLOBE_VARIABLE_ZOOM_THRESHOLD
    }

    fn allow_world_copies(&self) -> bool {
        false
    }

    fn recalculate_cache(&self) {
        self.cache.recalculate_cache();
    }
}
