//! Coverage selection: which tiles, at which zoom, fill the current view.
//!
//! The quadtree is walked depth-first from the root of every world copy.
//! Each cell is culled against the camera frustum (and the globe's horizon
//! plane), then either emitted once it reaches its target zoom or split into
//! its four children. Pitched views give every cell its own target zoom, so
//! distant ground uses coarser tiles.

use nalgebra::Vector4;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use crate::core::{
    config::{CalculateTileZoomFn, CoveringTilesOptions},
    constants::{
        DEFAULT_PITCH_TILE_LOADING_BEHAVIOR, MAX_OVERSCALE_DELTA, MAX_TILE_ZOOM,
        MAX_VALID_LATITUDE, MAX_WRAP, MIN_WRAP, NUM_WORLD_COPIES,
    },
    tile_id::{CanonicalTileId, OverscaledTileId},
    transform::Transform,
};
use crate::spatial::{BoundingVolume, Frustum, IntersectionResult};

/// Uniform zoom at which tiles of `options.tile_size()` match the screen
/// resolution, rounded or floored per the source and never below zero
pub fn covering_zoom_level(transform: &Transform, options: &CoveringTilesOptions) -> u8 {
    let zoom = transform.zoom() + scale_zoom(transform, options);
    let zoom = if options.round_zoom() {
        zoom.round()
    } else {
        zoom.floor()
    };
    zoom.clamp(0.0, f64::from(MAX_TILE_ZOOM)) as u8
}

fn scale_zoom(transform: &Transform, options: &CoveringTilesOptions) -> f64 {
    (f64::from(transform.tile_size()) / f64::from(options.tile_size())).log2()
}

/// Midpoint-rule integral of `cos(x)^p` over `[x1, x2]`
fn integral_of_cos_x_by_p(p: f64, x1: f64, x2: f64) -> f64 {
    const NUM_POINTS: u32 = 10;
    let dx = (x2 - x1) / f64::from(NUM_POINTS);
    (0..NUM_POINTS)
        .map(|i| {
            let x = x1 + (f64::from(i) + 0.5) * dx;
            dx * x.cos().powf(p)
        })
        .sum()
}

/// Builds a tunable pitch-aware per-tile zoom policy.
///
/// `max_zoom_levels_on_screen` bounds how many distinct zoom levels are
/// visible with the horizon at the top of the screen.
/// `tile_count_max_min_ratio` bounds how many more tiles a pitched view
/// loads compared to looking straight down.
pub fn create_calculate_tile_zoom_function(
    max_zoom_levels_on_screen: f64,
    tile_count_max_min_ratio: f64,
) -> CalculateTileZoomFn {
    Arc::new(
        move |requested_center_zoom: f64,
              distance_to_tile_2d: f64,
              distance_to_tile_z: f64,
              distance_to_center_3d: f64,
              camera_vertical_fov: f64| {
            let half_fov = (camera_vertical_fov / 2.0).to_radians();

            // Exponent chosen so that the worst case (horizon at the top of
            // the screen) shows exactly `max_zoom_levels_on_screen` levels.
            let pitch_tile_loading_behavior = 2.0
                * ((max_zoom_levels_on_screen - 1.0)
                    / ((MAX_VALID_LATITUDE - camera_vertical_fov).to_radians().cos()
                        / MAX_VALID_LATITUDE.to_radians().cos())
                    .log2()
                    - 1.0);

            let center_pitch = (distance_to_tile_z / distance_to_center_3d).acos();
            let exponent = pitch_tile_loading_behavior - 1.0;
            let tile_count_pitch0 = 2.0 * integral_of_cos_x_by_p(exponent, 0.0, half_fov);
            let highest_pitch = FRAC_PI_2.min(center_pitch + half_fov);
            let lowest_pitch = highest_pitch.min(center_pitch - half_fov);
            let tile_count = integral_of_cos_x_by_p(exponent, lowest_pitch, highest_pitch);

            let zoom = tile_zoom_at_angle(
                pitch_tile_loading_behavior,
                requested_center_zoom,
                distance_to_tile_2d,
                distance_to_tile_z,
                distance_to_center_3d,
                camera_vertical_fov,
            );
            zoom - (tile_count / tile_count_pitch0 / tile_count_max_min_ratio)
                .max(1.0)
                .log2()
                / 2.0
        },
    )
}

/// Distance and viewing-angle terms of the per-tile zoom
fn tile_zoom_at_angle(
    pitch_tile_loading_behavior: f64,
    requested_center_zoom: f64,
    distance_to_tile_2d: f64,
    distance_to_tile_z: f64,
    distance_to_center_3d: f64,
    camera_vertical_fov: f64,
) -> f64 {
    let half_fov = (camera_vertical_fov / 2.0).to_radians();
    let this_tile_pitch = (distance_to_tile_2d / distance_to_tile_z).atan();
    let distance_to_tile_3d = distance_to_tile_2d.hypot(distance_to_tile_z);

    // A tile slightly farther than the center keeps the center zoom, hence
    // the cos(fov / 2) scaling of the distance ratio.
    let zoom = requested_center_zoom
        + (distance_to_center_3d / distance_to_tile_3d / half_fov.cos().max(0.5)).log2();
    zoom + pitch_tile_loading_behavior * this_tile_pitch.cos().log2() / 2.0
}

/// Per-tile zoom used when the options carry no zoom function
fn default_tile_zoom(
    requested_center_zoom: f64,
    distance_to_tile_2d: f64,
    distance_to_tile_z: f64,
    distance_to_center_3d: f64,
    camera_vertical_fov: f64,
) -> f64 {
    tile_zoom_at_angle(
        DEFAULT_PITCH_TILE_LOADING_BEHAVIOR,
        requested_center_zoom,
        distance_to_tile_2d,
        distance_to_tile_z,
        distance_to_center_3d,
        camera_vertical_fov,
    )
}

/// Culls a volume against the frustum and, when present, the horizon plane.
/// Only a volume fully inside both counts as fully visible.
pub fn is_tile_visible(
    frustum: &Frustum,
    plane: Option<&Vector4<f64>>,
    volume: &BoundingVolume,
) -> IntersectionResult {
    let frustum_test = volume.intersects_frustum(frustum);
    let Some(plane) = plane else {
        return frustum_test;
    };
    if frustum_test == IntersectionResult::None {
        return IntersectionResult::None;
    }

    match (frustum_test, volume.intersects_plane(plane)) {
        (_, IntersectionResult::None) => IntersectionResult::None,
        (IntersectionResult::Full, IntersectionResult::Full) => IntersectionResult::Full,
        _ => IntersectionResult::Partial,
    }
}

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    canonical: CanonicalTileId,
    wrap: i32,
    fully_visible: bool,
}

impl StackEntry {
    fn root(wrap: i32) -> Self {
        Self {
            canonical: CanonicalTileId { z: 0, x: 0, y: 0 },
            wrap,
            fully_visible: false,
        }
    }
}

/// Ideal tiles for the view, nearest to the view center first.
///
/// Returns an empty list when the transform has no usable frustum (for
/// example a zero-sized viewport).
pub fn compute_coverage(transform: &Transform, options: &CoveringTilesOptions) -> Vec<OverscaledTileId> {
    let Some(frustum) = transform.camera_frustum() else {
        return Vec::new();
    };
    let plane = transform.clipping_plane();
    let provider = transform.details_provider();

    let desired_z = covering_zoom_level(transform, options);
    let min_zoom = options.min_zoom();
    let max_zoom = options
        .max_zoom()
        .unwrap_or_else(|| transform.max_zoom().floor().clamp(0.0, f64::from(MAX_TILE_ZOOM)) as u8);
    let nominal_z = desired_z.min(max_zoom);

    let center_coord = transform.center_coord();
    let camera_coord = transform.camera_coord();
    let num_tiles = 2f64.powi(i32::from(nominal_z));
    let center_point = [num_tiles * center_coord.x, num_tiles * center_coord.y];

    let distance_to_center_2d = (center_coord.x - camera_coord.x).hypot(center_coord.y - camera_coord.y);
    let distance_z = (center_coord.z - camera_coord.z).abs();
    let distance_to_center_3d = distance_to_center_2d.hypot(distance_z);
    let requested_center_zoom = transform.zoom() + scale_zoom(transform, options);
    let allow_variable_zoom = provider.allow_variable_zoom(transform, options);

    let mut stack = Vec::new();
    if options.render_world_copies() && provider.allow_world_copies() {
        for i in 1..=NUM_WORLD_COPIES {
            stack.push(StackEntry::root(-i));
            stack.push(StackEntry::root(i));
        }
    }
    stack.push(StackEntry::root(0));

    let mut result: Vec<(OverscaledTileId, f64)> = Vec::new();
    while let Some(entry) = stack.pop() {
        let canonical = entry.canonical;
        let volume =
            provider.tile_bounding_volume(&canonical, entry.wrap, transform.elevation(), options);

        let mut fully_visible = entry.fully_visible;
        if !fully_visible {
            match is_tile_visible(frustum, plane, &volume) {
                IntersectionResult::None => continue,
                IntersectionResult::Full => fully_visible = true,
                IntersectionResult::Partial => {}
            }
        }

        let distance_to_tile_2d =
            provider.distance_to_tile_2d(camera_coord.x, camera_coord.y, &canonical, &volume);

        let mut this_tile_desired_z = f64::from(desired_z);
        if allow_variable_zoom {
            let zoom_fn = options.calculate_tile_zoom();
            let args = (
                requested_center_zoom,
                distance_to_tile_2d,
                distance_z,
                distance_to_center_3d,
                transform.fov(),
            );
            this_tile_desired_z = match zoom_fn {
                Some(zoom_fn) => zoom_fn(args.0, args.1, args.2, args.3, args.4),
                None => default_tile_zoom(args.0, args.1, args.2, args.3, args.4),
            };
        }
        this_tile_desired_z = if options.round_zoom() {
            this_tile_desired_z.round()
        } else {
            this_tile_desired_z.floor()
        };
        // NaN from a degenerate camera collapses to zero here
        let this_tile_desired_z = this_tile_desired_z.clamp(0.0, f64::from(MAX_TILE_ZOOM)) as u8;
        let z = this_tile_desired_z.min(max_zoom);

        let wrap = provider.tile_wrap(&center_coord, &canonical, entry.wrap);

        if canonical.z >= z {
            if canonical.z < min_zoom || !(MIN_WRAP..=MAX_WRAP).contains(&wrap) {
                continue;
            }
            // The tile's own x and y against the center on the nominal grid,
            // whatever the tile's zoom
            let dx = center_point[0] - 0.5 - f64::from(canonical.x);
            let dy = center_point[1] - 0.5 - f64::from(canonical.y);

            let overscaled_z = if canonical.z == max_zoom && options.reparse_overscaled() {
                this_tile_desired_z
                    .max(canonical.z)
                    .min(canonical.z + MAX_OVERSCALE_DELTA)
            } else {
                canonical.z
            };
            result.push((
                OverscaledTileId {
                    overscaled_z,
                    wrap,
                    canonical,
                },
                dx * dx + dy * dy,
            ));
            continue;
        }

        for child in canonical.children() {
            stack.push(StackEntry {
                canonical: child,
                wrap,
                fully_visible,
            });
        }
    }

    // Stable: equal distances keep traversal order
    result.sort_by(|a, b| a.1.total_cmp(&b.1));
    log::trace!(
        "coverage at zoom {:.2}: {} tiles (desired z{}, nominal z{})",
        transform.zoom(),
        result.len(),
        desired_z,
        nominal_z
    );
    result.into_iter().map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{constants::DEFAULT_FOV, geo::LatLng, transform::ProjectionKind};
    use crate::spatial::Aabb;
    use nalgebra::Vector3;

    fn ids(tiles: &[(u8, u32, u32)]) -> Vec<OverscaledTileId> {
        tiles
            .iter()
            .map(|&(z, x, y)| OverscaledTileId::new(z, 0, z, x, y))
            .collect()
    }

    #[test]
    fn test_covering_zoom_level() {
        let mut transform = Transform::new(LatLng::default(), 0.0, 512.0, 512.0);
        let options = CoveringTilesOptions::default();
        let tiles_256 = CoveringTilesOptions::builder().tile_size(256).build().unwrap();
        let rounded_256 = CoveringTilesOptions::builder()
            .tile_size(256)
            .round_zoom(true)
            .build()
            .unwrap();

        assert_eq!(covering_zoom_level(&transform, &options), 0);
        assert_eq!(covering_zoom_level(&transform, &tiles_256), 1);

        transform.set_zoom(2.7);
        assert_eq!(covering_zoom_level(&transform, &options), 2);

        transform.set_zoom(2.4);
        assert_eq!(covering_zoom_level(&transform, &tiles_256), 3);

        transform.set_zoom(11.5);
        assert_eq!(covering_zoom_level(&transform, &rounded_256), 13);
        assert_eq!(covering_zoom_level(&transform, &tiles_256), 12);
    }

    #[test]
    fn test_integral_of_cos() {
        // ∫ cos(x) dx over [0, π/2] is 1
        let value = integral_of_cos_x_by_p(1.0, 0.0, std::f64::consts::FRAC_PI_2);
        assert!((value - 1.0).abs() < 1e-2);
        assert_eq!(integral_of_cos_x_by_p(1.0, 0.3, 0.3), 0.0);
    }

    #[test]
    fn test_default_zoom_keeps_center_zoom_straight_down() {
        // camera straight above a tile under the center
        let z = default_tile_zoom(5.0, 0.0, 0.1, 0.1, DEFAULT_FOV);
        assert!((5.0..5.1).contains(&z));

        // a far away tile seen at a grazing angle gets a coarser zoom
        let far = default_tile_zoom(5.0, 1.0, 0.1, 0.2, DEFAULT_FOV);
        assert!(far < 4.0);
    }

    #[test]
    fn test_lod_parameters_trade_detail_for_tiles() {
        let single_level = create_calculate_tile_zoom_function(1.0, 1.0);
        let more_tiles = create_calculate_tile_zoom_function(1.0, 10.0);
        let more_levels = create_calculate_tile_zoom_function(10.0, 1.0);

        let straight_down = single_level(5.0, 0.0, 0.1, 0.1, DEFAULT_FOV);
        assert!((straight_down - default_tile_zoom(5.0, 0.0, 0.1, 0.1, DEFAULT_FOV)).abs() < 1e-6);

        // center seen at 60°, tile a little beyond it
        let pitched = single_level(5.0, 0.3, 0.1, 0.2, DEFAULT_FOV);
        assert!((pitched - 4.0).abs() < 0.01);
        assert!(more_tiles(5.0, 0.3, 0.1, 0.2, DEFAULT_FOV) > 5.5);
        assert!(more_levels(5.0, 0.3, 0.1, 0.2, DEFAULT_FOV) < 1.1);
    }

    #[test]
    fn test_zoom_0() {
        let transform = Transform::new(LatLng::default(), 0.0, 128.0, 128.0);
        let tiles = compute_coverage(&transform, &CoveringTilesOptions::default());
        assert_eq!(tiles, ids(&[(0, 0, 0)]));
    }

    #[test]
    fn test_zoom_3_slightly_off_center() {
        let transform = Transform::new(LatLng::new(0.01, -0.02), 3.0, 128.0, 128.0);
        let tiles = compute_coverage(&transform, &CoveringTilesOptions::default());
        assert_eq!(tiles, ids(&[(3, 3, 3), (3, 3, 4), (3, 4, 3), (3, 4, 4)]));
    }

    #[test]
    fn test_empty_viewport_covers_nothing() {
        let transform = Transform::new(LatLng::default(), 3.0, 0.0, 0.0);
        assert!(compute_coverage(&transform, &CoveringTilesOptions::default()).is_empty());
    }

    #[test]
    fn test_visibility_needs_both_tests() {
        let points = [
            [-1.0, 1.0, -1.0],
            [1.0, 1.0, -1.0],
            [1.0, -1.0, -1.0],
            [-1.0, -1.0, -1.0],
            [-1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, -1.0, 1.0],
            [-1.0, -1.0, 1.0],
        ]
        .map(|c| Vector3::new(c[0], c[1], c[2]));
        let frustum = Frustum::from_points(points).unwrap();
        let inner: BoundingVolume =
            Aabb::new(Vector3::new(-0.5, -0.5, -0.5), Vector3::new(0.5, 0.5, 0.5)).into();

        assert_eq!(is_tile_visible(&frustum, None, &inner), IntersectionResult::Full);

        let cutting = Vector4::new(1.0, 0.0, 0.0, 0.0);
        assert_eq!(
            is_tile_visible(&frustum, Some(&cutting), &inner),
            IntersectionResult::Partial
        );

        let hiding = Vector4::new(1.0, 0.0, 0.0, -0.9);
        assert_eq!(
            is_tile_visible(&frustum, Some(&hiding), &inner),
            IntersectionResult::None
        );
    }

    #[test]
    fn test_globe_ignores_world_copies() {
        let transform =
            Transform::new(LatLng::default(), 1.0, 512.0, 512.0).with_projection(ProjectionKind::Globe);
        let tiles = compute_coverage(&transform, &CoveringTilesOptions::default());
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|id| id.wrap == 0));
    }
}
