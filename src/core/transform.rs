//! Camera state of a map view.
//!
//! A [`Transform`] keeps the inputs (center, zoom, pitch, bearing, field of
//! view, viewport size, ground elevation) and the derived camera frustum.
//! Matrices are rebuilt whenever an input changes, so the coverage selector
//! only ever reads them.

use nalgebra::{Matrix4, Rotation3, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::core::{
    constants::{DEFAULT_FOV, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, MAX_PITCH, TILE_SIZE},
    geo::{
        circumference_at_latitude, mercator_x_from_lng, mercator_y_from_lat, LatLng,
        MercatorCoordinate, Point,
    },
};
use crate::projection::{details_provider_for, CoveringTilesDetailsProvider};
use crate::spatial::culling::Frustum;

/// Which surface the map is drawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectionKind {
    #[default]
    Mercator,
    Globe,
}

/// Camera over a planar or spherical map
#[derive(Debug)]
pub struct Transform {
    projection: ProjectionKind,
    center: LatLng,
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    /// Degrees away from looking straight down
    pitch: f64,
    /// Degrees clockwise from north
    bearing: f64,
    /// Vertical field of view in degrees
    fov: f64,
    width: f64,
    height: f64,
    tile_size: u32,
    /// Ground height at the center, in meters
    elevation: f64,
    padding_top: f64,
    frustum: Option<Frustum>,
    clipping_plane: Option<Vector4<f64>>,
    camera: MercatorCoordinate,
    details_provider: Box<dyn CoveringTilesDetailsProvider>,
}

impl Transform {
    /// Create a planar transform with default camera angles
    pub fn new(center: LatLng, zoom: f64, width: f64, height: f64) -> Self {
        let mut transform = Self {
            projection: ProjectionKind::Mercator,
            center,
            zoom: zoom.clamp(DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM),
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            pitch: 0.0,
            bearing: 0.0,
            fov: DEFAULT_FOV,
            width,
            height,
            tile_size: TILE_SIZE,
            elevation: 0.0,
            padding_top: 0.0,
            frustum: None,
            clipping_plane: None,
            camera: MercatorCoordinate::from_lat_lng(&center, 0.0),
            details_provider: details_provider_for(ProjectionKind::Mercator),
        };
        transform.update_matrices();
        transform
    }

    /// Switch projection; the transform gets a fresh details provider
    pub fn with_projection(mut self, projection: ProjectionKind) -> Self {
        self.set_projection(projection);
        self
    }

    pub fn set_projection(&mut self, projection: ProjectionKind) {
        if self.projection != projection {
            self.projection = projection;
            self.details_provider = details_provider_for(projection);
            self.update_matrices();
        }
    }

    pub fn projection(&self) -> ProjectionKind {
        self.projection
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    pub fn fov(&self) -> f64 {
        self.fov
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn size(&self) -> Point {
        Point::new(self.width, self.height)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    pub fn padding_top(&self) -> f64 {
        self.padding_top
    }

    pub fn set_center(&mut self, center: LatLng) {
        self.center = LatLng::new(LatLng::clamp_lat(center.lat), center.lng);
        self.update_matrices();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        self.update_matrices();
    }

    /// Set the allowed zoom range, clamping the current zoom into it
    pub fn set_zoom_bounds(&mut self, min_zoom: f64, max_zoom: f64) {
        self.min_zoom = min_zoom.min(max_zoom);
        self.max_zoom = max_zoom.max(min_zoom);
        self.set_zoom(self.zoom);
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.pitch = pitch.clamp(0.0, MAX_PITCH);
        self.update_matrices();
    }

    pub fn set_bearing(&mut self, bearing: f64) {
        self.bearing = LatLng::wrap_lng(bearing);
        self.update_matrices();
    }

    pub fn set_fov(&mut self, fov: f64) {
        self.fov = fov.clamp(0.1, 150.0);
        self.update_matrices();
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.update_matrices();
    }

    pub fn set_elevation(&mut self, elevation: f64) {
        self.elevation = elevation;
        self.update_matrices();
    }

    pub fn set_padding_top(&mut self, padding_top: f64) {
        self.padding_top = padding_top.max(0.0);
        self.update_matrices();
    }

    /// Width of one world copy in pixels
    pub fn world_size(&self) -> f64 {
        f64::from(self.tile_size) * 2f64.powf(self.zoom)
    }

    /// Distance in pixels from the camera to the center of the view
    pub fn camera_to_center_distance(&self) -> f64 {
        0.5 * self.height / (self.fov.to_radians() / 2.0).tan()
    }

    /// Center of the view in normalized Mercator space
    pub fn center_coord(&self) -> MercatorCoordinate {
        MercatorCoordinate::from_lat_lng(&self.center, self.elevation)
    }

    /// Ground point below the camera in normalized Mercator space, kept
    /// within half a world of the center. `z` is the camera height.
    pub fn camera_coord(&self) -> MercatorCoordinate {
        self.camera
    }

    /// View frustum in the space the details provider builds volumes in
    pub fn camera_frustum(&self) -> Option<&Frustum> {
        self.frustum.as_ref()
    }

    /// Horizon plane that hides the far side of the globe
    pub fn clipping_plane(&self) -> Option<&Vector4<f64>> {
        self.clipping_plane.as_ref()
    }

    pub fn details_provider(&self) -> &dyn CoveringTilesDetailsProvider {
        self.details_provider.as_ref()
    }

    /// Call once per rendered frame, after all coverage queries of the frame
    pub fn prepare_next_frame(&mut self) {
        self.details_provider.recalculate_cache();
    }

    fn update_matrices(&mut self) {
        self.camera = self.planar_camera_coord();
        if self.width <= 0.0 || self.height <= 0.0 {
            self.frustum = None;
            self.clipping_plane = None;
            return;
        }
        match self.projection {
            ProjectionKind::Mercator => {
                self.frustum = self.mercator_frustum();
                self.clipping_plane = None;
            }
            ProjectionKind::Globe => {
                let (frustum, plane) = self.globe_frustum();
                self.frustum = frustum;
                self.clipping_plane = plane;
            }
        }
    }

    fn planar_camera_coord(&self) -> MercatorCoordinate {
        let center = self.center_coord();
        let distance = self.camera_to_center_distance() / self.world_size();
        let pitch = self.pitch.to_radians();
        let bearing = self.bearing.to_radians();
        let ground = distance * pitch.sin();
        MercatorCoordinate::new(
            center.x - ground * bearing.sin(),
            center.y + ground * bearing.cos(),
            center.z + distance * pitch.cos(),
        )
    }

    /// Perspective projection with the principal point shifted down by half
    /// the top padding
    fn perspective(&self, near: f64, far: f64) -> Matrix4<f64> {
        let mut projection =
            Matrix4::new_perspective(self.width / self.height, self.fov.to_radians(), near, far);
        projection[(1, 2)] = self.padding_top / self.height;
        projection
    }

    /// Planar frustum: x and y in normalized Mercator units, z in meters so
    /// it lines up with terrain heights
    fn mercator_frustum(&self) -> Option<Frustum> {
        let world_size = self.world_size();
        let distance = self.camera_to_center_distance();
        let pitch = self.pitch.to_radians();
        let fov = self.fov.to_radians();
        let offset_y = self.padding_top / 2.0;
        let pixels_per_meter = world_size / circumference_at_latitude(self.center.lat);

        // Far plane just past the ground point at the top edge of the screen,
        // or at the horizon cut-off when that comes first
        let sea_level = distance + self.elevation * pixels_per_meter / pitch.cos();
        let lowest = if self.elevation < 0.0 {
            sea_level - self.elevation * pixels_per_meter / pitch.cos()
        } else {
            sea_level
        };
        let ground_angle = FRAC_PI_2 + pitch;
        let top_half_surface = |fov_above_center: f64| {
            fov_above_center.sin() * lowest
                / (PI - ground_angle - fov_above_center).clamp(0.01, PI - 0.01).sin()
        };
        let horizon = (FRAC_PI_2 - pitch).tan() * distance * HORIZON_FACTOR;
        let horizon_fov = 2.0 * (horizon / distance).atan() * (0.5 + offset_y / (2.0 * horizon));
        let top = top_half_surface(fov * (0.5 + offset_y / self.height))
            .min(top_half_surface(horizon_fov));
        let far = ((FRAC_PI_2 - pitch).cos() * top + lowest) * 1.01;
        let near = self.height / 50.0;

        let center = self.center_coord();
        let view = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, -1.0, 1.0))
            * Matrix4::new_translation(&Vector3::new(0.0, 0.0, -distance))
            * rotation_x(pitch)
            * rotation_z(-self.bearing.to_radians())
            * Matrix4::new_translation(&Vector3::new(
                -center.x * world_size,
                -center.y * world_size,
                0.0,
            ))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0, pixels_per_meter))
            * Matrix4::new_translation(&Vector3::new(0.0, 0.0, -self.elevation));
        let inverse = (self.perspective(near, far) * view).try_inverse()?;
        Frustum::from_inv_projection_matrix(&inverse, world_size)
    }

    /// Globe frustum on the unit sphere, cut back to the horizon, plus the
    /// plane through the horizon circle seen from the camera
    fn globe_frustum(&mut self) -> (Option<Frustum>, Option<Vector4<f64>>) {
        let lat = self.center.lat.to_radians();
        let lng = self.center.lng.to_radians();
        let pitch = self.pitch.to_radians();
        let bearing = self.bearing.to_radians();
        let radius = self.world_size() / (2.0 * PI) / lat.cos();
        let distance = self.camera_to_center_distance();

        let view = Matrix4::new_translation(&Vector3::new(0.0, 0.0, -distance))
            * rotation_x(-pitch)
            * rotation_z(bearing)
            * Matrix4::new_translation(&Vector3::new(0.0, 0.0, -radius))
            * rotation_x(lat)
            * rotation_y(-lng)
            * Matrix4::new_nonuniform_scaling(&Vector3::new(radius, radius, radius));
        let Some(inverse) = (self.perspective(0.5, distance + 2.0 * radius) * view).try_inverse()
        else {
            return (None, None);
        };

        // The camera sits `distance / radius` above the sphere surface
        let height = distance / radius;
        let along = pitch.sin() * height;
        let up = pitch.cos() * height + 1.0;
        let to_camera = along.hypot(up);
        let orientation = Rotation3::from_axis_angle(&Vector3::y_axis(), lng)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), -lat)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), -bearing);
        let normal = orientation * Vector3::new(0.0, -along, up).normalize();
        let plane = Vector4::new(normal.x, normal.y, normal.z, -1.0 / to_camera);

        if let Some(camera) = self.globe_camera_coord(&inverse) {
            self.camera = camera;
        }
        let frustum = Frustum::from_inv_projection_matrix(&inverse, 1.0)
            .and_then(|frustum| frustum.clip_far_corners(&plane));
        (frustum, Some(plane))
    }

    /// Where the ray through the screen point below the camera meets the
    /// sphere. `None` looking straight down or when the ray misses.
    fn globe_camera_coord(&self, inverse: &Matrix4<f64>) -> Option<MercatorCoordinate> {
        let pitch = self.pitch.to_radians();
        if pitch <= 0.0 {
            return None;
        }
        let screen_y = self.height / 2.0
            + self.padding_top / 2.0
            + pitch.tan() * self.camera_to_center_distance();
        let ndc_y = 1.0 - 2.0 * screen_y / self.height;
        let unproject = |z: f64| {
            let p = inverse * Vector4::new(0.0, ndc_y, z, 1.0);
            p.xyz() / p.w
        };
        let origin = unproject(-1.0);
        let direction = (unproject(1.0) - origin).try_normalize(f64::EPSILON)?;

        let b = origin.dot(&direction);
        let discriminant = b * b - (origin.dot(&origin) - 1.0);
        if discriminant < 0.0 {
            return None;
        }
        let hit = origin + direction * (-b - discriminant.sqrt());

        let hit_lat = hit.y.clamp(-1.0, 1.0).asin().to_degrees();
        let hit_lng = hit.x.atan2(hit.z).to_degrees();
        let center = self.center_coord();
        let mut x = mercator_x_from_lng(hit_lng);
        while x - center.x > 0.5 {
            x -= 1.0;
        }
        while center.x - x > 0.5 {
            x += 1.0;
        }
        Some(MercatorCoordinate::new(
            x,
            mercator_y_from_lat(hit_lat),
            self.camera.z,
        ))
    }
}

/// Share of the distance to the geometric horizon the planar far plane
/// reaches
const HORIZON_FACTOR: f64 = 0.85;

fn rotation_x(angle: f64) -> Matrix4<f64> {
    Matrix4::from_axis_angle(&Vector3::x_axis(), angle)
}

fn rotation_y(angle: f64) -> Matrix4<f64> {
    Matrix4::from_axis_angle(&Vector3::y_axis(), angle)
}

fn rotation_z(angle: f64) -> Matrix4<f64> {
    Matrix4::from_axis_angle(&Vector3::z_axis(), angle)
}

impl Clone for Transform {
    /// Clones the camera; the copy starts with an empty volume cache
    fn clone(&self) -> Self {
        Self {
            projection: self.projection,
            center: self.center,
            zoom: self.zoom,
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            pitch: self.pitch,
            bearing: self.bearing,
            fov: self.fov,
            width: self.width,
            height: self.height,
            tile_size: self.tile_size,
            elevation: self.elevation,
            padding_top: self.padding_top,
            frustum: self.frustum.clone(),
            clipping_plane: self.clipping_plane,
            camera: self.camera,
            details_provider: details_provider_for(self.projection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::culling::signed_distance;

    #[test]
    fn test_world_size_and_distance() {
        let transform = Transform::new(LatLng::default(), 1.0, 128.0, 128.0);
        assert_eq!(transform.world_size(), 1024.0);
        // 36.87° vertical fov puts the camera 1.5 viewport heights away
        assert!((transform.camera_to_center_distance() - 192.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_above_center_without_pitch() {
        let transform = Transform::new(LatLng::new(10.0, 20.0), 4.0, 256.0, 256.0);
        let center = transform.center_coord();
        let camera = transform.camera_coord();
        assert!((camera.x - center.x).abs() < 1e-12);
        assert!((camera.y - center.y).abs() < 1e-12);
        assert!(camera.z > center.z);
    }

    #[test]
    fn test_pitch_moves_camera_south_when_facing_north() {
        let mut transform = Transform::new(LatLng::default(), 4.0, 256.0, 256.0);
        transform.set_pitch(60.0);
        let camera = transform.camera_coord();
        assert!(camera.y > transform.center_coord().y);

        transform.set_pitch(120.0);
        assert_eq!(transform.pitch(), MAX_PITCH);
    }

    #[test]
    fn test_mercator_frustum_contains_center() {
        let mut transform = Transform::new(LatLng::new(48.2, 56.9), 5.1, 1024.0, 768.0);
        transform.set_pitch(60.0);
        transform.set_bearing(32.0);

        let frustum = transform.camera_frustum().unwrap();
        let center = transform.center_coord();
        assert!(frustum.contains_point(&Vector3::new(center.x, center.y, 0.0)));
        assert!(!frustum.contains_point(&Vector3::new(center.x + 0.5, center.y, 0.0)));
        assert!(transform.clipping_plane().is_none());
    }

    #[test]
    fn test_globe_clipping_plane_hides_far_side() {
        let transform =
            Transform::new(LatLng::default(), 2.0, 512.0, 512.0).with_projection(ProjectionKind::Globe);
        let plane = transform.clipping_plane().unwrap();

        assert!(signed_distance(plane, &Vector3::new(0.0, 0.0, 1.0)) > 0.0);
        assert!(signed_distance(plane, &Vector3::new(0.0, 0.0, -1.0)) < 0.0);
        let frustum = transform.camera_frustum().unwrap();
        assert!(frustum.contains_point(&Vector3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_globe_frustum_ends_at_horizon() {
        let mut transform = Transform::new(LatLng::new(0.001, -0.002), 8.0, 128.0, 128.0)
            .with_projection(ProjectionKind::Globe);
        transform.set_pitch(80.0);
        let plane = transform.clipping_plane().unwrap();
        let frustum = transform.camera_frustum().unwrap();
        for point in &frustum.points {
            assert!(signed_distance(plane, point) >= -1e-9, "{point:?}");
        }
    }

    #[test]
    fn test_globe_camera_lands_on_sphere_behind_center() {
        let mut transform = Transform::new(LatLng::new(10.0, 179.99), 6.0, 256.0, 256.0)
            .with_projection(ProjectionKind::Globe);
        let center = transform.center_coord();
        assert_eq!(transform.camera_coord().x, center.x);

        transform.set_pitch(60.0);
        let camera = transform.camera_coord();
        assert!(camera.y > center.y);
        assert!((camera.x - center.x).abs() < 1e-3);

        // facing east the camera sits west of the center, still in its world
        transform.set_bearing(90.0);
        let camera = transform.camera_coord();
        assert!(camera.x < center.x);
        assert!(center.x - camera.x < 0.5);
    }

    #[test]
    fn test_padding_shifts_frustum() {
        let mut transform = Transform::new(LatLng::default(), 9.0, 2048.0, 128.0);
        let plain = transform.camera_frustum().cloned();
        transform.set_padding_top(16.0);
        assert_eq!(transform.padding_top(), 16.0);
        assert_ne!(transform.camera_frustum().cloned(), plain);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut transform = Transform::new(LatLng::default(), 3.0, 100.0, 100.0);
        transform.set_zoom_bounds(-2.0, 10.0);
        transform.set_zoom(-1.0);
        assert_eq!(transform.zoom(), -1.0);
        transform.set_zoom(14.0);
        assert_eq!(transform.zoom(), 10.0);
    }

    #[test]
    fn test_clone_gets_fresh_provider() {
        let transform =
            Transform::new(LatLng::default(), 2.0, 512.0, 512.0).with_projection(ProjectionKind::Globe);
        let copy = transform.clone();
        assert_eq!(copy.projection(), ProjectionKind::Globe);
        assert!(!copy.details_provider().allow_world_copies());
        assert_eq!(copy.camera_frustum(), transform.camera_frustum());
    }
}
