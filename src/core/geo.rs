use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::{EARTH_CIRCUMFERENCE, MAX_VALID_LATITUDE};

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the square Mercator world
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_VALID_LATITUDE, MAX_VALID_LATITUDE)
    }

    /// Returns a copy with the longitude wrapped into [-180, 180]
    pub fn wrap(&self) -> Self {
        Self::new(self.lat, Self::wrap_lng(self.lng))
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Viewport size or screen position in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Position in normalized Web Mercator space.
///
/// `x` grows east and `y` grows south, both spanning `[0, 1]` across one
/// world copy. `z` is an altitude expressed in the same units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MercatorCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MercatorCoordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Projects a geographic position and an altitude in meters
    pub fn from_lat_lng(lat_lng: &LatLng, altitude: f64) -> Self {
        Self::new(
            mercator_x_from_lng(lat_lng.lng),
            mercator_y_from_lat(lat_lng.lat),
            mercator_z_from_altitude(altitude, lat_lng.lat),
        )
    }

    pub fn to_lat_lng(&self) -> LatLng {
        LatLng::new(lat_from_mercator_y(self.y), lng_from_mercator_x(self.x))
    }

    /// Horizontal part of the coordinate
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

pub fn mercator_x_from_lng(lng: f64) -> f64 {
    (180.0 + lng) / 360.0
}

pub fn mercator_y_from_lat(lat: f64) -> f64 {
    let lat = LatLng::clamp_lat(lat);
    (180.0 - (180.0 / PI) * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln()) / 360.0
}

pub fn lng_from_mercator_x(x: f64) -> f64 {
    x * 360.0 - 180.0
}

pub fn lat_from_mercator_y(y: f64) -> f64 {
    let y2 = 180.0 - y * 360.0;
    (360.0 / PI) * (y2 * PI / 180.0).exp().atan() - 90.0
}

/// Meters to Mercator units at the given latitude
pub fn mercator_z_from_altitude(altitude: f64, lat: f64) -> f64 {
    altitude / circumference_at_latitude(lat)
}

/// Length of the parallel at `lat`, in meters
pub fn circumference_at_latitude(lat: f64) -> f64 {
    EARTH_CIRCUMFERENCE * lat.to_radians().cos()
}
