use nalgebra::{Vector3, Vector4};

use super::culling::{Frustum, IntersectionResult};

/// Axis-aligned bounding box in 3-D
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
    pub center: Vector3<f64>,
}

impl Aabb {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self {
            min,
            max,
            center: (min + max) * 0.5,
        }
    }

    /// Smallest box containing every point, or `None` for an empty slice
    pub fn from_points(points: &[Vector3<f64>]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (min, max) = rest.iter().fold((*first, *first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        });
        Some(Self::new(min, max))
    }

    /// Signed x offset from `point` to the closest point of the box
    pub fn distance_x(&self, point: [f64; 2]) -> f64 {
        point[0].clamp(self.min.x, self.max.x) - point[0]
    }

    /// Signed y offset from `point` to the closest point of the box
    pub fn distance_y(&self, point: [f64; 2]) -> f64 {
        point[1].clamp(self.min.y, self.max.y) - point[1]
    }

    /// Classifies the box against a plane `(nx, ny, nz, d)` whose positive
    /// side is inside
    pub fn intersects_plane(&self, plane: &Vector4<f64>) -> IntersectionResult {
        let mut dist_min = plane.w;
        let mut dist_max = plane.w;
        for i in 0..3 {
            if plane[i] > 0.0 {
                dist_min += plane[i] * self.min[i];
                dist_max += plane[i] * self.max[i];
            } else {
                dist_max += plane[i] * self.min[i];
                dist_min += plane[i] * self.max[i];
            }
        }

        if dist_min >= 0.0 {
            IntersectionResult::Full
        } else if dist_max < 0.0 {
            IntersectionResult::None
        } else {
            IntersectionResult::Partial
        }
    }

    /// Plane tests first, then the frustum's own bounding box to drop boxes
    /// that straddle two planes without touching the frustum
    pub fn intersects_frustum(&self, frustum: &Frustum) -> IntersectionResult {
        let mut fully_inside = true;
        for plane in &frustum.planes {
            match self.intersects_plane(plane) {
                IntersectionResult::None => return IntersectionResult::None,
                IntersectionResult::Partial => fully_inside = false,
                IntersectionResult::Full => {}
            }
        }

        if fully_inside {
            return IntersectionResult::Full;
        }

        if self.intersects_aabb(&frustum.aabb) {
            IntersectionResult::Partial
        } else {
            IntersectionResult::None
        }
    }

    pub fn intersects_aabb(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }
}
