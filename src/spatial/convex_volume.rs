use nalgebra::{Vector3, Vector4};

use super::aabb::Aabb;
use super::culling::{signed_distance, Frustum, IntersectionResult};

/// Corners may sit this far outside a bounding plane and still count
const CORNER_TOLERANCE: f64 = 1e-9;

/// Convex polyhedron described by its inward-facing planes and corners
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexVolume {
    pub points: Vec<Vector3<f64>>,
    pub planes: Vec<Vector4<f64>>,
    pub aabb: Aabb,
}

impl ConvexVolume {
    /// Intersection of the half-spaces `a·p + d >= 0`.
    ///
    /// Corners are found by solving every triple of planes and keeping the
    /// solutions that lie inside all of them. Returns `None` when the planes
    /// do not enclose a solid (fewer than four corners).
    pub fn from_planes(planes: Vec<Vector4<f64>>) -> Option<Self> {
        let mut points = Vec::new();
        for a in 0..planes.len() {
            for b in a + 1..planes.len() {
                for c in b + 1..planes.len() {
                    let Some(point) = intersect_planes(&planes[a], &planes[b], &planes[c]) else {
                        continue;
                    };
                    if planes
                        .iter()
                        .all(|plane| signed_distance(plane, &point) >= -CORNER_TOLERANCE)
                    {
                        points.push(point);
                    }
                }
            }
        }

        if points.len() < 4 {
            return None;
        }
        let aabb = Aabb::from_points(&points)?;
        Some(Self {
            points,
            planes,
            aabb,
        })
    }

    /// Counts corners on the inner side of `plane`
    pub fn intersects_plane(&self, plane: &Vector4<f64>) -> IntersectionResult {
        let inside = self
            .points
            .iter()
            .filter(|point| signed_distance(plane, point) >= 0.0)
            .count();
        if inside == 0 {
            IntersectionResult::None
        } else if inside == self.points.len() {
            IntersectionResult::Full
        } else {
            IntersectionResult::Partial
        }
    }

    /// Frustum planes against the volume's corners, then the volume's own
    /// planes against the frustum's corners
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

        let separated = self.planes.iter().any(|plane| {
            frustum
                .points
                .iter()
                .all(|point| signed_distance(plane, point) < 0.0)
        });
        if separated {
            IntersectionResult::None
        } else {
            IntersectionResult::Partial
        }
    }
}

/// Point shared by three planes, or `None` when two of them are parallel
fn intersect_planes(
    p1: &Vector4<f64>,
    p2: &Vector4<f64>,
    p3: &Vector4<f64>,
) -> Option<Vector3<f64>> {
    let (n1, n2, n3) = (p1.xyz(), p2.xyz(), p3.xyz());
    let n2_n3 = n2.cross(&n3);
    let n3_n1 = n3.cross(&n1);
    let n1_n2 = n1.cross(&n2);
    let det = n1.dot(&n2_n3);
    if det.abs() < 1e-12 {
        return None;
    }
    Some((n2_n3 * -p1.w + n3_n1 * -p2.w + n1_n2 * -p3.w) / det)
}

/// Volume a tile occupies in the camera's space
#[derive(Debug, Clone, PartialEq)]
pub enum BoundingVolume {
    Box(Aabb),
    Convex(ConvexVolume),
}

impl BoundingVolume {
    /// Axis-aligned bounds of the volume
    pub fn aabb(&self) -> &Aabb {
        match self {
            Self::Box(aabb) => aabb,
            Self::Convex(volume) => &volume.aabb,
        }
    }

    pub fn intersects_plane(&self, plane: &Vector4<f64>) -> IntersectionResult {
        match self {
            Self::Box(aabb) => aabb.intersects_plane(plane),
            Self::Convex(volume) => volume.intersects_plane(plane),
        }
    }

    pub fn intersects_frustum(&self, frustum: &Frustum) -> IntersectionResult {
        match self {
            Self::Box(aabb) => aabb.intersects_frustum(frustum),
            Self::Convex(volume) => volume.intersects_frustum(frustum),
        }
    }
}

impl From<Aabb> for BoundingVolume {
    fn from(aabb: Aabb) -> Self {
        Self::Box(aabb)
    }
}

impl From<ConvexVolume> for BoundingVolume {
    fn from(volume: ConvexVolume) -> Self {
        Self::Convex(volume)
    }
}
