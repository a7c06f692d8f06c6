use nalgebra::{Matrix4, Vector3, Vector4};

use super::aabb::Aabb;

/// Outcome of testing a volume against a plane or frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionResult {
    None,
    Partial,
    Full,
}

/// Corners of the clip-space cube: near face first, then far face
const CLIP_CORNERS: [[f64; 3]; 8] = [
    [-1.0, 1.0, -1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0],
    [-1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [-1.0, -1.0, 1.0],
];

/// Three corner indices spanning each face: near, far, left, right, bottom, top
const FACE_CORNERS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [6, 5, 4],
    [0, 3, 7],
    [2, 1, 5],
    [3, 2, 6],
    [0, 4, 5],
];

/// Camera view volume with inward-facing planes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    pub points: [Vector3<f64>; 8],
    pub planes: [Vector4<f64>; 6],
    pub aabb: Aabb,
}

impl Frustum {
    /// Unprojects the clip-space cube through an inverse view-projection
    /// matrix. After the perspective divide, x and y are divided by
    /// `world_size` while z is kept as is. Returns `None` when a corner
    /// lands at infinity.
    pub fn from_inv_projection_matrix(inv_proj: &Matrix4<f64>, world_size: f64) -> Option<Self> {
        let mut points = [Vector3::zeros(); 8];
        for (point, corner) in points.iter_mut().zip(CLIP_CORNERS.iter()) {
            let p = inv_proj * Vector4::new(corner[0], corner[1], corner[2], 1.0);
            if p.w.abs() < f64::EPSILON {
                return None;
            }
            let scale = 1.0 / p.w / world_size;
            *point = Vector3::new(p.x * scale, p.y * scale, p.z / p.w);
        }
        Self::from_points(points)
    }

    /// Shortens each edge running from a near corner to its far corner so
    /// that it stops where it crosses `plane`. Edges that never cross the
    /// plane ahead of the near corner keep their length.
    pub fn clip_far_corners(&self, plane: &Vector4<f64>) -> Option<Self> {
        let mut points = self.points;
        for i in 0..4 {
            let near = points[i];
            let edge = points[i + 4] - near;
            let length = edge.norm();
            let Some(direction) = edge.try_normalize(f64::EPSILON) else {
                continue;
            };
            let facing = plane.xyz().dot(&direction);
            if facing.abs() <= 1e-12 {
                continue;
            }
            let t = -signed_distance(plane, &near) / facing;
            if t >= 0.0 {
                points[i + 4] = near + direction * t.min(length);
            }
        }
        Self::from_points(points)
    }

    /// Builds the frustum from its eight corners, ordered like the
    /// clip-space cube (near face, then far face)
    pub fn from_points(points: [Vector3<f64>; 8]) -> Option<Self> {
        let centroid = points.iter().sum::<Vector3<f64>>() / 8.0;
        let mut planes = [Vector4::zeros(); 6];
        for (plane, face) in planes.iter_mut().zip(FACE_CORNERS.iter()) {
            let p0 = points[face[0]];
            let normal = (points[face[1]] - p0).cross(&(points[face[2]] - p0));
            let normal = normal.try_normalize(f64::EPSILON)?;
            let mut candidate = Vector4::new(normal.x, normal.y, normal.z, -normal.dot(&p0));
            if signed_distance(&candidate, &centroid) < 0.0 {
                candidate = -candidate;
            }
            *plane = candidate;
        }
        let aabb = Aabb::from_points(&points)?;
        Some(Self {
            points,
            planes,
            aabb,
        })
    }

    pub fn contains_point(&self, point: &Vector3<f64>) -> bool {
        self.planes
            .iter()
            .all(|plane| signed_distance(plane, point) >= 0.0)
    }
}

/// Distance from `point` to `plane`, positive on the inner side
pub fn signed_distance(plane: &Vector4<f64>, point: &Vector3<f64>) -> f64 {
    plane.xyz().dot(point) + plane.w
}
