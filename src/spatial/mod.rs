//! Geometry used for visibility tests: bounding boxes, convex tile volumes
//! and view frusta.

pub mod aabb;
pub mod convex_volume;
pub mod culling;

pub use aabb::Aabb;
pub use convex_volume::{BoundingVolume, ConvexVolume};
pub use culling::{Frustum, IntersectionResult};
