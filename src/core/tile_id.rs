//! Tile identifiers and the packed keys used for table lookups.
//!
//! A [`CanonicalTileId`] names a quadtree cell. An [`OverscaledTileId`] adds
//! the zoom the tile is displayed at (which may exceed the canonical zoom when
//! a coarse source tile stands in for finer detail) and the world copy it is
//! rendered in.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::core::constants::{MAX_OVERSCALE_DELTA, MAX_TILE_ZOOM, MAX_WRAP, MIN_WRAP};
use crate::{Result, TileError};

/// Quadtree cell `(z, x, y)` with `x, y` in `[0, 2^z)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalTileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl CanonicalTileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        debug_assert!(z <= MAX_TILE_ZOOM, "zoom {z} out of range");
        debug_assert!(x < (1 << z) && y < (1 << z), "{z}/{x}/{y} out of range");
        Self { z, x, y }
    }

    pub fn try_new(z: u8, x: u32, y: u32) -> Result<Self> {
        let id = Self { z, x, y };
        if !id.is_valid() {
            return Err(TileError::InvalidTileId(id.to_string()));
        }
        Ok(id)
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        if self.z > MAX_TILE_ZOOM {
            return false;
        }
        let dim = 1u32 << self.z;
        self.x < dim && self.y < dim
    }

    /// Gets the parent tile at the next lower zoom level
    pub fn parent(&self) -> Option<Self> {
        self.ancestor_at(self.z.checked_sub(1)?)
    }

    /// Gets the ancestor at `z`, or `None` if `z` is deeper than this tile
    pub fn ancestor_at(&self, z: u8) -> Option<Self> {
        if z > self.z {
            return None;
        }
        let dz = self.z - z;
        Some(Self {
            z,
            x: self.x >> dz,
            y: self.y >> dz,
        })
    }

    /// The four children, ordered `(2x + i % 2, 2y + i / 2)` for `i` in `0..4`
    pub fn children(&self) -> [Self; 4] {
        let z = self.z + 1;
        let x = self.x * 2;
        let y = self.y * 2;
        [
            Self { z, x, y },
            Self { z, x: x + 1, y },
            Self { z, x, y: y + 1 },
            Self { z, x: x + 1, y: y + 1 },
        ]
    }

    /// True if repeated parent steps from `self` reach `ancestor`
    pub fn is_descendant_of(&self, ancestor: &CanonicalTileId) -> bool {
        ancestor.z < self.z && self.ancestor_at(ancestor.z).as_ref() == Some(ancestor)
    }
}

impl fmt::Display for CanonicalTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// A canonical tile displayed at `overscaled_z` in world copy `wrap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverscaledTileId {
    pub overscaled_z: u8,
    pub wrap: i32,
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    pub fn new(overscaled_z: u8, wrap: i32, z: u8, x: u32, y: u32) -> Self {
        debug_assert!(overscaled_z >= z, "overscaled zoom below canonical zoom");
        Self {
            overscaled_z,
            wrap,
            canonical: CanonicalTileId::new(z, x, y),
        }
    }

    /// Validating constructor for ids built outside the coverage selector
    pub fn try_new(overscaled_z: u8, wrap: i32, z: u8, x: u32, y: u32) -> Result<Self> {
        let canonical = CanonicalTileId::try_new(z, x, y)?;
        if overscaled_z < z || overscaled_z - z > MAX_OVERSCALE_DELTA {
            return Err(TileError::InvalidTileId(format!(
                "overscaled zoom {overscaled_z} for {canonical}"
            )));
        }
        if !(MIN_WRAP..=MAX_WRAP).contains(&wrap) {
            return Err(TileError::InvalidTileId(format!("wrap {wrap} for {canonical}")));
        }
        Ok(Self {
            overscaled_z,
            wrap,
            canonical,
        })
    }

    pub fn key(&self) -> TileKey {
        TileKey::new(self.wrap, self.overscaled_z, self.canonical)
    }

    pub fn is_overscaled(&self) -> bool {
        self.overscaled_z > self.canonical.z
    }

    pub fn overscale_factor(&self) -> u32 {
        1 << (self.overscaled_z - self.canonical.z)
    }

    /// The same tile in the primary world copy
    pub fn wrapped(&self) -> Self {
        self.unwrap_to(0)
    }

    pub fn unwrap_to(&self, wrap: i32) -> Self {
        Self { wrap, ..*self }
    }

    /// Ancestor at `target_z`, or an overscaled clone when `target_z` is
    /// above the canonical zoom
    pub fn scaled_to(&self, target_z: u8) -> Self {
        let canonical = if target_z > self.canonical.z {
            self.canonical
        } else {
            let dz = self.canonical.z - target_z;
            CanonicalTileId {
                z: target_z,
                x: self.canonical.x >> dz,
                y: self.canonical.y >> dz,
            }
        };
        Self {
            overscaled_z: target_z,
            wrap: self.wrap,
            canonical,
        }
    }

    /// Children one overscaled zoom deeper.
    ///
    /// Once the source's deepest zoom is reached the only child is this
    /// tile overscaled by one more level.
    pub fn children(&self, source_max_zoom: u8) -> Vec<Self> {
        if self.overscaled_z >= source_max_zoom {
            return vec![Self {
                overscaled_z: self.overscaled_z + 1,
                ..*self
            }];
        }
        self.canonical
            .children()
            .into_iter()
            .map(|canonical| Self {
                overscaled_z: canonical.z,
                wrap: self.wrap,
                canonical,
            })
            .collect()
    }

    pub fn is_child_of(&self, parent: &OverscaledTileId) -> bool {
        if parent.wrap != self.wrap {
            return false;
        }
        if parent.overscaled_z == 0 {
            return true;
        }
        let Some(dz) = self.canonical.z.checked_sub(parent.canonical.z) else {
            return false;
        };
        parent.overscaled_z < self.overscaled_z
            && parent.canonical.x == self.canonical.x >> dz
            && parent.canonical.y == self.canonical.y >> dz
    }

    /// Order in which renderers draw tiles: shallow zooms first, then world
    /// copies, then rows and columns from the bottom right
    pub fn render_cmp(&self, other: &Self) -> Ordering {
        fn wrap_rank(wrap: i32) -> i32 {
            (wrap * 2).abs() - i32::from(wrap < 0)
        }
        self.overscaled_z
            .cmp(&other.overscaled_z)
            .then_with(|| wrap_rank(other.wrap).cmp(&wrap_rank(self.wrap)))
            .then_with(|| other.canonical.y.cmp(&self.canonical.y))
            .then_with(|| other.canonical.x.cmp(&self.canonical.x))
    }
}

impl fmt::Display for OverscaledTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)?;
        if self.is_overscaled() {
            write!(f, "@{}", self.overscaled_z)?;
        }
        if self.wrap != 0 {
            write!(f, "~{}", self.wrap)?;
        }
        Ok(())
    }
}

const XY_BITS: u32 = 25;
const Z_BITS: u32 = 5;
const DELTA_BITS: u32 = 4;
const XY_MASK: u64 = (1 << XY_BITS) - 1;
const Z_MASK: u64 = (1 << Z_BITS) - 1;
const DELTA_MASK: u64 = (1 << DELTA_BITS) - 1;
const Y_SHIFT: u32 = XY_BITS;
const Z_SHIFT: u32 = 2 * XY_BITS;
const DELTA_SHIFT: u32 = Z_SHIFT + Z_BITS;
const WRAP_SHIFT: u32 = DELTA_SHIFT + DELTA_BITS;

/// Packed 64-bit key of an [`OverscaledTileId`].
///
/// Layout from the low bits: `x` (25), `y` (25), `z` (5), overscale delta
/// (4), zig-zag encoded wrap (5). Every field of the id takes part, so two
/// ids share a key exactly when they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey(u64);

impl TileKey {
    pub fn new(wrap: i32, overscaled_z: u8, canonical: CanonicalTileId) -> Self {
        let zigzag = ((wrap << 1) ^ (wrap >> 31)) as u32 as u64;
        let delta = u64::from(overscaled_z.saturating_sub(canonical.z));
        Self(
            (u64::from(canonical.x) & XY_MASK)
                | (u64::from(canonical.y) & XY_MASK) << Y_SHIFT
                | (u64::from(canonical.z) & Z_MASK) << Z_SHIFT
                | (delta & DELTA_MASK) << DELTA_SHIFT
                | zigzag << WRAP_SHIFT,
        )
    }

    /// Rebuilds the id this key was derived from
    pub fn to_tile_id(&self) -> OverscaledTileId {
        let x = (self.0 & XY_MASK) as u32;
        let y = ((self.0 >> Y_SHIFT) & XY_MASK) as u32;
        let z = ((self.0 >> Z_SHIFT) & Z_MASK) as u8;
        let delta = ((self.0 >> DELTA_SHIFT) & DELTA_MASK) as u8;
        let zigzag = (self.0 >> WRAP_SHIFT) as i32;
        let wrap = (zigzag >> 1) ^ -(zigzag & 1);
        OverscaledTileId {
            overscaled_z: z + delta,
            wrap,
            canonical: CanonicalTileId { z, x, y },
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
