//! Hierarchical, equal-area addressing of the unit sphere.
//!
//! The sphere is mapped onto the unit square `(u, t)` with `u = ra / 2π` and
//! `t = (sin(dec) + 1) / 2`. Because the mapping from `(ra, sin(dec))` to
//! solid angle is linear (Lambert's cylindrical projection), a uniform
//! `2^ℓ × 2^ℓ` grid of that square divides the sphere into `4^ℓ` cells of
//! exactly `4π / 4^ℓ` steradians each. Refining a level splits every cell
//! into 4 children.
//!
//! A cell is addressed by its level and a bit-interleaved (Morton) ordinal,
//! so cells are plain values: the children of ordinal `o` are
//! `4o .. 4o + 3` and its parent is `o >> 2`. The descendants of a cell at a
//! finer level form a contiguous range of ordinals.
//!
//! The cells of this scheme become long & thin close to the poles. That's
//! harmless for area bookkeeping (every cell has the same area), but it means
//! the angular extent of a cell must be measured with
//! [`SphereCell::bounding_radius`] rather than inferred from its level.

use crate::coords::{UnitVector, cap_contains_pole};
use crate::error::Error;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// The finest level supported by the addressing scheme.
///
/// At this level, each axis of the grid has `2^30` divisions. The ordinal
/// then needs 60 bits.
pub const MAX_LEVEL: u8 = 30;

/// solid angle of the full sphere
pub const SPHERE_AREA: f64 = 4.0 * PI;

#[inline]
fn spread_bits(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

#[inline]
fn compact_bits(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// The solid angle of a single cell at `level` (steradians)
#[inline]
pub fn cell_area(level: u8) -> f64 {
    // 4^-level is an exact power of 2
    SPHERE_AREA / ((1_u64 << (2 * level as u32)) as f64)
}

/// The characteristic angular size (radians) of the cells at `level`: the
/// square root of the cell area.
#[inline]
pub fn cell_scale(level: u8) -> f64 {
    SPHERE_AREA.sqrt() / ((1_u64 << level) as f64)
}

/// The number of cells at `level`
#[inline]
pub fn n_cells_at(level: u8) -> u64 {
    1_u64 << (2 * level as u32)
}

/// The extent of a cell in `(ra, z = sin(dec))` space. RA is in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellBounds {
    pub ra_min: f64,
    pub ra_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl CellBounds {
    pub fn ra_width(&self) -> f64 {
        self.ra_max - self.ra_min
    }

    pub fn z_height(&self) -> f64 {
        self.z_max - self.z_min
    }
}

/// Identifies a single cell of the hierarchical subdivision.
///
/// Cells order first by level and then by ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SphereCell {
    level: u8,
    ordinal: u64,
}

impl SphereCell {
    /// Construct a cell from its address. Fails if the level is unsupported
    /// or the ordinal doesn't exist at that level.
    pub fn new(level: u8, ordinal: u64) -> Result<Self, Error> {
        if level > MAX_LEVEL {
            Err(Error::invalid_level(level as i32, 0, MAX_LEVEL))
        } else if ordinal >= n_cells_at(level) {
            Err(Error::invalid_cell(level, ordinal))
        } else {
            Ok(SphereCell { level, ordinal })
        }
    }

    /// The single cell that covers the whole sphere
    pub const fn root() -> Self {
        SphereCell {
            level: 0,
            ordinal: 0,
        }
    }

    /// Resolve the unique cell at `level` that contains `position`.
    pub fn containing(position: &UnitVector, level: u8) -> Result<Self, Error> {
        if level > MAX_LEVEL {
            Err(Error::invalid_level(level as i32, 0, MAX_LEVEL))
        } else {
            Ok(Self::locate_unchecked(position, level))
        }
    }

    /// Like [`SphereCell::containing`], but the caller guarantees that
    /// `level <= MAX_LEVEL`.
    ///
    /// The grid coordinates at `level + 1` are computed from exactly the same
    /// `(u, t)` values scaled by a power of two, which can't introduce
    /// rounding. So the result at `level + 1` is always a child of the result
    /// at `level`.
    pub(crate) fn locate_unchecked(position: &UnitVector, level: u8) -> Self {
        let (u, t) = unit_square_coords(position);
        let n = 1_u64 << level;
        let scale = n as f64;
        let ix = ((u * scale).floor() as u64).min(n - 1) as u32;
        let iy = ((t * scale).floor() as u64).min(n - 1) as u32;
        Self::from_xy(level, ix, iy)
    }

    // the caller guarantees that `ordinal < 4^level`
    pub(crate) fn from_ordinal_unchecked(level: u8, ordinal: u64) -> Self {
        SphereCell { level, ordinal }
    }

    pub(crate) fn from_xy(level: u8, ix: u32, iy: u32) -> Self {
        SphereCell {
            level,
            ordinal: spread_bits(ix) | (spread_bits(iy) << 1),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// The column (RA) & row (z) of this cell in its level's grid
    pub fn xy(&self) -> (u32, u32) {
        (compact_bits(self.ordinal), compact_bits(self.ordinal >> 1))
    }

    /// exact solid angle in steradians
    pub fn area(&self) -> f64 {
        cell_area(self.level)
    }

    /// `None` for the root cell
    pub fn parent(&self) -> Option<SphereCell> {
        if self.level == 0 {
            None
        } else {
            Some(SphereCell {
                level: self.level - 1,
                ordinal: self.ordinal >> 2,
            })
        }
    }

    /// `None` at [`MAX_LEVEL`]
    pub fn children(&self) -> Option<[SphereCell; 4]> {
        if self.level >= MAX_LEVEL {
            None
        } else {
            let level = self.level + 1;
            let first = self.ordinal << 2;
            Some(core::array::from_fn(|i| SphereCell {
                level,
                ordinal: first + i as u64,
            }))
        }
    }

    /// The ancestor of this cell at a coarser (or equal) `level`
    pub fn ancestor(&self, level: u8) -> Option<SphereCell> {
        if level > self.level {
            None
        } else {
            let shift = 2 * (self.level - level) as u32;
            Some(SphereCell {
                level,
                ordinal: self.ordinal >> shift,
            })
        }
    }

    /// The half-open range of ordinals at the finer (or equal) `level` that
    /// are descendants of this cell.
    pub fn descendant_range(&self, level: u8) -> Option<core::ops::Range<u64>> {
        if level < self.level || level > MAX_LEVEL {
            None
        } else {
            let shift = 2 * (level - self.level) as u32;
            Some((self.ordinal << shift)..((self.ordinal + 1) << shift))
        }
    }

    /// `true` when `other` is this cell or one of its descendants
    pub fn contains_cell(&self, other: &SphereCell) -> bool {
        other.ancestor(self.level) == Some(*self)
    }

    pub fn bounds(&self) -> CellBounds {
        let (ix, iy) = self.xy();
        let n = (1_u64 << self.level) as f64;
        let dra = TAU / n;
        let dz = 2.0 / n;
        CellBounds {
            ra_min: ix as f64 * dra,
            ra_max: (ix as f64 + 1.0) * dra,
            z_min: -1.0 + iy as f64 * dz,
            z_max: -1.0 + (iy as f64 + 1.0) * dz,
        }
    }

    /// The point at the middle of the cell in `(ra, z)` space. Since the
    /// projection is equal-area, this splits the cell's area evenly.
    pub fn center(&self) -> UnitVector {
        let b = self.bounds();
        UnitVector::from_ra_z(0.5 * (b.ra_min + b.ra_max), 0.5 * (b.z_min + b.z_max))
    }

    /// An upper bound on the angle (radians) between [`SphereCell::center`]
    /// and any point within the cell.
    pub fn bounding_radius(&self) -> f64 {
        if self.level <= 1 {
            // these cells span at least half of the sphere in RA
            return PI;
        }
        // For cells spanning less than π/2 in RA, the farthest point of the
        // cell from its center is always one of the corners.
        let b = self.bounds();
        let center = self.center();
        let mut max_angle: f64 = 0.0;
        for ra in [b.ra_min, b.ra_max] {
            for z in [b.z_min, b.z_max] {
                let corner = UnitVector::from_ra_z(ra, z);
                max_angle = max_angle.max(center.angle_to(&corner));
            }
        }
        max_angle + 1e-12
    }
}

impl std::fmt::Display for SphereCell {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "(level {}, ordinal {})", self.level, self.ordinal)
    }
}

// `u` in [0, 1) and `t` in [0, 1]
#[inline]
fn unit_square_coords(position: &UnitVector) -> (f64, f64) {
    let mut u = position.ra() / TAU;
    if u >= 1.0 {
        u = 0.0;
    }
    let t = 0.5 * (position.z().clamp(-1.0, 1.0) + 1.0);
    (u, t)
}

/// A conservative `(ra, z)` bounding box for a spherical cap, used to prune
/// the hierarchical descent in [`SphereIndex::cover_cap`].
#[derive(Clone, Copy, Debug)]
pub struct CapBound {
    center: UnitVector,
    radius: f64,
    z_min: f64,
    z_max: f64,
    ra_center: f64,
    // π when the cap spans every RA
    ra_half_width: f64,
}

impl CapBound {
    const PAD: f64 = 1e-12;

    /// `radius` is in radians
    pub fn new(center: UnitVector, radius: f64) -> Self {
        let dec = center.dec();
        let z_min = (dec - radius).max(-FRAC_PI_2).sin() - Self::PAD;
        let z_max = (dec + radius).min(FRAC_PI_2).sin() + Self::PAD;
        let ra_half_width = if radius >= FRAC_PI_2 || cap_contains_pole(&center, radius) {
            PI
        } else {
            let ratio = radius.sin() / dec.cos();
            if ratio >= 1.0 {
                PI
            } else {
                ratio.asin() + Self::PAD
            }
        };
        CapBound {
            center,
            radius,
            z_min,
            z_max,
            ra_center: center.ra(),
            ra_half_width,
        }
    }

    pub fn center(&self) -> &UnitVector {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// `false` only when `cell` definitely doesn't intersect the cap
    pub fn may_intersect(&self, cell: &SphereCell) -> bool {
        let b = cell.bounds();
        if b.z_max < self.z_min || b.z_min > self.z_max {
            return false;
        }
        if self.ra_half_width < PI {
            let lo = self.ra_center - self.ra_half_width;
            let hi = self.ra_center + self.ra_half_width;
            let overlaps_ra = [-TAU, 0.0, TAU]
                .into_iter()
                .any(|shift| b.ra_max + shift >= lo && b.ra_min + shift <= hi);
            if !overlaps_ra {
                return false;
            }
        }
        // the box test is loose along the diagonals of the cap
        self.center.angle_to(&cell.center()) - cell.bounding_radius() <= self.radius
    }
}

/// The addressing scheme restricted to a configured range of levels.
///
/// The hierarchy itself is implicit; this type only holds the bounds that
/// the rest of a run is allowed to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SphereIndex {
    min_level: u8,
    max_level: u8,
}

impl Default for SphereIndex {
    fn default() -> Self {
        SphereIndex {
            min_level: 0,
            max_level: MAX_LEVEL,
        }
    }
}

impl SphereIndex {
    pub fn new(min_level: u8, max_level: u8) -> Result<Self, Error> {
        if max_level > MAX_LEVEL {
            Err(Error::invalid_level(max_level as i32, 0, MAX_LEVEL))
        } else if min_level > max_level {
            Err(Error::invalid_level(min_level as i32, 0, max_level))
        } else {
            Ok(SphereIndex {
                min_level,
                max_level,
            })
        }
    }

    pub fn min_level(&self) -> u8 {
        self.min_level
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    fn check_level(&self, level: i32) -> Result<u8, Error> {
        if level < self.min_level as i32 || level > self.max_level as i32 {
            Err(Error::invalid_level(level, self.min_level, self.max_level))
        } else {
            Ok(level as u8)
        }
    }

    /// Resolve the cell at `level` containing `position`
    pub fn locate(&self, position: &UnitVector, level: u8) -> Result<SphereCell, Error> {
        let level = self.check_level(level as i32)?;
        Ok(SphereCell::locate_unchecked(position, level))
    }

    /// Fails with `InvalidLevel` when `cell` already sits at the coarsest
    /// configured level
    pub fn parent(&self, cell: &SphereCell) -> Result<SphereCell, Error> {
        self.check_level(cell.level() as i32 - 1)?;
        cell.parent()
            .ok_or_else(|| Error::invalid_level(-1, self.min_level, self.max_level))
    }

    /// Fails with `InvalidLevel` when `cell` already sits at the finest
    /// configured level
    pub fn children(&self, cell: &SphereCell) -> Result<[SphereCell; 4], Error> {
        self.check_level(cell.level() as i32 + 1)?;
        cell.children().ok_or_else(|| {
            Error::invalid_level(cell.level() as i32 + 1, self.min_level, self.max_level)
        })
    }

    pub fn area(&self, level: u8) -> Result<f64, Error> {
        Ok(cell_area(self.check_level(level as i32)?))
    }

    pub fn cell_scale(&self, level: u8) -> Result<f64, Error> {
        Ok(cell_scale(self.check_level(level as i32)?))
    }

    /// The coarsest configured level whose [`cell_scale`] doesn't exceed
    /// `angle` (radians). Angles smaller than the finest scale map to the
    /// finest level.
    pub fn level_for_scale(&self, angle: f64) -> u8 {
        (self.min_level..=self.max_level)
            .find(|&level| cell_scale(level) <= angle)
            .unwrap_or(self.max_level)
    }

    /// The finest configured level whose [`cell_scale`] is at least `angle`
    /// (radians). Angles larger than the coarsest scale map to the coarsest
    /// level.
    pub fn finest_level_at_least(&self, angle: f64) -> u8 {
        (self.min_level..=self.max_level)
            .rev()
            .find(|&level| cell_scale(level) >= angle)
            .unwrap_or(self.min_level)
    }

    /// Every cell at `level` that may intersect the cap of angular `radius`
    /// (radians) centered on `center`, sorted by ordinal.
    ///
    /// The result is a superset of the intersecting cells: it's found by
    /// descending the hierarchy from the root and discarding every subtree
    /// whose bounding box misses the cap. The cost scales with the number
    /// of cells near the cap edge rather than with the number of cells at
    /// `level`.
    pub fn cover_cap(
        &self,
        center: &UnitVector,
        radius: f64,
        level: u8,
    ) -> Result<Vec<SphereCell>, Error> {
        let level = self.check_level(level as i32)?;
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(Error::invalid_range(
                "radius",
                format!("cap radius must be finite & non-negative (got {radius})"),
            ));
        }
        let bound = CapBound::new(*center, radius);
        Ok(cover_with(&bound, level))
    }
}

pub(crate) fn cover_with(bound: &CapBound, level: u8) -> Vec<SphereCell> {
    let mut out = Vec::new();
    let mut stack = vec![SphereCell::root()];
    while let Some(cell) = stack.pop() {
        if !bound.may_intersect(&cell) {
            continue;
        }
        if cell.level() == level {
            out.push(cell);
        } else if let Some(children) = cell.children() {
            stack.extend(children);
        }
    }
    out.sort_unstable();
    out
}
