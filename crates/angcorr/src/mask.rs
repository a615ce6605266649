//! Survey footprints represented as weighted unions of [`SphereCell`]s.
//!
//! A [`FootprintMask`] is built once from an already-parsed
//! [`MaskDescription`] and is read-only afterwards. Cells are stored at mixed
//! levels (coarse cells in the interior of the footprint, fine cells along
//! its edge), but no stored cell ever overlaps another one: every position
//! on the sphere resolves to at most one stored cell.

use crate::coords::{AngularPoint, UnitVector};
use crate::error::Error;
use crate::sphere_index::{CellBounds, MAX_LEVEL, SphereCell};
use std::collections::BTreeMap;
use tracing::debug;

/// steradians to square degrees
pub const SQ_DEG_PER_SR: f64 = (180.0 / std::f64::consts::PI) * (180.0 / std::f64::consts::PI);

// relative tolerance used when comparing the built area against the area
// declared by a mask description
const AREA_CHECK_RTOL: f64 = 1e-5;

// slack permitted when validating summed coverage
const COVERAGE_SLACK: f64 = 1e-9;

/// An RA/Dec aligned box. Angles are in degrees.
///
/// Boxes don't wrap around RA = 0; a footprint straddling it is described
/// with 2 boxes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaDecBox {
    ra_min: f64,
    ra_max: f64,
    dec_min: f64,
    dec_max: f64,
}

impl RaDecBox {
    pub fn new(ra_min: f64, ra_max: f64, dec_min: f64, dec_max: f64) -> Result<Self, Error> {
        let all_finite = [ra_min, ra_max, dec_min, dec_max]
            .iter()
            .all(|x| x.is_finite());
        if !all_finite {
            Err(Error::invalid_range("box", "box edges must be finite"))
        } else if !(0.0 <= ra_min && ra_min < ra_max && ra_max <= 360.0) {
            Err(Error::invalid_range(
                "box",
                format!("need 0 <= ra_min < ra_max <= 360 (got {ra_min}, {ra_max})"),
            ))
        } else if !(-90.0 <= dec_min && dec_min < dec_max && dec_max <= 90.0) {
            Err(Error::invalid_range(
                "box",
                format!("need -90 <= dec_min < dec_max <= 90 (got {dec_min}, {dec_max})"),
            ))
        } else {
            Ok(RaDecBox {
                ra_min,
                ra_max,
                dec_min,
                dec_max,
            })
        }
    }

    // the box in the (ra [radians], z) space used by the cells
    fn projected(&self) -> CellBounds {
        // computing RA as a fraction of a full turn keeps 0 and 360 exact
        let tau = std::f64::consts::TAU;
        CellBounds {
            ra_min: (self.ra_min / 360.0) * tau,
            ra_max: (self.ra_max / 360.0) * tau,
            z_min: self.dec_min.to_radians().sin(),
            z_max: self.dec_max.to_radians().sin(),
        }
    }

    /// The exact solid angle enclosed by the box (steradians)
    pub fn area(&self) -> f64 {
        let b = self.projected();
        b.ra_width() * b.z_height()
    }
}

/// The geometry described by a single mask record
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaskRegion {
    /// A single cell
    Cell(SphereCell),
    /// An RA/Dec box, rasterized with cells no finer than `level`
    Rectangle { bounds: RaDecBox, level: u8 },
}

/// One entry of a mask description.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskRecord {
    pub region: MaskRegion,
    /// Fraction of the region that belongs to the footprint
    pub coverage: f64,
}

impl MaskRecord {
    pub fn cell(cell: SphereCell, coverage: f64) -> Self {
        MaskRecord {
            region: MaskRegion::Cell(cell),
            coverage,
        }
    }

    pub fn rectangle(bounds: RaDecBox, level: u8, coverage: f64) -> Self {
        MaskRecord {
            region: MaskRegion::Rectangle { bounds, level },
            coverage,
        }
    }
}

/// The raw, already-parsed input to [`FootprintMask::build`].
#[derive(Clone, Debug, Default)]
pub struct MaskDescription {
    pub records: Vec<MaskRecord>,
    /// When provided, the area (square degrees) the built mask must have
    pub declared_area_sq_deg: Option<f64>,
}

/// A cell paired with its coverage and (optionally) a density accumulated
/// from catalog points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedCell {
    pub cell: SphereCell,
    /// Fraction of the cell's area inside of the footprint, in `(0, 1]`
    pub coverage: f64,
    /// Summed weight of the catalog points that fall within the cell
    pub density: f64,
}

impl WeightedCell {
    /// The covered solid angle of the cell
    pub fn covered_area(&self) -> f64 {
        self.cell.area() * self.coverage
    }
}

#[derive(Clone, Debug)]
pub struct FootprintMask {
    cells: BTreeMap<SphereCell, f64>,
    // distinct stored levels, finest first
    levels: Vec<u8>,
    area: f64,
}

impl FootprintMask {
    /// Build the mask from a parsed description.
    ///
    /// Records that overlap (a cell alongside one of its ancestors, or the
    /// same cell listed twice) are merged by pushing the coarse coverage down
    /// onto the finer cells and summing. The build fails with
    /// `MalformedMask` if any resolved coverage falls outside of `[0, 1]`,
    /// if nothing is covered, or if the area disagrees with the declared
    /// area.
    pub fn build(description: &MaskDescription) -> Result<Self, Error> {
        let mut cells: BTreeMap<SphereCell, f64> = BTreeMap::new();
        for record in &description.records {
            add_record(&mut cells, record)?;
        }
        resolve_overlaps(&mut cells);

        for (cell, coverage) in cells.iter_mut() {
            if !coverage.is_finite() || *coverage > 1.0 + COVERAGE_SLACK {
                return Err(Error::malformed_mask(
                    Some(*cell),
                    format!("overlapping records sum to a coverage of {coverage}"),
                ));
            }
            *coverage = coverage.min(1.0);
        }
        cells.retain(|_, coverage| *coverage > 0.0);
        if cells.is_empty() {
            return Err(Error::malformed_mask(None, "the mask doesn't cover anything"));
        }
        compact_siblings(&mut cells);

        let mask = FootprintMask::from_resolved(cells);
        if let Some(declared) = description.declared_area_sq_deg {
            let actual = mask.area_sq_deg();
            if (actual - declared).abs() > AREA_CHECK_RTOL * declared.abs().max(1e-12) {
                return Err(Error::malformed_mask(
                    None,
                    format!("built area of {actual} sq deg disagrees with declared area of {declared} sq deg"),
                ));
            }
        }
        debug!(
            n_cells = mask.n_cells(),
            levels = ?mask.levels,
            area_sq_deg = mask.area_sq_deg(),
            "built footprint mask"
        );
        Ok(mask)
    }

    /// A mask covering the full sphere
    pub fn full_sky() -> Self {
        let mut cells = BTreeMap::new();
        cells.insert(SphereCell::root(), 1.0);
        FootprintMask::from_resolved(cells)
    }

    fn from_resolved(cells: BTreeMap<SphereCell, f64>) -> Self {
        let mut levels: Vec<u8> = cells.keys().map(|c| c.level()).collect();
        levels.dedup();
        levels.reverse();
        let area = cells.iter().map(|(c, w)| c.area() * w).sum();
        FootprintMask {
            cells,
            levels,
            area,
        }
    }

    /// Covered solid angle in steradians
    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn area_sq_deg(&self) -> f64 {
        self.area * SQ_DEG_PER_SR
    }

    /// The distinct levels that hold stored cells, finest first
    pub fn levels(&self) -> &[u8] {
        &self.levels
    }

    pub fn finest_level(&self) -> u8 {
        self.levels.first().copied().unwrap_or(0)
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// The stored cells, ordered by level and then ordinal
    pub fn cells(&self) -> impl Iterator<Item = WeightedCell> + '_ {
        self.cells.iter().map(|(&cell, &coverage)| WeightedCell {
            cell,
            coverage,
            density: 0.0,
        })
    }

    /// The coverage of the stored cell containing `position` (0 outside of
    /// the footprint)
    pub fn coverage_at(&self, position: &UnitVector) -> f64 {
        for &level in &self.levels {
            let cell = SphereCell::locate_unchecked(position, level);
            if let Some(&coverage) = self.cells.get(&cell) {
                return coverage;
            }
        }
        0.0
    }

    /// Returns whether the coverage at `point` exceeds `threshold`, along
    /// with that coverage.
    pub fn contains(&self, point: &AngularPoint, threshold: f64) -> (bool, f64) {
        let coverage = self.coverage_at(point.unit_vector());
        (coverage > threshold, coverage)
    }

    /// The subset of `points` accepted by [`FootprintMask::contains`]
    pub fn filter_points(&self, points: &[AngularPoint], threshold: f64) -> Vec<AngularPoint> {
        points
            .iter()
            .filter(|p| self.contains(p, threshold).0)
            .copied()
            .collect()
    }

    /// Re-express the mask at a uniform `level`.
    ///
    /// Stored cells coarser than `level` are split into their descendants
    /// (each inherits the coverage) and finer cells are merged into their
    /// ancestor (the ancestor's coverage is the area-weighted average). The
    /// covered area is conserved. The output is sorted by ordinal and every
    /// density is zero.
    pub fn decompose(&self, level: u8) -> Result<Vec<WeightedCell>, Error> {
        if level > MAX_LEVEL {
            return Err(Error::invalid_level(level as i32, 0, MAX_LEVEL));
        }
        let mut merged: BTreeMap<u64, f64> = BTreeMap::new();
        for (cell, &coverage) in &self.cells {
            if cell.level() <= level {
                if let Some(range) = cell.descendant_range(level) {
                    for ordinal in range {
                        *merged.entry(ordinal).or_insert(0.0) += coverage;
                    }
                }
            } else if let Some(ancestor) = cell.ancestor(level) {
                let depth = 2 * (cell.level() - level) as i32;
                let fraction = 0.5_f64.powi(depth);
                *merged.entry(ancestor.ordinal()).or_insert(0.0) += coverage * fraction;
            }
        }
        Ok(merged
            .into_iter()
            .filter(|(_, coverage)| *coverage > 0.0)
            .map(|(ordinal, coverage)| WeightedCell {
                cell: SphereCell::from_ordinal_unchecked(level, ordinal),
                coverage: coverage.min(1.0),
                density: 0.0,
            })
            .collect())
    }

    pub(crate) fn stored(&self) -> impl Iterator<Item = (&SphereCell, &f64)> {
        self.cells.iter()
    }
}

fn add_record(cells: &mut BTreeMap<SphereCell, f64>, record: &MaskRecord) -> Result<(), Error> {
    let coverage = record.coverage;
    let bad = !coverage.is_finite() || !(0.0..=1.0).contains(&coverage);
    match record.region {
        MaskRegion::Cell(cell) => {
            if bad {
                return Err(Error::malformed_mask(
                    Some(cell),
                    format!("record coverage of {coverage} lies outside of [0, 1]"),
                ));
            }
            *cells.entry(cell).or_insert(0.0) += coverage;
        }
        MaskRegion::Rectangle { bounds, level } => {
            if bad {
                return Err(Error::malformed_mask(
                    None,
                    format!("rectangle coverage of {coverage} lies outside of [0, 1]"),
                ));
            } else if level > MAX_LEVEL {
                return Err(Error::invalid_level(level as i32, 0, MAX_LEVEL));
            }
            rasterize(cells, &bounds.projected(), level, coverage);
        }
    }
    Ok(())
}

// fraction of `cell` that overlaps the box, which is exact since the cell
// and the box are both rectangles in the equal-area (ra, z) plane
fn overlap_fraction(cell: &CellBounds, bounds: &CellBounds) -> f64 {
    let ra = (cell.ra_max.min(bounds.ra_max) - cell.ra_min.max(bounds.ra_min)).max(0.0);
    let z = (cell.z_max.min(bounds.z_max) - cell.z_min.max(bounds.z_min)).max(0.0);
    (ra / cell.ra_width()) * (z / cell.z_height())
}

fn rasterize(cells: &mut BTreeMap<SphereCell, f64>, bounds: &CellBounds, level: u8, coverage: f64) {
    let mut stack = vec![SphereCell::root()];
    while let Some(cell) = stack.pop() {
        let fraction = overlap_fraction(&cell.bounds(), bounds);
        if fraction <= 0.0 {
            continue;
        }
        let full = fraction >= 1.0 - 1e-12;
        if full || cell.level() >= level {
            let fraction = if full { 1.0 } else { fraction };
            *cells.entry(cell).or_insert(0.0) += coverage * fraction;
        } else if let Some(children) = cell.children() {
            stack.extend(children);
        }
    }
}

// push the coverage of every stored cell that has a stored descendant down
// to its children until no stored cell overlaps another
fn resolve_overlaps(cells: &mut BTreeMap<SphereCell, f64>) {
    loop {
        let mut levels: Vec<u8> = cells.keys().map(|c| c.level()).collect();
        levels.dedup();

        let to_split: Vec<SphereCell> = cells
            .keys()
            .filter(|cell| {
                levels.iter().filter(|&&l| l > cell.level()).any(|&l| {
                    cell.descendant_range(l).is_some_and(|range| {
                        let lo = SphereCell::from_ordinal_unchecked(l, range.start);
                        let hi = SphereCell::from_ordinal_unchecked(l, range.end - 1);
                        cells.range(lo..=hi).next().is_some()
                    })
                })
            })
            .copied()
            .collect();
        if to_split.is_empty() {
            return;
        }
        for cell in to_split {
            let coverage = cells.remove(&cell).unwrap_or(0.0);
            if let Some(children) = cell.children() {
                for child in children {
                    *cells.entry(child).or_insert(0.0) += coverage;
                }
            }
        }
    }
}

// replace every complete group of 4 siblings sharing a single coverage with
// their parent, from the finest level upwards
fn compact_siblings(cells: &mut BTreeMap<SphereCell, f64>) {
    let finest = cells.keys().map(|c| c.level()).max().unwrap_or(0);
    for level in (1..=finest).rev() {
        let at_level: Vec<(SphereCell, f64)> = cells
            .iter()
            .filter(|(c, _)| c.level() == level)
            .map(|(&c, &w)| (c, w))
            .collect();
        // siblings are adjacent in ordinal order
        for group in at_level.chunk_by(|a, b| a.0.parent() == b.0.parent()) {
            if group.len() == 4 && group.iter().all(|(_, w)| *w == group[0].1) {
                if let Some(parent) = group[0].0.parent() {
                    for (child, _) in group {
                        cells.remove(child);
                    }
                    cells.insert(parent, group[0].1);
                }
            }
        }
    }
}
