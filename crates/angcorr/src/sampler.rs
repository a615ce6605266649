//! Draws random catalogs that trace the footprint.

use crate::coords::{AngularPoint, UnitVector};
use crate::error::Error;
use crate::mask::FootprintMask;
use crate::sphere_index::SphereCell;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Draws points uniformly (in solid angle) within a [`FootprintMask`].
///
/// A stored cell is picked with probability proportional to its area. The
/// candidate is then kept with probability equal to the cell's coverage, and
/// its position is drawn uniformly over the full cell. The expected density
/// of the output is therefore proportional to the covered solid angle
/// (rather than to the number of stored cells).
pub struct RandomSampler {
    cells: Vec<(SphereCell, f64)>,
    // running total of the stored cell areas
    cumulative_area: Vec<f64>,
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    /// When `seed` is `None`, the generator is seeded from the thread-local
    /// generator.
    pub fn new(mask: &FootprintMask, seed: Option<u64>) -> Result<Self, Error> {
        let mut cells = Vec::with_capacity(mask.n_cells());
        let mut cumulative_area = Vec::with_capacity(mask.n_cells());
        let mut total = 0.0;
        for (cell, &coverage) in mask.stored() {
            if coverage > 0.0 {
                total += cell.area();
                cells.push((*cell, coverage));
                cumulative_area.push(total);
            }
        }
        if cells.is_empty() {
            return Err(Error::malformed_mask(
                None,
                "can't draw random points from an empty mask",
            ));
        }
        let seed = seed.unwrap_or_else(|| rand::rng().random::<u64>());
        Ok(RandomSampler {
            cells,
            cumulative_area,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        })
    }

    /// Draw exactly `n` points. Rejected candidates are redrawn.
    pub fn sample(&mut self, n: usize) -> Vec<AngularPoint> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if let Some(point) = self.try_draw() {
                out.push(point);
            }
        }
        out
    }

    fn try_draw(&mut self) -> Option<AngularPoint> {
        let total = self.cumulative_area[self.cumulative_area.len() - 1];
        let target = self.rng.random::<f64>() * total;
        let index = self
            .cumulative_area
            .partition_point(|&c| c <= target)
            .min(self.cells.len() - 1);
        let (cell, coverage) = self.cells[index];
        if self.rng.random::<f64>() >= coverage {
            return None;
        }
        let b = cell.bounds();
        let ra = b.ra_min + self.rng.random::<f64>() * b.ra_width();
        let z = b.z_min + self.rng.random::<f64>() * b.z_height();
        Some(AngularPoint::from_unit_vector(UnitVector::from_ra_z(ra, z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{MaskDescription, MaskRecord};

    #[test]
    fn exact_count_and_inside() {
        let cell = SphereCell::new(4, 77).unwrap();
        let desc = MaskDescription {
            records: vec![MaskRecord::cell(cell, 0.3)],
            declared_area_sq_deg: None,
        };
        let mask = FootprintMask::build(&desc).unwrap();
        let mut sampler = RandomSampler::new(&mask, Some(7)).unwrap();
        let points = sampler.sample(1234);
        assert_eq!(points.len(), 1234);
        for p in &points {
            assert_eq!(SphereCell::containing(p.unit_vector(), 4).unwrap(), cell);
            assert_eq!(p.weight(), 1.0);
        }
    }

    #[test]
    fn seeded_draws_repeat() {
        let mask = FootprintMask::full_sky();
        let a = RandomSampler::new(&mask, Some(42)).unwrap().sample(50);
        let b = RandomSampler::new(&mask, Some(42)).unwrap().sample(50);
        assert_eq!(a, b);
    }
}
