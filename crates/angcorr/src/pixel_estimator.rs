//! The density-map estimator used for the widest angular bins.
//!
//! For each resolution level required by a pixel bin, the footprint is
//! re-expressed as a uniform grid of [`WeightedCell`]s and the catalog is
//! binned into it. Every unordered pair of cells whose centers are separated
//! by an angle within a bin contributes the product of the two cells'
//! normalized densities, weighted by the product of their coverages. The
//! weighted mean of that product is `1 + w(θ)`.
//!
//! The error of each bin comes from a delete-one jackknife over groups of
//! cells that share an ancestor (see [`PixelEstimator::with_jackknife_regions`]).
//! Every cell pair is accumulated once into the full-map bin and once into
//! the bin of each region it touches, so all of the jackknife estimates come
//! out of the same reduction.
//!
//! The candidate neighbors of a cell come from [`SphereIndex::cover_cap`]
//! (via [`cover_with`]), so the work scales with the number of cells times
//! the number of cells within `θ_max`, rather than with the square of the
//! number of cells.
//!
//! [`SphereIndex::cover_cap`]: crate::SphereIndex::cover_cap

use angcorr_nostd_internal::{
    BinEdges, Datum, IrregularBinEdges, Mean, Reducer, ReductionSpec, StatePackView,
    StatePackViewMut,
};
use rayon::prelude::*;
use tracing::debug;

use crate::coords::{AngularPoint, UnitVector, squared_chord_for_angle};
use crate::error::Error;
use crate::mask::{FootprintMask, WeightedCell};
use crate::reducers::{Execution, get_output};
use crate::scale_bins::{BinCounts, BinEstimate, ScaleBinSet};
use crate::sphere_index::{CapBound, SphereCell, cell_area, cover_with};

/// The evaluated result of a single bin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinResult {
    /// position of the bin within its [`ScaleBinSet`]
    pub index: usize,
    pub counts: BinCounts,
    pub estimate: BinEstimate,
}

/// The catalog binned into the footprint at a single level.
#[derive(Clone, Debug)]
pub struct DensityMap {
    level: u8,
    cells: Vec<WeightedCell>,
    centers: Vec<UnitVector>,
    total_weight: f64,
    covered_area: f64,
    mean_density: f64,
}

impl DensityMap {
    /// Decompose `mask` to `level` and accumulate the weight of every point
    /// into the cell that contains it. Points that land outside of the
    /// decomposed footprint are ignored.
    pub fn build(
        mask: &FootprintMask,
        catalog: &[AngularPoint],
        level: u8,
        parallel: bool,
    ) -> Result<Self, Error> {
        let mut cells = mask.decompose(level)?;

        // locating points is independent per point, but the accumulation
        // below runs serially (in catalog order) so that the density field is
        // reproducible bit-for-bit
        let locate = |p: &AngularPoint| SphereCell::locate_unchecked(p.unit_vector(), level);
        let located: Vec<_> = if parallel {
            catalog.par_iter().map(locate).collect()
        } else {
            catalog.iter().map(locate).collect()
        };

        let mut total_weight = 0.0;
        for (point, cell) in catalog.iter().zip(located) {
            if let Ok(i) = cells.binary_search_by(|probe| probe.cell.cmp(&cell)) {
                cells[i].density += point.weight();
                total_weight += point.weight();
            }
        }

        let covered_area: f64 = cells.iter().map(|c| c.covered_area()).sum();
        let mean_density = if covered_area > 0.0 {
            total_weight / covered_area
        } else {
            0.0
        };
        let centers = cells.iter().map(|c| c.cell.center()).collect();
        Ok(DensityMap {
            level,
            cells,
            centers,
            total_weight,
            covered_area,
            mean_density,
        })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn cells(&self) -> &[WeightedCell] {
        &self.cells
    }

    /// summed weight of the points that landed in the map
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// weight per steradian of covered area
    pub fn mean_density(&self) -> f64 {
        self.mean_density
    }

    /// summed covered area of the cells (steradians)
    pub fn covered_area(&self) -> f64 {
        self.covered_area
    }

    // density of the cell, per steradian of covered area, relative to the
    // mean
    fn contrast(&self, i: usize) -> f64 {
        let c = &self.cells[i];
        c.density / (c.covered_area() * self.mean_density)
    }
}

/// Groups of a density map's cells that share an ancestor. Cells are sorted
/// by ordinal, so every region is a contiguous run of cells.
#[derive(Clone, Debug)]
struct JackknifeRegions {
    /// region of every cell of the map
    of_cell: Vec<usize>,
    /// summed point weight per region
    weight: Vec<f64>,
    /// covered area per region
    area: Vec<f64>,
}

impl JackknifeRegions {
    /// Group the cells by their ancestor at the coarsest level that yields
    /// at least `target` regions (or by cell, when no level does).
    fn new(map: &DensityMap, target: usize) -> Self {
        let level = (0..=map.level)
            .find(|&level| n_ancestors(&map.cells, level) >= target)
            .unwrap_or(map.level);

        let mut of_cell = Vec::with_capacity(map.cells.len());
        let mut weight: Vec<f64> = Vec::new();
        let mut area: Vec<f64> = Vec::new();
        let mut previous = None;
        for c in &map.cells {
            let ancestor = c.cell.ancestor(level);
            if ancestor != previous {
                previous = ancestor;
                weight.push(0.0);
                area.push(0.0);
            }
            let region = weight.len() - 1;
            of_cell.push(region);
            weight[region] += c.density;
            area[region] += c.covered_area();
        }
        JackknifeRegions {
            of_cell,
            weight,
            area,
        }
    }

    fn len(&self) -> usize {
        self.weight.len()
    }
}

fn n_ancestors(cells: &[WeightedCell], level: u8) -> usize {
    let mut n = 0;
    let mut previous = None;
    for c in cells {
        let ancestor = c.cell.ancestor(level);
        if ancestor != previous {
            previous = ancestor;
            n += 1;
        }
    }
    n
}

/// Describes the reduction over pairs of cells. Work unit `i` handles every
/// pair between cell `i` and a cell with a larger ordinal.
///
/// The statepack holds `n_regions + 1` groups of bins: group 0 accumulates
/// every pair and group `r + 1` the pairs with at least one cell in
/// region `r`.
struct CellPairSpec<'a> {
    map: &'a DensityMap,
    regions: &'a JackknifeRegions,
    // squared chord lengths
    edges: IrregularBinEdges<'a>,
    search_radius: f64,
    reducer: Mean,
}

impl ReductionSpec for CellPairSpec<'_> {
    type ReducerType = Mean;

    fn get_reducer(&self) -> &Self::ReducerType {
        &self.reducer
    }

    fn n_bins(&self) -> usize {
        self.edges.n_bins() * (self.regions.len() + 1)
    }

    fn n_work_units(&self) -> usize {
        self.map.cells.len()
    }

    fn add_contributions(&self, binned_statepack: &mut StatePackViewMut, work_unit: usize) {
        let map = self.map;
        let here = &map.cells[work_unit];
        let center = &map.centers[work_unit];
        let contrast = map.contrast(work_unit);
        let n_bins = self.edges.n_bins();
        let region = self.regions.of_cell[work_unit];

        let bound = CapBound::new(*center, self.search_radius);
        for neighbor in cover_with(&bound, map.level) {
            if neighbor <= here.cell {
                continue;
            }
            let Ok(j) = map.cells.binary_search_by(|probe| probe.cell.cmp(&neighbor)) else {
                continue;
            };
            let d2 = center.squared_chord(&map.centers[j]);
            if let Some(bin_index) = self.edges.bin_index(d2) {
                let datum = Datum {
                    value: contrast * map.contrast(j),
                    weight: here.coverage * map.cells[j].coverage,
                };
                self.reducer
                    .consume(&mut binned_statepack.get_state_mut(bin_index), &datum);
                self.reducer.consume(
                    &mut binned_statepack.get_state_mut((region + 1) * n_bins + bin_index),
                    &datum,
                );
                let other = self.regions.of_cell[j];
                if other != region {
                    self.reducer.consume(
                        &mut binned_statepack.get_state_mut((other + 1) * n_bins + bin_index),
                        &datum,
                    );
                }
            }
        }
    }
}

/// Evaluates the bins tagged [`Regime::Pixel`](crate::Regime::Pixel).
pub struct PixelEstimator<'a> {
    mask: &'a FootprintMask,
    execution: Execution,
    jackknife_regions: usize,
}

impl<'a> PixelEstimator<'a> {
    pub const DEFAULT_JACKKNIFE_REGIONS: usize = 32;

    pub fn new(mask: &'a FootprintMask, execution: Execution) -> Self {
        PixelEstimator {
            mask,
            execution,
            jackknife_regions: Self::DEFAULT_JACKKNIFE_REGIONS,
        }
    }

    /// Set the smallest number of jackknife regions a density map is split
    /// into. The regions are the map's ancestors at the coarsest level with
    /// at least `n` of them.
    ///
    /// A map with fewer than 2 regions (or a bin whose pairs all touch a
    /// single region) falls back to the counting error `√P / E`, where `P`
    /// is the observed and `E` the expected number of point pairs.
    pub fn with_jackknife_regions(mut self, n: usize) -> Self {
        self.jackknife_regions = n;
        self
    }

    /// Evaluate every pixel bin in `bins`, level by level.
    pub fn evaluate(
        &self,
        catalog: &[AngularPoint],
        bins: &ScaleBinSet,
    ) -> Result<Vec<BinResult>, Error> {
        let mut results = Vec::new();
        for level in bins.pixel_levels() {
            let indices = bins.pixel_bins_at(level);
            let map = DensityMap::build(self.mask, catalog, level, self.execution.parallel)?;
            debug!(
                level,
                n_cells = map.cells().len(),
                total_weight = map.total_weight(),
                n_bins = indices.len(),
                "evaluating pixel bins"
            );
            results.extend(self.evaluate_level(&map, bins, &indices)?);
        }
        Ok(results)
    }

    /// Evaluate the bins listed in `indices` (ascending) with an
    /// already-built density map.
    ///
    /// The reduction spans every bin from the first to the last listed
    /// index. Results are only reported for the listed bins.
    ///
    /// The value is the full-map estimate and the error is the delete-one
    /// jackknife error over the map's regions.
    pub fn evaluate_level(
        &self,
        map: &DensityMap,
        bins: &ScaleBinSet,
        indices: &[usize],
    ) -> Result<Vec<BinResult>, Error> {
        let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
            return Ok(Vec::new());
        };
        let span = &bins.bins()[first..=last];

        let mut theta_edges: Vec<f64> = span.iter().map(|b| b.theta_lo()).collect();
        theta_edges.push(span[span.len() - 1].theta_hi());
        let chord_edges: Vec<f64> = theta_edges
            .iter()
            .map(|t| squared_chord_for_angle(t.to_radians()))
            .collect();
        let search_radius = theta_edges[theta_edges.len() - 1].to_radians();

        let regions = JackknifeRegions::new(map, self.jackknife_regions);
        let spec = CellPairSpec {
            map,
            regions: &regions,
            edges: IrregularBinEdges::new(&chord_edges).map_err(Error::internal)?,
            search_radius,
            reducer: Mean,
        };
        let statepack = self.execution.reduce(&spec)?;
        let output = get_output(&spec.reducer, &StatePackView::from_array_view(statepack.view()));
        let (means, weights) = match (output.get("mean"), output.get("weight")) {
            (Some(m), Some(w)) => (m, w),
            _ => return Err(Error::internal("unexpected output from the Mean reducer")),
        };

        // converts sums over (normalized) cell pairs into point pair counts
        let pair_scale = {
            let per_cell = map.mean_density * cell_area(map.level);
            per_cell * per_cell
        };

        let n_bins = span.len();
        Ok(indices
            .iter()
            .map(|&index| {
                let i = index - first;
                let expected_pairs = weights[i] * pair_scale;
                let observed_pairs = means[i] * expected_pairs;
                let estimate = if expected_pairs > 0.0 {
                    let touching = (1..=regions.len())
                        .map(|g| (means[g * n_bins + i], weights[g * n_bins + i]));
                    let error = jackknife_error(map, &regions, means[i], weights[i], touching)
                        .unwrap_or_else(|| observed_pairs.max(0.0).sqrt() / expected_pairs);
                    BinEstimate {
                        value: means[i] - 1.0,
                        error,
                    }
                } else {
                    BinEstimate::undefined()
                };
                BinResult {
                    index,
                    counts: BinCounts::Pixel {
                        observed_pairs: if expected_pairs > 0.0 { observed_pairs } else { 0.0 },
                        expected_pairs,
                    },
                    estimate,
                }
            })
            .collect())
    }
}

/// The delete-one jackknife error of a bin, given its full-map `(mean,
/// weight)` and the `(mean, weight)` of the pairs touching each region.
///
/// Dropping a region also drops its points from the mean density, so each
/// estimate is rescaled by `(n̄ / n̄ᵣ)²`. Returns `None` when fewer than 2
/// regions leave any pairs behind.
fn jackknife_error(
    map: &DensityMap,
    regions: &JackknifeRegions,
    mean: f64,
    weight: f64,
    touching: impl Iterator<Item = (f64, f64)>,
) -> Option<f64> {
    let total = mean * weight;
    let estimates: Vec<f64> = touching
        .enumerate()
        .filter_map(|(r, (mean_r, weight_r))| {
            let (total_r, weight_r) = if weight_r > 0.0 {
                (mean_r * weight_r, weight_r)
            } else {
                (0.0, 0.0)
            };
            let weight_rest = weight - weight_r;
            let points_rest = map.total_weight - regions.weight[r];
            let area_rest = map.covered_area - regions.area[r];
            if weight_rest <= 1e-9 * weight || points_rest <= 0.0 || area_rest <= 0.0 {
                return None;
            }
            let density_ratio = map.mean_density * area_rest / points_rest;
            Some((total - total_r) / weight_rest * density_ratio * density_ratio - 1.0)
        })
        .collect();

    let n = estimates.len();
    if n < 2 {
        return None;
    }
    let n = n as f64;
    let center = estimates.iter().sum::<f64>() / n;
    let spread: f64 = estimates.iter().map(|e| (e - center) * (e - center)).sum();
    Some(((n - 1.0) / n * spread).sqrt())
}
