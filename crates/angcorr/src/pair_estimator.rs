//! The pair-counting estimator used for the narrowest angular bins.
//!
//! Data and random points are bucketed by the cell that contains them at the
//! finest level whose cells are at least as large as the search radius. A
//! bucket only needs to be compared against the buckets returned by a cap
//! query of radius `bounding_radius + θ_max` around its center.
//!
//! Each of the DD, DR and RR counts is a binned reduction (one unit of work
//! per bucket of the first point set) that accumulates the product of the
//! point weights with [`WeightedCount`].

use std::ops::Range;

use angcorr_nostd_internal::{
    BinEdges, Datum, IrregularBinEdges, ReductionSpec, Reducer, StatePackView, StatePackViewMut,
    WeightedCount, squared_diff_norm,
};
use ndarray::Array2;
use tracing::debug;

use crate::coords::{AngularPoint, UnitVector, squared_chord_for_angle};
use crate::error::Error;
use crate::mask::FootprintMask;
use crate::pixel_estimator::BinResult;
use crate::reducers::{Execution, get_output};
use crate::sampler::RandomSampler;
use crate::scale_bins::{BinCounts, BinEstimate, ScaleBinSet};
use crate::sphere_index::{CapBound, SphereCell, SphereIndex, cover_with};

/// A collection of weighted unit vectors, stored with the vector components
/// along the slow axis (shape `(3, n_points)`).
#[derive(Clone, Debug)]
pub struct PointSet {
    positions: Array2<f64>,
    weights: Vec<f64>,
}

impl PointSet {
    pub fn from_points(points: &[AngularPoint]) -> Self {
        let positions = Array2::from_shape_fn((3, points.len()), |(k, i)| {
            let v = points[i].unit_vector();
            match k {
                0 => v.x(),
                1 => v.y(),
                _ => v.z(),
            }
        });
        PointSet {
            positions,
            weights: points.iter().map(|p| p.weight()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    fn sum_of_squared_weights(&self) -> f64 {
        self.weights.iter().map(|w| w * w).sum()
    }
}

/// A [`PointSet`] reordered so that the points of each cell are contiguous.
struct BucketedPoints {
    level: u8,
    positions: Array2<f64>,
    weights: Vec<f64>,
    // sorted by cell
    buckets: Vec<(SphereCell, Range<usize>)>,
}

impl BucketedPoints {
    fn new(points: &PointSet, level: u8) -> Self {
        let n = points.len();
        let cell_of = |i: usize| {
            let p = UnitVector::from_components(
                points.positions[[0, i]],
                points.positions[[1, i]],
                points.positions[[2, i]],
            );
            SphereCell::locate_unchecked(&p, level)
        };
        let mut keyed: Vec<(SphereCell, usize)> = (0..n).map(|i| (cell_of(i), i)).collect();
        // ties keep catalog order
        keyed.sort_by_key(|&(cell, i)| (cell, i));

        let positions =
            Array2::from_shape_fn((3, n), |(k, i)| points.positions[[k, keyed[i].1]]);
        let weights = keyed.iter().map(|&(_, i)| points.weights[i]).collect();

        let mut buckets: Vec<(SphereCell, Range<usize>)> = Vec::new();
        let mut start = 0;
        for group in keyed.chunk_by(|a, b| a.0 == b.0) {
            buckets.push((group[0].0, start..start + group.len()));
            start += group.len();
        }
        BucketedPoints {
            level,
            positions,
            weights,
            buckets,
        }
    }

    fn find_bucket(&self, cell: &SphereCell) -> Option<usize> {
        self.buckets.binary_search_by(|(c, _)| c.cmp(cell)).ok()
    }
}

/// Describes a binned pair count between 2 bucketed point sets (or between a
/// point set and itself, when `auto` is set).
struct PairCountSpec<'a> {
    first: &'a BucketedPoints,
    second: &'a BucketedPoints,
    auto: bool,
    // squared chord lengths
    edges: IrregularBinEdges<'a>,
    search_radius: f64,
    reducer: WeightedCount,
}

impl PairCountSpec<'_> {
    #[inline]
    fn consume_pair(&self, statepack: &mut StatePackViewMut, i: usize, j: usize) {
        let d2 = squared_diff_norm(
            self.first.positions.view(),
            self.second.positions.view(),
            i,
            j,
        );
        if let Some(bin_index) = self.edges.bin_index(d2) {
            let datum = Datum {
                value: 1.0,
                weight: self.first.weights[i] * self.second.weights[j],
            };
            self.reducer
                .consume(&mut statepack.get_state_mut(bin_index), &datum);
        }
    }
}

impl ReductionSpec for PairCountSpec<'_> {
    type ReducerType = WeightedCount;

    fn get_reducer(&self) -> &Self::ReducerType {
        &self.reducer
    }

    fn n_bins(&self) -> usize {
        self.edges.n_bins()
    }

    fn n_work_units(&self) -> usize {
        self.first.buckets.len()
    }

    fn add_contributions(&self, binned_statepack: &mut StatePackViewMut, work_unit: usize) {
        let (cell, range_a) = &self.first.buckets[work_unit];
        let bound = CapBound::new(cell.center(), cell.bounding_radius() + self.search_radius);
        for neighbor in cover_with(&bound, self.first.level) {
            let Some(b) = self.second.find_bucket(&neighbor) else {
                continue;
            };
            let range_b = self.second.buckets[b].1.clone();
            if self.auto && b < work_unit {
                // handled when b was the work unit
                continue;
            } else if self.auto && b == work_unit {
                for i in range_a.clone() {
                    for j in (i + 1)..range_a.end {
                        self.consume_pair(binned_statepack, i, j);
                    }
                }
            } else {
                for i in range_a.clone() {
                    for j in range_b.clone() {
                        self.consume_pair(binned_statepack, i, j);
                    }
                }
            }
        }
    }
}

/// Weighted pair counts for every bin of a single pair count.
#[derive(Clone, Debug, PartialEq)]
pub struct PairCounts {
    /// summed products of the point weights
    pub weight: Vec<f64>,
    /// summed squares of the products of the point weights
    pub weight_sq: Vec<f64>,
    /// number of pairs
    pub count: Vec<f64>,
    /// The weighted number of distinct pairs between the point sets
    pub normalization: f64,
}

impl PairCounts {
    /// the fraction of all weighted pairs that land in bin `i`
    pub fn normalized(&self, i: usize) -> f64 {
        if self.normalization > 0.0 {
            self.weight[i] / self.normalization
        } else {
            0.0
        }
    }

    /// Poisson variance of [`PairCounts::normalized`]
    pub fn variance(&self, i: usize) -> f64 {
        if self.normalization > 0.0 {
            self.weight_sq[i] / (self.normalization * self.normalization)
        } else {
            0.0
        }
    }
}

/// Combine normalized counts with the Landy–Szalay estimator,
/// `w = (dd - 2 dr + rr) / rr`.
///
/// The error propagates the Poisson variances of `dd` & `rr`. A bin with no
/// random pairs reports [`BinEstimate::undefined`].
pub fn landy_szalay(dd: f64, dr: f64, rr: f64, var_dd: f64, var_rr: f64) -> BinEstimate {
    if rr <= 0.0 {
        return BinEstimate::undefined();
    }
    let rr2 = rr * rr;
    let variance = var_dd / rr2 + dd * dd * var_rr / (rr2 * rr2);
    BinEstimate {
        value: (dd - 2.0 * dr + rr) / rr,
        error: variance.sqrt(),
    }
}

/// Evaluates the bins tagged [`Regime::Pair`](crate::Regime::Pair).
pub struct PairEstimator<'a> {
    mask: &'a FootprintMask,
    index: SphereIndex,
    execution: Execution,
    seed: Option<u64>,
}

impl<'a> PairEstimator<'a> {
    /// `seed` controls the random catalog (`None` draws a fresh seed)
    pub fn new(
        mask: &'a FootprintMask,
        index: SphereIndex,
        execution: Execution,
        seed: Option<u64>,
    ) -> Self {
        PairEstimator {
            mask,
            index,
            execution,
            seed,
        }
    }

    /// Count the weighted pairs between `first` and `second` (or the
    /// distinct pairs within `first` when `second` is `None`) in the bins
    /// delimited by `theta_edges` (degrees).
    pub fn count_pairs(
        &self,
        first: &PointSet,
        second: Option<&PointSet>,
        theta_edges: &[f64],
    ) -> Result<PairCounts, Error> {
        let chord_edges: Vec<f64> = theta_edges
            .iter()
            .map(|t| squared_chord_for_angle(t.to_radians()))
            .collect();
        let edges = IrregularBinEdges::new(&chord_edges).map_err(Error::internal)?;
        let search_radius = edges_upper_angle(theta_edges);
        let level = self.index.finest_level_at_least(search_radius);

        let first_buckets = BucketedPoints::new(first, level);
        let second_buckets = second.map(|s| BucketedPoints::new(s, level));
        let spec = PairCountSpec {
            first: &first_buckets,
            second: second_buckets.as_ref().unwrap_or(&first_buckets),
            auto: second.is_none(),
            edges,
            search_radius,
            reducer: WeightedCount,
        };
        let statepack = self.execution.reduce(&spec)?;
        let mut output =
            get_output(&spec.reducer, &StatePackView::from_array_view(statepack.view()));
        let mut take = |name: &str| {
            output
                .remove(name)
                .ok_or(Error::internal("unexpected output from the WeightedCount reducer"))
        };

        let normalization = match second {
            None => {
                let w = first.total_weight();
                0.5 * (w * w - first.sum_of_squared_weights())
            }
            Some(second) => first.total_weight() * second.total_weight(),
        };
        Ok(PairCounts {
            weight: take("weight")?,
            weight_sq: take("weight_sq")?,
            count: take("count")?,
            normalization,
        })
    }

    /// Evaluate every pair bin in `bins`, drawing `random_ratio` random
    /// points per catalog point.
    pub fn evaluate(
        &self,
        catalog: &[AngularPoint],
        bins: &ScaleBinSet,
        random_ratio: u32,
    ) -> Result<Vec<BinResult>, Error> {
        let indices = bins.pair_bins();
        let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
            return Ok(Vec::new());
        };
        let span = &bins.bins()[first..=last];
        let mut theta_edges: Vec<f64> = span.iter().map(|b| b.theta_lo()).collect();
        theta_edges.push(span[span.len() - 1].theta_hi());

        let n_random = catalog.len() * random_ratio as usize;
        let randoms = RandomSampler::new(self.mask, self.seed)?.sample(n_random);
        debug!(
            n_data = catalog.len(),
            n_random,
            bucket_level = self
                .index
                .finest_level_at_least(edges_upper_angle(&theta_edges)),
            "counting pairs"
        );

        let data = PointSet::from_points(catalog);
        let randoms = PointSet::from_points(&randoms);
        let dd = self.count_pairs(&data, None, &theta_edges)?;
        let dr = self.count_pairs(&data, Some(&randoms), &theta_edges)?;
        let rr = self.count_pairs(&randoms, None, &theta_edges)?;

        Ok(indices
            .iter()
            .map(|&index| {
                let i = index - first;
                let (dd_i, dr_i, rr_i) = (dd.normalized(i), dr.normalized(i), rr.normalized(i));
                BinResult {
                    index,
                    counts: BinCounts::Pair {
                        dd: dd_i,
                        dr: dr_i,
                        rr: rr_i,
                        n_dd: dd.count[i] as u64,
                    },
                    estimate: landy_szalay(dd_i, dr_i, rr_i, dd.variance(i), rr.variance(i)),
                }
            })
            .collect())
    }
}

fn edges_upper_angle(theta_edges: &[f64]) -> f64 {
    theta_edges.last().copied().unwrap_or(0.0).to_radians()
}
