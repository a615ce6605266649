//! Log-spaced angular bins and their assignment to an estimator regime.

use crate::error::Error;
use crate::sphere_index::{SphereIndex, cell_area};
use serde::Serialize;

/// Which estimator evaluates a bin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "regime", rename_all = "lowercase")]
pub enum Regime {
    /// Evaluated from a density map at the given resolution level
    Pixel { level: u8 },
    /// Evaluated by counting pairs out to `search_radius` (degrees)
    Pair { search_radius: f64 },
}

impl Regime {
    pub fn is_pixel(&self) -> bool {
        matches!(self, Regime::Pixel { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Regime::Pixel { .. } => "pixel",
            Regime::Pair { .. } => "pair",
        }
    }
}

/// The raw accumulated quantities behind a bin's correlation value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BinCounts {
    Pixel {
        /// Observed (weighted) number of point pairs implied by the map
        observed_pairs: f64,
        /// Expected number of point pairs for a uniform density
        expected_pairs: f64,
    },
    Pair {
        /// normalized data-data count
        dd: f64,
        /// normalized data-random count
        dr: f64,
        /// normalized random-random count
        rr: f64,
        /// raw (unweighted) data-data pair count
        n_dd: u64,
    },
}

/// A correlation value and its counting-based uncertainty.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BinEstimate {
    pub value: f64,
    pub error: f64,
}

impl BinEstimate {
    /// What a bin reports when its normalization is zero
    pub fn undefined() -> Self {
        BinEstimate {
            value: 0.0,
            error: f64::INFINITY,
        }
    }
}

/// A single half-open angular interval `[θ_lo, θ_hi)` (degrees).
#[derive(Clone, Debug, PartialEq)]
pub struct AngularBin {
    theta_lo: f64,
    theta_hi: f64,
    regime: Option<Regime>,
    counts: Option<BinCounts>,
    estimate: Option<BinEstimate>,
}

impl AngularBin {
    fn new(theta_lo: f64, theta_hi: f64) -> Self {
        AngularBin {
            theta_lo,
            theta_hi,
            regime: None,
            counts: None,
            estimate: None,
        }
    }

    pub fn theta_lo(&self) -> f64 {
        self.theta_lo
    }

    pub fn theta_hi(&self) -> f64 {
        self.theta_hi
    }

    /// the logarithmic midpoint
    pub fn theta_center(&self) -> f64 {
        (self.theta_lo * self.theta_hi).sqrt()
    }

    pub fn regime(&self) -> Option<Regime> {
        self.regime
    }

    pub fn counts(&self) -> Option<&BinCounts> {
        self.counts.as_ref()
    }

    pub fn estimate(&self) -> Option<BinEstimate> {
        self.estimate
    }

    /// `NaN` until the bin has been evaluated
    pub fn value(&self) -> f64 {
        self.estimate.map_or(f64::NAN, |e| e.value)
    }

    /// `NaN` until the bin has been evaluated
    pub fn error(&self) -> f64 {
        self.estimate.map_or(f64::NAN, |e| e.error)
    }
}

/// Selects the maximum resolution used by the pixel estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegimePolicy {
    /// Every bin is evaluated by counting pairs
    UseOnlyPairs,
    /// Choose the maximum resolution from the mean density of the catalog.
    /// `mask_area` is in steradians.
    AutoMaxResolution { n_points: usize, mask_area: f64 },
    /// Use the given maximum resolution
    SetMaxResolution(u8),
}

/// The tunables consulted while assigning regimes.
#[derive(Clone, Copy, Debug)]
pub struct RegimeSettings {
    pub index: SphereIndex,
    /// The smallest acceptable mean number of points per cell
    pub min_occupancy: f64,
    /// A bin's natural cell scale, as a fraction of the width of a full
    /// log-spaced bin at the same θ
    pub pixel_scale_fraction: f64,
}

impl RegimeSettings {
    /// The finest level whose mean occupancy is at least `min_occupancy`
    pub fn auto_resolution(&self, n_points: usize, mask_area: f64) -> Result<Option<u8>, Error> {
        if !(mask_area.is_finite() && mask_area > 0.0) {
            return Err(Error::invalid_range(
                "mask_area",
                format!("must be positive & finite (got {mask_area})"),
            ));
        }
        let density = n_points as f64 / mask_area;
        Ok((self.index.min_level()..=self.index.max_level())
            .rev()
            .find(|&level| density * cell_area(level) >= self.min_occupancy))
    }

    /// The level whose cell scale matches the width of a full log-spaced bin
    /// starting at `theta_lo` (degrees).
    ///
    /// The width comes from `theta_lo` and the spacing rather than from the
    /// bin's own upper edge, so a clamped final bin maps to the same level as
    /// a full one. The level never gets finer as `theta_lo` grows.
    pub fn natural_level(&self, theta_lo: f64, bins_per_decade: u32) -> u8 {
        let ratio = 10.0_f64.powf(1.0 / bins_per_decade as f64);
        let width = (theta_lo * (ratio - 1.0)).to_radians();
        self.index.level_for_scale(self.pixel_scale_fraction * width)
    }
}

/// An ordered collection of log-spaced [`AngularBin`]s.
///
/// Bins are created unassigned. Regimes are assigned once, the estimators
/// fill in their bins, and the set becomes read-only once the engine
/// finalizes it.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleBinSet {
    bins: Vec<AngularBin>,
    bins_per_decade: u32,
    max_resolution: Option<u8>,
    finalized: bool,
}

impl ScaleBinSet {
    /// Build bins spanning `[theta_min, theta_max]` (degrees), evenly spaced
    /// in `log10(θ)`. The final edge is clamped to `theta_max` when the range
    /// isn't a whole number of bins.
    pub fn new(theta_min: f64, theta_max: f64, bins_per_decade: u32) -> Result<Self, Error> {
        if !(theta_min.is_finite() && theta_max.is_finite()) {
            return Err(Error::invalid_range("theta", "angular limits must be finite"));
        } else if theta_min <= 0.0 || theta_max <= 0.0 {
            return Err(Error::invalid_range(
                "theta",
                format!("angular limits must be positive (got {theta_min}, {theta_max})"),
            ));
        } else if theta_min >= theta_max {
            return Err(Error::invalid_range(
                "theta",
                format!("theta_min ({theta_min}) must be smaller than theta_max ({theta_max})"),
            ));
        } else if theta_max > 180.0 {
            return Err(Error::invalid_range(
                "theta_max",
                format!("separations can't exceed 180 degrees (got {theta_max})"),
            ));
        } else if bins_per_decade == 0 {
            return Err(Error::invalid_range(
                "bins_per_decade",
                "at least 1 bin per decade is required",
            ));
        }

        let bpd = bins_per_decade as f64;
        let decades = (theta_max / theta_min).log10();
        let n_bins = ((decades * bpd - 1e-9).ceil() as usize).max(1);
        let mut edges: Vec<f64> = (0..n_bins)
            .map(|i| theta_min * 10.0_f64.powf(i as f64 / bpd))
            .collect();
        edges.retain(|&edge| edge < theta_max);
        edges.push(theta_max);

        let bins = edges.windows(2).map(|w| AngularBin::new(w[0], w[1])).collect();
        Ok(ScaleBinSet {
            bins,
            bins_per_decade,
            max_resolution: None,
            finalized: false,
        })
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[AngularBin] {
        &self.bins
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AngularBin> {
        self.bins.iter()
    }

    pub fn bins_per_decade(&self) -> u32 {
        self.bins_per_decade
    }

    pub fn theta_min(&self) -> f64 {
        self.bins[0].theta_lo
    }

    pub fn theta_max(&self) -> f64 {
        self.bins[self.bins.len() - 1].theta_hi
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The maximum resolution chosen during regime assignment (`None` when
    /// no bin uses the pixel estimator)
    pub fn max_resolution(&self) -> Option<u8> {
        self.max_resolution
    }

    /// The coarsest level used by a pixel bin
    pub fn min_resolution(&self) -> Option<u8> {
        self.pixel_levels().first().copied()
    }

    /// Distinct levels used by pixel bins, coarsest first
    pub fn pixel_levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self
            .bins
            .iter()
            .filter_map(|b| match b.regime {
                Some(Regime::Pixel { level }) => Some(level),
                _ => None,
            })
            .collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// Indices of the bins assigned to the pixel estimator at `level`
    pub fn pixel_bins_at(&self, level: u8) -> Vec<usize> {
        self.indices_where(|r| *r == Regime::Pixel { level })
    }

    /// Indices of the bins assigned to the pair estimator
    pub fn pair_bins(&self) -> Vec<usize> {
        self.indices_where(|r| !r.is_pixel())
    }

    fn indices_where(&self, f: impl Fn(&Regime) -> bool) -> Vec<usize> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(_, b)| b.regime.as_ref().is_some_and(&f))
            .map(|(i, _)| i)
            .collect()
    }

    /// Tag every bin with the regime that will evaluate it.
    ///
    /// Under [`RegimePolicy::AutoMaxResolution`] and
    /// [`RegimePolicy::SetMaxResolution`], a bin uses the pixel estimator at
    /// its natural level when that level is no finer than the maximum
    /// resolution. Every other bin uses the pair estimator. Natural levels
    /// only get coarser with θ, so the pair bins always precede the pixel
    /// bins.
    pub fn assign_regimes(
        &mut self,
        policy: &RegimePolicy,
        settings: &RegimeSettings,
    ) -> Result<(), Error> {
        if self.finalized {
            return Err(Error::invalid_config(
                "bins",
                "regimes can't be reassigned after results are finalized",
            ));
        }
        let max_resolution = match *policy {
            RegimePolicy::UseOnlyPairs => None,
            RegimePolicy::AutoMaxResolution {
                n_points,
                mask_area,
            } => settings.auto_resolution(n_points, mask_area)?,
            RegimePolicy::SetMaxResolution(level) => {
                let index = &settings.index;
                if level < index.min_level() || level > index.max_level() {
                    return Err(Error::invalid_level(
                        level as i32,
                        index.min_level(),
                        index.max_level(),
                    ));
                }
                Some(level)
            }
        };

        for bin in self.bins.iter_mut() {
            let natural = settings.natural_level(bin.theta_lo, self.bins_per_decade);
            bin.regime = Some(match max_resolution {
                Some(r) if natural <= r => Regime::Pixel { level: natural },
                _ => Regime::Pair {
                    search_radius: bin.theta_hi,
                },
            });
            bin.counts = None;
            bin.estimate = None;
        }
        let any_pixel = self
            .bins
            .iter()
            .any(|b| b.regime.is_some_and(|r| r.is_pixel()));
        self.max_resolution = max_resolution.filter(|_| any_pixel);
        Ok(())
    }

    pub(crate) fn record(&mut self, index: usize, counts: BinCounts, estimate: BinEstimate) {
        let bin = &mut self.bins[index];
        bin.counts = Some(counts);
        bin.estimate = Some(estimate);
    }

    /// Make the set read-only. Fails if any bin lacks a result.
    pub(crate) fn finalize(&mut self) -> Result<(), Error> {
        if let Some(index) = self.bins.iter().position(|b| b.estimate.is_none()) {
            let bin = &self.bins[index];
            return Err(Error::unevaluated_bin(index, bin.theta_lo, bin.theta_hi));
        }
        self.finalized = true;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ScaleBinSet {
    type Item = &'a AngularBin;
    type IntoIter = std::slice::Iter<'a, AngularBin>;

    fn into_iter(self) -> Self::IntoIter {
        self.bins.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sphere_index::SPHERE_AREA;

    fn settings() -> RegimeSettings {
        RegimeSettings {
            index: SphereIndex::default(),
            min_occupancy: 1.0,
            pixel_scale_fraction: 0.5,
        }
    }

    #[test]
    fn log_spacing() {
        let bins = ScaleBinSet::new(0.001, 1.0, 5).unwrap();
        assert_eq!(bins.len(), 15);
        assert_eq!(bins.theta_min(), 0.001);
        assert_eq!(bins.theta_max(), 1.0);
        for pair in bins.bins().windows(2) {
            assert_eq!(pair[0].theta_hi(), pair[1].theta_lo());
            let ratio = pair[1].theta_lo() / pair[0].theta_lo();
            assert!((ratio - 10.0_f64.powf(0.2)).abs() < 1e-12);
        }
        let b = &bins.bins()[0];
        assert!((b.theta_center() - (b.theta_lo() * b.theta_hi()).sqrt()).abs() < 1e-18);
        assert!(b.value().is_nan());
    }

    #[test]
    fn partial_decade_is_clamped() {
        let bins = ScaleBinSet::new(1.0, 15.0, 3).unwrap();
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.theta_max(), 15.0);
        assert!(bins.bins().iter().all(|b| b.theta_lo() < b.theta_hi()));
    }

    #[test]
    fn invalid_ranges() {
        assert!(ScaleBinSet::new(1.0, 1.0, 4).is_err());
        assert!(ScaleBinSet::new(2.0, 1.0, 4).is_err());
        assert!(ScaleBinSet::new(0.0, 1.0, 4).is_err());
        assert!(ScaleBinSet::new(-1.0, 1.0, 4).is_err());
        assert!(ScaleBinSet::new(1.0, 200.0, 4).is_err());
        assert!(ScaleBinSet::new(1.0, 10.0, 0).is_err());
    }

    #[test]
    fn only_pairs() {
        let mut bins = ScaleBinSet::new(0.01, 10.0, 4).unwrap();
        bins.assign_regimes(&RegimePolicy::UseOnlyPairs, &settings())
            .unwrap();
        assert!(bins.iter().all(|b| !b.regime().unwrap().is_pixel()));
        assert_eq!(bins.max_resolution(), None);
        assert_eq!(bins.min_resolution(), None);
        assert_eq!(bins.pair_bins().len(), bins.len());
    }

    #[test]
    fn auto_resolution_split() {
        let mut bins = ScaleBinSet::new(1.0, 10.0, 3).unwrap();
        let policy = RegimePolicy::AutoMaxResolution {
            n_points: 20000,
            mask_area: SPHERE_AREA,
        };
        bins.assign_regimes(&policy, &settings()).unwrap();
        assert_eq!(bins.max_resolution(), Some(7));
        let regimes: Vec<_> = bins.iter().map(|b| b.regime().unwrap()).collect();
        assert_eq!(regimes[0], Regime::Pair { search_radius: bins.bins()[0].theta_hi() });
        assert!(!regimes[1].is_pixel());
        assert_eq!(regimes[2], Regime::Pixel { level: 7 });
        assert_eq!(bins.pixel_levels(), vec![7]);
        assert_eq!(bins.pixel_bins_at(7), vec![2]);
        assert_eq!(bins.pair_bins(), vec![0, 1]);
    }

    #[test]
    fn sparse_catalog_falls_back_to_pairs() {
        let mut bins = ScaleBinSet::new(1.0, 10.0, 3).unwrap();
        let policy = RegimePolicy::AutoMaxResolution {
            n_points: 0,
            mask_area: 0.1,
        };
        bins.assign_regimes(&policy, &settings()).unwrap();
        assert!(bins.iter().all(|b| !b.regime().unwrap().is_pixel()));

        let policy = RegimePolicy::AutoMaxResolution {
            n_points: 10,
            mask_area: -1.0,
        };
        assert!(bins.assign_regimes(&policy, &settings()).is_err());
    }

    #[test]
    fn clamped_last_bin_stays_with_its_neighbours() {
        // the final bin is [10, 10.01), far narrower than the others
        let mut bins = ScaleBinSet::new(1.0, 10.01, 5).unwrap();
        assert_eq!(bins.len(), 6);
        bins.assign_regimes(&RegimePolicy::SetMaxResolution(8), &settings())
            .unwrap();

        let last = bins.bins()[bins.len() - 1].regime().unwrap();
        let previous = bins.bins()[bins.len() - 2].regime().unwrap();
        match (previous, last) {
            (Regime::Pixel { level: a }, Regime::Pixel { level: b }) => assert!(b <= a),
            other => panic!("unexpected regimes: {other:?}"),
        }

        // pair bins form a prefix and pixel levels never get finer with θ
        let pair_bins = bins.pair_bins();
        assert_eq!(pair_bins, (0..pair_bins.len()).collect::<Vec<_>>());
        let levels: Vec<u8> = bins
            .iter()
            .filter_map(|b| match b.regime().unwrap() {
                Regime::Pixel { level } => Some(level),
                Regime::Pair { .. } => None,
            })
            .collect();
        assert!(levels.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn finalize_names_the_missing_bin() {
        let mut bins = ScaleBinSet::new(1.0, 100.0, 1).unwrap();
        bins.assign_regimes(&RegimePolicy::UseOnlyPairs, &settings())
            .unwrap();
        let estimate = BinEstimate {
            value: 0.0,
            error: 1.0,
        };
        let counts = BinCounts::Pair {
            dd: 1.0,
            dr: 1.0,
            rr: 1.0,
            n_dd: 1,
        };
        bins.record(0, counts, estimate);
        let err = bins.finalize().unwrap_err();
        match err.kind() {
            ErrorKind::UnevaluatedBin {
                index,
                theta_lo,
                theta_hi,
            } => {
                assert_eq!(*index, 1);
                assert!((theta_lo - 10.0).abs() < 1e-12);
                assert_eq!(*theta_hi, 100.0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("angular bin 1 "));
        assert!(!bins.is_finalized());

        bins.record(1, counts, estimate);
        bins.finalize().unwrap();
        assert!(bins.is_finalized());
    }

    #[test]
    fn fixed_resolution() {
        let mut bins = ScaleBinSet::new(0.1, 100.0, 2).unwrap();
        bins.assign_regimes(&RegimePolicy::SetMaxResolution(4), &settings())
            .unwrap();
        // pixel bins are the widest ones and their levels never exceed 4
        let mut seen_pair = false;
        for b in bins.iter().rev() {
            match b.regime().unwrap() {
                Regime::Pixel { level } => {
                    assert!(!seen_pair);
                    assert!(level <= 4);
                }
                Regime::Pair { .. } => seen_pair = true,
            }
        }
        assert!(bins.max_resolution().is_some());
        let restricted = RegimeSettings {
            index: SphereIndex::new(2, 12).unwrap(),
            ..settings()
        };
        assert!(
            bins.assign_regimes(&RegimePolicy::SetMaxResolution(13), &restricted)
                .is_err()
        );
    }
}
