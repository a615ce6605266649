//! Orchestrates a full w(θ) measurement.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coords::AngularPoint;
use crate::error::Error;
use crate::mask::FootprintMask;
use crate::pair_estimator::PairEstimator;
use crate::pixel_estimator::{BinResult, PixelEstimator};
use crate::reducers::Execution;
use crate::scale_bins::{RegimePolicy, RegimeSettings, ScaleBinSet};
use crate::sphere_index::{MAX_LEVEL, SphereIndex};

/// Every policy value consulted during a run.
///
/// Missing fields take their default values when deserializing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Catalog points are kept when the mask coverage at their position
    /// exceeds this value
    pub acceptance_threshold: f64,
    /// The smallest mean number of points per cell accepted when the
    /// maximum resolution is chosen automatically
    pub min_occupancy: f64,
    /// The cell scale used for a pixel bin, as a fraction of the width of a
    /// full log-spaced bin at the same θ
    pub pixel_scale_fraction: f64,
    /// The smallest number of jackknife regions behind a pixel bin's error
    pub jackknife_regions: u32,
    /// coarsest level the run may use
    pub min_level: u8,
    /// finest level the run may use
    pub max_level: u8,
    /// The number of teams each reduction is split into
    pub n_teams: u32,
    /// Run reductions (and the 2 regimes) on rayon's thread pool
    pub parallel: bool,
    /// Seed for the random catalog. A fresh seed is drawn when absent.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            acceptance_threshold: 0.2,
            min_occupancy: 1.0,
            pixel_scale_fraction: 0.5,
            jackknife_regions: PixelEstimator::DEFAULT_JACKKNIFE_REGIONS as u32,
            min_level: 0,
            max_level: MAX_LEVEL,
            n_teams: 32,
            parallel: true,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.acceptance_threshold.is_finite()
            && (0.0..1.0).contains(&self.acceptance_threshold))
        {
            return Err(Error::invalid_config(
                "acceptance_threshold",
                format!("must lie in [0, 1) (got {})", self.acceptance_threshold),
            ));
        }
        if !(self.min_occupancy.is_finite() && self.min_occupancy > 0.0) {
            return Err(Error::invalid_config(
                "min_occupancy",
                format!("must be positive (got {})", self.min_occupancy),
            ));
        }
        if !(self.pixel_scale_fraction.is_finite() && self.pixel_scale_fraction > 0.0) {
            return Err(Error::invalid_config(
                "pixel_scale_fraction",
                format!("must be positive (got {})", self.pixel_scale_fraction),
            ));
        }
        if self.jackknife_regions < 2 {
            return Err(Error::invalid_config(
                "jackknife_regions",
                format!("at least 2 regions are required (got {})", self.jackknife_regions),
            ));
        }
        if self.max_level > MAX_LEVEL || self.min_level > self.max_level {
            return Err(Error::invalid_config(
                "max_level",
                format!(
                    "need min_level <= max_level <= {MAX_LEVEL} (got {}, {})",
                    self.min_level, self.max_level
                ),
            ));
        }
        if self.n_teams == 0 {
            return Err(Error::invalid_config("n_teams", "at least 1 team is required"));
        }
        Ok(())
    }
}

/// Drives the pixel & pair estimators over a [`ScaleBinSet`].
#[derive(Clone, Debug)]
pub struct CorrelationEngine {
    config: EngineConfig,
    index: SphereIndex,
    execution: Execution,
}

impl CorrelationEngine {
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        let index = SphereIndex::new(config.min_level, config.max_level)?;
        let n_teams = NonZeroU32::new(config.n_teams)
            .ok_or_else(|| Error::invalid_config("n_teams", "at least 1 team is required"))?;
        let execution = Execution {
            n_teams,
            parallel: config.parallel,
        };
        Ok(CorrelationEngine {
            config,
            index,
            execution,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &SphereIndex {
        &self.index
    }

    fn regime_settings(&self) -> RegimeSettings {
        RegimeSettings {
            index: self.index,
            min_occupancy: self.config.min_occupancy,
            pixel_scale_fraction: self.config.pixel_scale_fraction,
        }
    }

    /// The [`RegimePolicy::AutoMaxResolution`] policy implied by the points
    /// of `catalog` that survive masking.
    pub fn auto_policy(&self, mask: &FootprintMask, catalog: &[AngularPoint]) -> RegimePolicy {
        let threshold = self.config.acceptance_threshold;
        let n_points = catalog
            .iter()
            .filter(|p| mask.contains(p, threshold).0)
            .count();
        RegimePolicy::AutoMaxResolution {
            n_points,
            mask_area: mask.area(),
        }
    }

    /// Measure w(θ) for `catalog` within `mask`.
    ///
    /// The catalog is filtered through the mask, every bin is tagged with a
    /// regime according to `policy`, each regime is evaluated by its
    /// estimator (concurrently, when the engine is configured to run in
    /// parallel) and the finalized bins are returned. Nothing is returned
    /// unless every bin was evaluated.
    pub fn run(
        &self,
        mask: &FootprintMask,
        catalog: &[AngularPoint],
        mut bins: ScaleBinSet,
        policy: &RegimePolicy,
        random_ratio: u32,
    ) -> Result<ScaleBinSet, Error> {
        if random_ratio < 1 {
            return Err(Error::invalid_random_ratio(random_ratio as i64));
        }

        let kept = mask.filter_points(catalog, self.config.acceptance_threshold);
        info!(
            n_read = catalog.len(),
            n_kept = kept.len(),
            area_sq_deg = mask.area_sq_deg(),
            "filtered catalog through the mask"
        );
        if kept.is_empty() {
            return Err(Error::empty_catalog(catalog.len()));
        }

        bins.assign_regimes(policy, &self.regime_settings())?;
        info!(
            max_resolution = ?bins.max_resolution(),
            min_resolution = ?bins.min_resolution(),
            n_pixel_bins = bins.len() - bins.pair_bins().len(),
            n_pair_bins = bins.pair_bins().len(),
            "assigned estimator regimes"
        );
        for bin in bins.iter() {
            debug!(
                theta_lo = bin.theta_lo(),
                theta_hi = bin.theta_hi(),
                regime = ?bin.regime(),
                "bin regime"
            );
        }

        let pixel = PixelEstimator::new(mask, self.execution)
            .with_jackknife_regions(self.config.jackknife_regions as usize);
        let pair = PairEstimator::new(mask, self.index, self.execution, self.config.seed);
        let (pixel_results, pair_results) = if self.config.parallel {
            rayon::join(
                || pixel.evaluate(&kept, &bins),
                || pair.evaluate(&kept, &bins, random_ratio),
            )
        } else {
            (
                pixel.evaluate(&kept, &bins),
                pair.evaluate(&kept, &bins, random_ratio),
            )
        };

        let results: Vec<BinResult> = pixel_results?
            .into_iter()
            .chain(pair_results?)
            .collect();
        for result in results {
            bins.record(result.index, result.counts, result.estimate);
        }
        bins.finalize()?;

        for bin in bins.iter() {
            info!(
                theta = bin.theta_center(),
                w = bin.value(),
                error = bin.error(),
                regime = bin.regime().map_or("none", |r| r.name()),
                "w(theta)"
            );
        }
        Ok(bins)
    }
}
