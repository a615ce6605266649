/*!
Measures the angular two-point autocorrelation function, w(θ), of a catalog
of points on the celestial sphere that was observed over an irregular survey
footprint.

# High-Level: Two Estimators, One Set of Bins

w(θ) describes the excess probability (over a uniform distribution) of
finding two catalog points separated by an angle θ. Measuring it over a
wide range of angular scales is awkward for a single estimator:

- On small scales we directly count pairs of points. Data-data (DD),
  data-random (DR) and random-random (RR) pair counts are combined with the
  Landy–Szalay estimator, `(DD − 2·DR + RR) / RR`. The random catalog traces
  the footprint, so the estimator automatically accounts for the mask.
- On large scales, pair counting becomes prohibitively expensive. Instead,
  we bin the catalog into a density map on an equal-area pixelization of
  the sphere and correlate the density contrast of pairs of cells.

Every [`AngularBin`] of a [`ScaleBinSet`] is tagged with exactly one
[`Regime`] (see [`RegimePolicy`]) and is evaluated by exactly one estimator.
[`CorrelationEngine::run`] drives the whole calculation.

# User Guide

```no_run
use angcorr::{
    CatalogFileFormat, CorrelationEngine, EngineConfig, FootprintMask, MaskFileFormat,
    ResultFormat, ScaleBinSet, io,
};
use std::path::Path;

# fn main() -> Result<(), angcorr::Error> {
let description = io::read_mask_description(Path::new("mask.txt"), MaskFileFormat::Cells)?;
let mask = FootprintMask::build(&description)?;
let catalog = io::read_catalog(Path::new("galaxies.txt"), CatalogFileFormat::default())?;

let engine = CorrelationEngine::new(EngineConfig::default())?;
let policy = engine.auto_policy(&mask, &catalog);
let bins = ScaleBinSet::new(0.001, 10.0, 6)?;
let bins = engine.run(&mask, &catalog, bins, &policy, 1)?;
io::write_results(Path::new("Wtheta_example"), &bins, ResultFormat::Ascii)?;
# Ok(())
# }
```

# Developer Guide

Both estimators phrase their work as a binned reduction (a
[`ReductionSpec`]) that is driven by an [`Executor`]. See the crate-level
documentation for [`angcorr_nostd_internal`] for a description of that
machinery.

*/

#![deny(rustdoc::broken_intra_doc_links)]

// inform build-system of the crates in this package
mod coords;
mod engine;
mod error;
pub mod io;
mod mask;
mod pair_estimator;
mod parallel_rayon;
mod parallel_serial;
mod pixel_estimator;
mod reducers;
mod sampler;
mod scale_bins;
mod sphere_index;

// pull in symbols that visible outside of the package
pub use angcorr_nostd_internal::{
    BinEdges, Executor, IrregularBinEdges, Mean, OutputDescr, Reducer, ReductionSpec,
    StatePackViewMut, WeightedCount,
};
pub use coords::{AngularPoint, CoordinateSystem, UnitVector, squared_chord_for_angle};
pub use engine::{CorrelationEngine, EngineConfig};
pub use error::{Error, ErrorKind};
pub use io::{CatalogFileFormat, MaskFileFormat, ResultFormat};
pub use mask::{FootprintMask, MaskDescription, MaskRecord, MaskRegion, RaDecBox, WeightedCell};
pub use pair_estimator::{PairCounts, PairEstimator, PointSet, landy_szalay};
pub use parallel_rayon::RayonExecutor;
pub use parallel_serial::SerialExecutor;
pub use pixel_estimator::{BinResult, DensityMap, PixelEstimator};
pub use reducers::{Execution, get_output};
pub use sampler::RandomSampler;
pub use scale_bins::{
    AngularBin, BinCounts, BinEstimate, Regime, RegimePolicy, RegimeSettings, ScaleBinSet,
};
pub use sphere_index::{
    CapBound, CellBounds, MAX_LEVEL, SPHERE_AREA, SphereCell, SphereIndex, cell_area, cell_scale,
    n_cells_at,
};
