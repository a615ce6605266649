//! Command-line driver: measures w(θ) for a catalog within a footprint and
//! writes the result to `Wtheta_<tag>`.

use std::path::PathBuf;

use angcorr::{
    CatalogFileFormat, CoordinateSystem, CorrelationEngine, EngineConfig, FootprintMask,
    MaskFileFormat, RegimePolicy, ResultFormat, ScaleBinSet, io,
};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MaskLayout {
    /// `level ordinal [coverage]`
    Cells,
    /// `ra_min ra_max dec_min dec_max level [coverage]`
    Rectangles,
}

#[derive(Parser, Debug)]
#[command(name = "angcorr")]
#[command(about = "Measure the angular autocorrelation of a catalog within a footprint")]
#[command(version)]
struct Cli {
    /// The footprint mask
    #[arg(long)]
    map_file: PathBuf,

    /// Layout of the records in the mask file
    #[arg(long, value_enum, default_value = "cells")]
    map_format: MaskLayout,

    /// The catalog (`ra dec [weight] [aux]` or `lambda eta [weight] [aux]`
    /// per line)
    #[arg(long)]
    galaxy_file: PathBuf,

    /// Catalog coordinates are survey (lambda, eta) rather than RA/Dec
    #[arg(long)]
    survey_coords: bool,

    /// Evaluate every bin by counting pairs
    #[arg(long)]
    use_only_pairs: bool,

    /// Results are written to Wtheta_<OUTPUT_TAG>
    #[arg(long, default_value = "test")]
    output_tag: String,

    /// Minimum angular scale (degrees)
    #[arg(long, default_value = "0.001")]
    theta_min: f64,

    /// Maximum angular scale (degrees)
    #[arg(long, default_value = "1.0")]
    theta_max: f64,

    #[arg(long, default_value = "5")]
    n_bins_per_decade: u32,

    /// Number of random points drawn per catalog point
    #[arg(long, default_value = "1")]
    n_random: u32,

    /// Ignore the catalog's weight column
    #[arg(long)]
    no_weight: bool,

    /// Fix the maximum resolution of the pixel estimator instead of deriving
    /// it from the catalog density
    #[arg(long)]
    maximum_resolution: Option<u8>,

    /// Keep catalog points where the mask coverage exceeds this value
    #[arg(long)]
    acceptance_threshold: Option<f64>,

    /// JSON file holding an engine configuration (flags take precedence)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => io::read_engine_config(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threshold) = cli.acceptance_threshold {
        config.acceptance_threshold = threshold;
    }
    let engine = CorrelationEngine::new(config)?;

    let map_format = match cli.map_format {
        MaskLayout::Cells => MaskFileFormat::Cells,
        MaskLayout::Rectangles => MaskFileFormat::Rectangles,
    };
    let description = io::read_mask_description(&cli.map_file, map_format)?;
    let mask = FootprintMask::build(&description)
        .with_context(|| format!("building the mask from {}", cli.map_file.display()))?;
    info!(
        path = %cli.map_file.display(),
        area_sq_deg = mask.area_sq_deg(),
        n_cells = mask.n_cells(),
        "read map"
    );

    let catalog_format = CatalogFileFormat {
        system: if cli.survey_coords {
            CoordinateSystem::Survey
        } else {
            CoordinateSystem::Equatorial
        },
        use_weights: !cli.no_weight,
    };
    let catalog = io::read_catalog(&cli.galaxy_file, catalog_format)?;
    info!(
        path = %cli.galaxy_file.display(),
        n_points = catalog.len(),
        "read catalog"
    );

    let bins = ScaleBinSet::new(cli.theta_min, cli.theta_max, cli.n_bins_per_decade)?;
    let policy = if cli.use_only_pairs {
        RegimePolicy::UseOnlyPairs
    } else if let Some(level) = cli.maximum_resolution {
        RegimePolicy::SetMaxResolution(level)
    } else {
        engine.auto_policy(&mask, &catalog)
    };

    let bins = engine
        .run(&mask, &catalog, bins, &policy, cli.n_random)
        .context("measuring w(theta)")?;

    let output = PathBuf::from(format!("Wtheta_{}", cli.output_tag));
    let format = if cli.json {
        ResultFormat::Json
    } else {
        ResultFormat::Ascii
    };
    io::write_results(&output, &bins, format)?;
    info!(path = %output.display(), "wrote w(theta)");
    Ok(())
}
