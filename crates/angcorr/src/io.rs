//! Plain-text readers & writers for masks, catalogs and results.
//!
//! These sit at the boundary of a run: everything is read before the engine
//! starts and the results are written once it has finished.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::coords::{AngularPoint, CoordinateSystem};
use crate::engine::EngineConfig;
use crate::error::Error;
use crate::mask::{MaskDescription, MaskRecord, RaDecBox};
use crate::scale_bins::{BinCounts, Regime, ScaleBinSet};
use crate::sphere_index::SphereCell;

const AREA_KEY: &str = "area_sq_deg:";

/// The record layout of a mask file.
///
/// Blank lines & lines starting with `#` are ignored, except for a comment
/// of the form `# area_sq_deg: X`, which declares the footprint's area.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskFileFormat {
    /// `level ordinal [coverage]`
    Cells,
    /// `ra_min ra_max dec_min dec_max level [coverage]` (degrees)
    Rectangles,
}

/// How the columns of a catalog file are read.
///
/// Every line holds 2 angles in degrees, followed by an optional weight and
/// an optional auxiliary value. The angles are `ra dec` for equatorial
/// catalogs and `lambda eta` for survey catalogs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatalogFileFormat {
    pub system: CoordinateSystem,
    /// When `false`, the weight column is ignored and every point gets a
    /// weight of 1.
    pub use_weights: bool,
}

impl Default for CatalogFileFormat {
    fn default() -> Self {
        CatalogFileFormat {
            system: CoordinateSystem::Equatorial,
            use_weights: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultFormat {
    /// whitespace separated columns with a `#` header
    Ascii,
    Json,
}

fn open(path: &Path) -> Result<BufReader<File>, Error> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::io(path, e))
}

fn parse_field<T: std::str::FromStr>(
    token: Option<&str>,
    name: &str,
    path: &Path,
    line: usize,
) -> Result<T, Error> {
    let token = token.ok_or_else(|| Error::parse(path, line, format!("missing {name}")))?;
    token
        .parse::<T>()
        .map_err(|_| Error::parse(path, line, format!("can't parse {name} from \"{token}\"")))
}

fn parse_optional<T: std::str::FromStr>(
    token: Option<&str>,
    name: &str,
    path: &Path,
    line: usize,
) -> Result<Option<T>, Error> {
    match token {
        None => Ok(None),
        tok => parse_field(tok, name, path, line).map(Some),
    }
}

/// Read a mask description from `path`.
pub fn read_mask_description(path: &Path, format: MaskFileFormat) -> Result<MaskDescription, Error> {
    parse_mask_description(open(path)?, path, format)
}

fn parse_mask_description(
    reader: impl BufRead,
    path: &Path,
    format: MaskFileFormat,
) -> Result<MaskDescription, Error> {
    let mut description = MaskDescription::default();
    for (i, line) in reader.lines().enumerate() {
        let line_number = i + 1;
        let line = line.map_err(|e| Error::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(value) = comment.trim().strip_prefix(AREA_KEY) {
                let area = parse_field(Some(value.trim()), "declared area", path, line_number)?;
                description.declared_area_sq_deg = Some(area);
            }
            continue;
        }

        let mut tokens = line.split_whitespace();
        let record = match format {
            MaskFileFormat::Cells => {
                let level: u8 = parse_field(tokens.next(), "level", path, line_number)?;
                let ordinal: u64 = parse_field(tokens.next(), "ordinal", path, line_number)?;
                let coverage = parse_optional(tokens.next(), "coverage", path, line_number)?;
                let cell = SphereCell::new(level, ordinal)
                    .map_err(|e| Error::parse(path, line_number, e.to_string()))?;
                MaskRecord::cell(cell, coverage.unwrap_or(1.0))
            }
            MaskFileFormat::Rectangles => {
                let mut corners = [0.0; 4];
                for (corner, name) in corners
                    .iter_mut()
                    .zip(["ra_min", "ra_max", "dec_min", "dec_max"])
                {
                    *corner = parse_field(tokens.next(), name, path, line_number)?;
                }
                let level: u8 = parse_field(tokens.next(), "level", path, line_number)?;
                let coverage = parse_optional(tokens.next(), "coverage", path, line_number)?;
                let [ra_min, ra_max, dec_min, dec_max] = corners;
                let bounds = RaDecBox::new(ra_min, ra_max, dec_min, dec_max)
                    .map_err(|e| Error::parse(path, line_number, e.to_string()))?;
                MaskRecord::rectangle(bounds, level, coverage.unwrap_or(1.0))
            }
        };
        if tokens.next().is_some() {
            return Err(Error::parse(path, line_number, "unexpected trailing column"));
        }
        description.records.push(record);
    }
    Ok(description)
}

/// Read every point listed in the catalog at `path`.
pub fn read_catalog(path: &Path, format: CatalogFileFormat) -> Result<Vec<AngularPoint>, Error> {
    parse_catalog(open(path)?, path, format)
}

fn parse_catalog(
    reader: impl BufRead,
    path: &Path,
    format: CatalogFileFormat,
) -> Result<Vec<AngularPoint>, Error> {
    let mut points = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line_number = i + 1;
        let line = line.map_err(|e| Error::io(path, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let first: f64 = parse_field(tokens.next(), "first coordinate", path, line_number)?;
        let second: f64 = parse_field(tokens.next(), "second coordinate", path, line_number)?;
        let weight: Option<f64> = parse_optional(tokens.next(), "weight", path, line_number)?;
        let aux: Option<f64> = parse_optional(tokens.next(), "auxiliary value", path, line_number)?;

        let mut point = AngularPoint::new(first, second, format.system)
            .map_err(|e| Error::parse(path, line_number, e.to_string()))?;
        if let (true, Some(weight)) = (format.use_weights, weight) {
            point = point
                .with_weight(weight)
                .map_err(|e| Error::parse(path, line_number, e.to_string()))?;
        }
        if let Some(aux) = aux {
            point = point.with_aux(aux);
        }
        points.push(point);
    }
    Ok(points)
}

/// Read an [`EngineConfig`] from a JSON file.
pub fn read_engine_config(path: &Path) -> Result<EngineConfig, Error> {
    serde_json::from_reader(open(path)?).map_err(|e| Error::parse(path, e.line(), e.to_string()))
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    theta_lo: f64,
    theta_hi: f64,
    theta_mid: f64,
    w: f64,
    error: f64,
    regime: Option<Regime>,
    counts: Option<&'a BinCounts>,
}

/// Write one record per bin of `bins` to `path`.
pub fn write_results(path: &Path, bins: &ScaleBinSet, format: ResultFormat) -> Result<(), Error> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::new(file);
    format_results(&mut out, bins, format)
        .and_then(|()| out.flush())
        .map_err(|e| Error::io(path, e))
}

fn format_results(
    out: &mut impl Write,
    bins: &ScaleBinSet,
    format: ResultFormat,
) -> std::io::Result<()> {
    match format {
        ResultFormat::Ascii => {
            writeln!(out, "# theta_lo theta_hi theta_mid w error regime")?;
            for bin in bins {
                writeln!(
                    out,
                    "{:.8e} {:.8e} {:.8e} {:.8e} {:.8e} {}",
                    bin.theta_lo(),
                    bin.theta_hi(),
                    bin.theta_center(),
                    bin.value(),
                    bin.error(),
                    bin.regime().map_or("none", |r| r.name())
                )?;
            }
            Ok(())
        }
        ResultFormat::Json => {
            let records: Vec<ResultRecord> = bins
                .iter()
                .map(|bin| ResultRecord {
                    theta_lo: bin.theta_lo(),
                    theta_hi: bin.theta_hi(),
                    theta_mid: bin.theta_center(),
                    w: bin.value(),
                    error: bin.error(),
                    regime: bin.regime(),
                    counts: bin.counts(),
                })
                .collect();
            serde_json::to_writer_pretty(&mut *out, &records)?;
            writeln!(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    fn path() -> &'static Path {
        Path::new("memory.txt")
    }

    #[test]
    fn mask_cells() {
        let text = "# a comment\n# area_sq_deg: 5156.62\n\n3 7\n4 100 0.5\n";
        let desc = parse_mask_description(Cursor::new(text), path(), MaskFileFormat::Cells).unwrap();
        assert_eq!(desc.declared_area_sq_deg, Some(5156.62));
        assert_eq!(desc.records.len(), 2);
        assert_eq!(desc.records[0].coverage, 1.0);
        assert_eq!(desc.records[1].coverage, 0.5);
    }

    #[test]
    fn mask_rectangles() {
        let text = "10 20 -5 5 8 0.75\n";
        let desc =
            parse_mask_description(Cursor::new(text), path(), MaskFileFormat::Rectangles).unwrap();
        assert_eq!(desc.records.len(), 1);
        assert_eq!(desc.records[0].coverage, 0.75);
    }

    #[test]
    fn mask_errors_report_lines() {
        let text = "3 7\n3 seven\n";
        let err = parse_mask_description(Cursor::new(text), path(), MaskFileFormat::Cells)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { line: 2, .. }));

        // ordinal out of range for level 1
        let err = parse_mask_description(Cursor::new("1 4\n"), path(), MaskFileFormat::Cells)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { line: 1, .. }));

        let err = parse_mask_description(Cursor::new("1 2 0.5 9\n"), path(), MaskFileFormat::Cells)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { line: 1, .. }));
    }

    #[test]
    fn catalog_columns() {
        let text = "10.0 20.0\n30.0 -40.0 2.5\n# skipped\n50.0 60.0 0.5 19.5\n";
        let points = parse_catalog(Cursor::new(text), path(), CatalogFileFormat::default()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].weight(), 1.0);
        assert_eq!(points[1].weight(), 2.5);
        assert_eq!(points[2].aux(), Some(19.5));

        let unweighted = CatalogFileFormat {
            use_weights: false,
            ..CatalogFileFormat::default()
        };
        let points = parse_catalog(Cursor::new(text), path(), unweighted).unwrap();
        assert!(points.iter().all(|p| p.weight() == 1.0));
    }

    #[test]
    fn catalog_rejects_bad_latitude() {
        let text = "10.0 20.0\n10.0 95.0\n";
        let err = parse_catalog(Cursor::new(text), path(), CatalogFileFormat::default()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { line: 2, .. }));
    }

    #[test]
    fn survey_rows_list_lambda_first() {
        // η = 120 is a valid survey longitude, λ = 10 the latitude
        let survey = CatalogFileFormat {
            system: CoordinateSystem::Survey,
            use_weights: true,
        };
        let points = parse_catalog(Cursor::new("10.0 120.0 0.5\n"), path(), survey).unwrap();
        let (lambda, eta) = points[0].coordinates(CoordinateSystem::Survey);
        assert!((lambda - 10.0).abs() < 1e-9, "{lambda}");
        assert!((eta - 120.0).abs() < 1e-9, "{eta}");

        // a survey latitude beyond 90 degrees is rejected
        let err = parse_catalog(Cursor::new("120.0 10.0\n"), path(), survey).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { line: 1, .. }));
    }

    #[test]
    fn ascii_results_have_one_row_per_bin() {
        let bins = ScaleBinSet::new(0.1, 10.0, 2).unwrap();
        let mut buf = Vec::new();
        format_results(&mut buf, &bins, ResultFormat::Ascii).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows.len(), bins.len());
        assert!(rows.iter().all(|r| r.split_whitespace().count() == 6));
    }
}
