mod common;

use std::fs;
use std::io::Write;

use angcorr::{
    CatalogFileFormat, CoordinateSystem, CorrelationEngine, EngineConfig, ErrorKind,
    FootprintMask, MaskFileFormat, RegimePolicy, ResultFormat, ScaleBinSet, io,
};
use common::{isclose, rng, uniform_in_box};

#[test]
fn mask_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mask.txt");
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "# footprint made of 2 cells").unwrap();
    writeln!(file, "# area_sq_deg: 241.7166").unwrap();
    writeln!(file, "4 100").unwrap();
    writeln!(file, "4 101 0.5").unwrap();
    drop(file);

    let description = io::read_mask_description(&path, MaskFileFormat::Cells).unwrap();
    assert_eq!(description.records.len(), 2);
    let mask = FootprintMask::build(&description).unwrap();
    let level_4_sq_deg = mask.area_sq_deg() / 1.5;
    assert!(isclose(level_4_sq_deg, 41252.96125 / 256.0, 1e-6, 0.0));
}

#[test]
fn missing_files_are_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.txt");
    let err = io::read_catalog(&path, CatalogFileFormat::default()).unwrap_err();
    match err.kind() {
        ErrorKind::Io { path: p, .. } => assert_eq!(p, &path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn survey_catalog_positions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("survey.txt");
    // lambda eta weight
    fs::write(&path, "10.0 120.0 1.5\n-45.0 30.0 2.0\n").unwrap();
    let format = CatalogFileFormat {
        system: CoordinateSystem::Survey,
        use_weights: true,
    };
    let points = io::read_catalog(&path, format).unwrap();
    assert_eq!(points.len(), 2);
    for (p, (lambda, eta)) in points.iter().zip([(10.0, 120.0), (-45.0, 30.0)]) {
        let (lambda2, eta2) = p.coordinates(CoordinateSystem::Survey);
        assert!(isclose(lambda2, lambda, 0.0, 1e-9), "{lambda2} vs {lambda}");
        assert!(isclose(eta2, eta, 0.0, 1e-9), "{eta2} vs {eta}");
    }
    assert_eq!(points[1].weight(), 2.0);
}

#[test]
fn measurement_through_files() {
    let dir = tempfile::tempdir().unwrap();

    let mask_path = dir.path().join("mask.txt");
    fs::write(&mask_path, "20 40 -10 10 9\n").unwrap();
    let catalog_path = dir.path().join("catalog.txt");
    let mut text = String::new();
    for p in uniform_in_box(2000, (20.0, 40.0), (-10.0, 10.0), &mut rng(31)) {
        let (ra, dec) = p.coordinates(CoordinateSystem::Equatorial);
        text.push_str(&format!("{ra:.10} {dec:.10} 1.0 {:.2}\n", 19.0 + ra / 100.0));
    }
    fs::write(&catalog_path, text).unwrap();

    let mask = FootprintMask::build(
        &io::read_mask_description(&mask_path, MaskFileFormat::Rectangles).unwrap(),
    )
    .unwrap();
    let catalog = io::read_catalog(&catalog_path, CatalogFileFormat::default()).unwrap();
    assert_eq!(catalog.len(), 2000);
    assert!(catalog.iter().all(|p| p.aux().is_some()));

    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{"seed": 12, "n_teams": 8}"#).unwrap();
    let config = io::read_engine_config(&config_path).unwrap();
    assert_eq!(
        config,
        EngineConfig {
            seed: Some(12),
            n_teams: 8,
            ..EngineConfig::default()
        }
    );
    let engine = CorrelationEngine::new(config).unwrap();

    let bins = ScaleBinSet::new(0.5, 5.0, 2).unwrap();
    let bins = engine
        .run(&mask, &catalog, bins, &RegimePolicy::UseOnlyPairs, 1)
        .unwrap();

    let ascii = dir.path().join("Wtheta_ascii");
    io::write_results(&ascii, &bins, ResultFormat::Ascii).unwrap();
    let text = fs::read_to_string(&ascii).unwrap();
    let rows: Vec<Vec<&str>> = text
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| l.split_whitespace().collect())
        .collect();
    assert_eq!(rows.len(), bins.len());
    for (row, bin) in rows.iter().zip(bins.iter()) {
        assert_eq!(row.len(), 6);
        assert_eq!(row[5], "pair");
        let theta_lo: f64 = row[0].parse().unwrap();
        assert!(isclose(theta_lo, bin.theta_lo(), 1e-7, 0.0));
    }

    let json = dir.path().join("Wtheta_json");
    io::write_results(&json, &bins, ResultFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    let records = value.as_array().unwrap();
    assert_eq!(records.len(), bins.len());
    assert_eq!(records[0]["regime"]["regime"], "pair");
    assert_eq!(records[0]["counts"]["kind"], "pair");
    assert!(isclose(
        records[1]["w"].as_f64().unwrap(),
        bins.bins()[1].value(),
        1e-12,
        0.0
    ));
}

#[test]
fn bad_config_files_report_their_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{\n  \"min_occupancy\": \"lots\"\n}\n").unwrap();
    let err = io::read_engine_config(&path).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Parse { line: 2, .. }));
}
