mod common;

use angcorr::{
    CoordinateSystem, ErrorKind, FootprintMask, MaskDescription, MaskRecord, RaDecBox, SphereCell,
    UnitVector,
};
use common::{isclose, rng, uniform_in_box};

fn box_mask(bounds: RaDecBox, level: u8) -> FootprintMask {
    let description = MaskDescription {
        records: vec![MaskRecord::rectangle(bounds, level, 1.0)],
        declared_area_sq_deg: None,
    };
    FootprintMask::build(&description).unwrap()
}

#[test]
fn rectangle_area_is_exact() {
    let bounds = RaDecBox::new(0.0, 10.0, -5.0, 5.0).unwrap();
    let mask = box_mask(bounds, 12);
    assert!(isclose(mask.area(), bounds.area(), 1e-9, 0.0));
    // coarse interior cells are kept alongside the refined boundary
    assert!(mask.levels().len() > 1);
    assert_eq!(mask.finest_level(), 12);

    let rtol = 1e-9;
    let expected = 10.0 * 10.0 * (5.0_f64.to_radians().sin() / 5.0_f64.to_radians());
    assert!(isclose(mask.area_sq_deg(), expected, rtol, 0.0));
}

#[test]
fn declared_area_must_match() {
    let bounds = RaDecBox::new(30.0, 50.0, 10.0, 20.0).unwrap();
    let area = box_mask(bounds, 9).area_sq_deg();

    let mut description = MaskDescription {
        records: vec![MaskRecord::rectangle(bounds, 9, 1.0)],
        declared_area_sq_deg: Some(area),
    };
    assert!(FootprintMask::build(&description).is_ok());

    description.declared_area_sq_deg = Some(area * 1.01);
    let err = FootprintMask::build(&description).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MalformedMask { .. }));
}

#[test]
fn decompose_conserves_area() {
    let bounds = RaDecBox::new(100.0, 115.0, -20.0, -8.0).unwrap();
    let mask = box_mask(bounds, 8);
    for level in [0u8, 3, 6, 8, 9] {
        let cells = mask.decompose(level).unwrap();
        let area: f64 = cells.iter().map(|c| c.covered_area()).sum();
        assert!(isclose(area, mask.area(), 1e-10, 0.0), "level {level}");
        assert!(cells.iter().all(|c| c.cell.level() == level));
        assert!(cells.iter().all(|c| c.coverage > 0.0 && c.coverage <= 1.0));
        assert!(cells.windows(2).all(|w| w[0].cell < w[1].cell));
    }
}

#[test]
fn points_inside_the_box_are_kept() {
    let bounds = RaDecBox::new(200.0, 240.0, 20.0, 50.0).unwrap();
    let mask = box_mask(bounds, 10);

    let mut r#gen = rng(5);
    // stay away from the edges, where cells are only partially covered
    let inside = uniform_in_box(1000, (201.0, 239.0), (21.0, 49.0), &mut r#gen);
    assert_eq!(mask.filter_points(&inside, 0.2).len(), inside.len());
    for p in &inside {
        assert_eq!(mask.contains(p, 0.2), (true, 1.0));
    }

    let outside = uniform_in_box(1000, (250.0, 350.0), (-60.0, 10.0), &mut r#gen);
    assert!(mask.filter_points(&outside, 0.0).is_empty());
    assert_eq!(mask.coverage_at(&UnitVector::from_ra_dec(0.0, 0.0)), 0.0);
}

#[test]
fn threshold_is_exclusive() {
    let cell = SphereCell::new(6, 1234).unwrap();
    let description = MaskDescription {
        records: vec![MaskRecord::cell(cell, 0.2)],
        declared_area_sq_deg: None,
    };
    let mask = FootprintMask::build(&description).unwrap();
    let point = angcorr::AngularPoint::from_unit_vector(cell.center());
    assert_eq!(mask.contains(&point, 0.2), (false, 0.2));
    assert_eq!(mask.contains(&point, 0.1), (true, 0.2));
    assert_eq!(point.system(), CoordinateSystem::Equatorial);
}

#[test]
fn overlapping_records() {
    let parent = SphereCell::new(5, 40).unwrap();
    let child = parent.children().unwrap()[2];

    // consistent: coarse coverage plus a finer record stays within [0, 1]
    let description = MaskDescription {
        records: vec![MaskRecord::cell(parent, 0.5), MaskRecord::cell(child, 0.25)],
        declared_area_sq_deg: None,
    };
    let mask = FootprintMask::build(&description).unwrap();
    assert!(isclose(mask.area(), parent.area() * 0.5 + child.area() * 0.25, 1e-12, 0.0));
    assert_eq!(mask.coverage_at(&child.center()), 0.75);
    assert_eq!(mask.finest_level(), 6);

    // inconsistent: the overlap sums past full coverage
    let description = MaskDescription {
        records: vec![MaskRecord::cell(parent, 0.8), MaskRecord::cell(child, 0.5)],
        declared_area_sq_deg: None,
    };
    let err = FootprintMask::build(&description).unwrap_err();
    match err.kind() {
        ErrorKind::MalformedMask { cell, .. } => assert_eq!(*cell, Some(child)),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn equal_siblings_are_compacted() {
    let parent = SphereCell::new(7, 999).unwrap();
    let records = parent
        .children()
        .unwrap()
        .iter()
        .map(|&c| MaskRecord::cell(c, 0.6))
        .collect();
    let mask = FootprintMask::build(&MaskDescription {
        records,
        declared_area_sq_deg: None,
    })
    .unwrap();
    assert_eq!(mask.n_cells(), 1);
    assert_eq!(mask.levels(), &[7]);
    assert_eq!(mask.coverage_at(&parent.center()), 0.6);
}
