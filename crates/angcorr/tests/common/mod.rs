// the reason this is named mod.rs has to do with some complexities of how
// testing is handled
//
// we are following the advice of the rust book
// https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests

#![allow(dead_code)]

use angcorr::{AngularPoint, CoordinateSystem, UnitVector};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

// based on numpy!
// https://numpy.org/doc/stable/reference/generated/numpy.isclose.html
pub fn isclose(actual: f64, ref_val: f64, rtol: f64, atol: f64) -> bool {
    let actual_nan = actual.is_nan();
    let ref_nan = ref_val.is_nan();
    if actual_nan || ref_nan {
        actual_nan && ref_nan
    } else {
        (actual - ref_val).abs() <= (atol + rtol * ref_val.abs())
    }
}

pub fn rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// `n` points drawn uniformly over the full sphere
pub fn uniform_full_sky(n: usize, seed: u64) -> Vec<AngularPoint> {
    let mut rng = rng(seed);
    (0..n)
        .map(|_| {
            let ra = rng.random::<f64>() * std::f64::consts::TAU;
            let z = 2.0 * rng.random::<f64>() - 1.0;
            AngularPoint::from_unit_vector(UnitVector::from_ra_z(ra, z))
        })
        .collect()
}

/// `n` points drawn uniformly (in solid angle) within an RA/Dec box given
/// in degrees
pub fn uniform_in_box(
    n: usize,
    (ra_min, ra_max): (f64, f64),
    (dec_min, dec_max): (f64, f64),
    rng: &mut impl Rng,
) -> Vec<AngularPoint> {
    let z_min = dec_min.to_radians().sin();
    let z_max = dec_max.to_radians().sin();
    (0..n)
        .map(|_| {
            let ra = ra_min + rng.random::<f64>() * (ra_max - ra_min);
            let z = z_min + rng.random::<f64>() * (z_max - z_min);
            let dec = z.asin().to_degrees();
            AngularPoint::new(ra, dec, CoordinateSystem::Equatorial).unwrap()
        })
        .collect()
}

/// A companion of `point` separated from it by `separation_deg`, in a random
/// direction
pub fn companion(point: &AngularPoint, separation_deg: f64, rng: &mut impl Rng) -> AngularPoint {
    let (ra, dec) = point.coordinates(CoordinateSystem::Equatorial);
    let position_angle = rng.random::<f64>() * std::f64::consts::TAU;
    let d = separation_deg.to_radians();
    let (ra0, dec0) = (ra.to_radians(), dec.to_radians());

    let sin_dec = dec0.sin() * d.cos() + dec0.cos() * d.sin() * position_angle.cos();
    let dec1 = sin_dec.asin();
    let dra = (position_angle.sin() * d.sin() * dec0.cos()).atan2(d.cos() - dec0.sin() * sin_dec);
    let ra1 = (ra0 + dra).rem_euclid(std::f64::consts::TAU);
    AngularPoint::new(ra1.to_degrees(), dec1.to_degrees(), CoordinateSystem::Equatorial).unwrap()
}
