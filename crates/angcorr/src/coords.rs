//! Positions on the unit sphere.
//!
//! Everything inside the crate works with equatorial unit vectors. The
//! angular coordinates a point was specified in are only relevant at the
//! boundary (catalog input, result output), so [`AngularPoint`] remembers the
//! [`CoordinateSystem`] tag and converts on request.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

// orientation of the SDSS survey coordinate system relative to the
// equatorial system
const SURVEY_NODE: f64 = 95.0 * (std::f64::consts::PI / 180.0);
const SURVEY_ETA_POLE: f64 = 32.5 * (std::f64::consts::PI / 180.0);

/// The angular coordinate system that a longitude/latitude pair refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Right ascension & declination
    Equatorial,
    /// The survey-native (λ, η) system used by SDSS. λ is the latitude-like
    /// angle, so coordinates are listed as `(λ, η)`.
    Survey,
}

/// A position on the unit sphere expressed as a cartesian unit vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitVector {
    x: f64,
    y: f64,
    z: f64,
}

impl UnitVector {
    /// Build from equatorial coordinates (in radians)
    pub fn from_ra_dec(ra: f64, dec: f64) -> Self {
        let cos_dec = dec.cos();
        UnitVector {
            x: ra.cos() * cos_dec,
            y: ra.sin() * cos_dec,
            z: dec.sin(),
        }
    }

    /// Build from right ascension (radians) and `z = sin(dec)`.
    ///
    /// This is the natural parameterization for equal-area sampling.
    pub fn from_ra_z(ra: f64, z: f64) -> Self {
        let z = z.clamp(-1.0, 1.0);
        let r = (1.0 - z * z).max(0.0).sqrt();
        UnitVector {
            x: ra.cos() * r,
            y: ra.sin() * r,
            z,
        }
    }

    pub(crate) fn from_components(x: f64, y: f64, z: f64) -> Self {
        let norm = (x * x + y * y + z * z).sqrt();
        UnitVector {
            x: x / norm,
            y: y / norm,
            z: z / norm,
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    /// right ascension in radians, in `[0, 2π)`
    pub fn ra(&self) -> f64 {
        let ra = self.y.atan2(self.x);
        if ra < 0.0 {
            let wrapped = ra + TAU;
            // -0.0 and tiny negative values round up to exactly 2π
            if wrapped >= TAU { 0.0 } else { wrapped }
        } else {
            ra
        }
    }

    /// declination in radians
    pub fn dec(&self) -> f64 {
        self.z.clamp(-1.0, 1.0).asin()
    }

    #[inline]
    pub fn dot(&self, other: &UnitVector) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// `|a - b|²`, equal to `4 sin²(θ/2)` for the separation angle `θ`
    #[inline]
    pub fn squared_chord(&self, other: &UnitVector) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// The great-circle separation in radians.
    pub fn angle_to(&self, other: &UnitVector) -> f64 {
        let cx = self.y * other.z - self.z * other.y;
        let cy = self.z * other.x - self.x * other.z;
        let cz = self.x * other.y - self.y * other.x;
        let cross = (cx * cx + cy * cy + cz * cz).sqrt();
        cross.atan2(self.dot(other))
    }
}

/// Convert a separation angle (radians) into a squared chord length.
#[inline]
pub fn squared_chord_for_angle(theta: f64) -> f64 {
    let s = (0.5 * theta).sin();
    4.0 * s * s
}

fn survey_to_equatorial(lambda: f64, eta: f64) -> (f64, f64) {
    let x = -lambda.sin();
    let y = lambda.cos() * (eta + SURVEY_ETA_POLE).cos();
    let z = lambda.cos() * (eta + SURVEY_ETA_POLE).sin();
    let ra = y.atan2(x) + SURVEY_NODE;
    let dec = z.clamp(-1.0, 1.0).asin();
    (ra, dec)
}

fn equatorial_to_survey(v: &UnitVector) -> (f64, f64) {
    // rotate so that the node lies along the x-axis
    let (sn, cn) = SURVEY_NODE.sin_cos();
    let x = v.x * cn + v.y * sn;
    let y = -v.x * sn + v.y * cn;
    let z = v.z;
    let lambda = -(x.clamp(-1.0, 1.0).asin());
    let mut eta = z.atan2(y) - SURVEY_ETA_POLE;
    if eta < -std::f64::consts::PI {
        eta += TAU;
    } else if eta >= std::f64::consts::PI {
        eta -= TAU;
    }
    (lambda, eta)
}

/// A weighted position on the celestial sphere.
///
/// Points are immutable once constructed. The builder-style methods
/// ([`AngularPoint::with_weight`], [`AngularPoint::with_aux`]) consume the
/// point and return a new one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngularPoint {
    position: UnitVector,
    system: CoordinateSystem,
    weight: f64,
    aux: Option<f64>,
}

impl AngularPoint {
    /// Construct a point from 2 angles (in degrees) given in the order that
    /// is conventional for `system`: `(ra, dec)` for
    /// [`CoordinateSystem::Equatorial`] and `(λ, η)` for
    /// [`CoordinateSystem::Survey`]. The weight defaults to 1.
    pub fn new(first_deg: f64, second_deg: f64, system: CoordinateSystem) -> Result<Self, Error> {
        if !(first_deg.is_finite() && second_deg.is_finite()) {
            return Err(Error::invalid_coordinate(format!(
                "non-finite position ({first_deg}, {second_deg})"
            )));
        }
        let (lon_deg, lat_deg) = match system {
            CoordinateSystem::Equatorial => (first_deg, second_deg),
            CoordinateSystem::Survey => (second_deg, first_deg),
        };
        if lat_deg.abs() > 90.0 {
            return Err(Error::invalid_coordinate(format!(
                "latitude {lat_deg} lies outside of [-90, 90]"
            )));
        }
        let (lon, lat) = (lon_deg.to_radians(), lat_deg.to_radians());
        let position = match system {
            CoordinateSystem::Equatorial => UnitVector::from_ra_dec(lon, lat),
            CoordinateSystem::Survey => {
                let (ra, dec) = survey_to_equatorial(lat, lon);
                UnitVector::from_ra_dec(ra, dec)
            }
        };
        Ok(AngularPoint {
            position,
            system,
            weight: 1.0,
            aux: None,
        })
    }

    /// Wrap an existing (equatorial) unit vector
    pub fn from_unit_vector(position: UnitVector) -> Self {
        AngularPoint {
            position,
            system: CoordinateSystem::Equatorial,
            weight: 1.0,
            aux: None,
        }
    }

    pub fn with_weight(self, weight: f64) -> Result<Self, Error> {
        if !weight.is_finite() || weight < 0.0 {
            Err(Error::invalid_coordinate(format!(
                "point weights must be finite & non-negative (got {weight})"
            )))
        } else {
            Ok(AngularPoint { weight, ..self })
        }
    }

    pub fn with_aux(self, aux: f64) -> Self {
        AngularPoint {
            aux: Some(aux),
            ..self
        }
    }

    pub fn unit_vector(&self) -> &UnitVector {
        &self.position
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn aux(&self) -> Option<f64> {
        self.aux
    }

    /// The coordinate system the point was originally specified in
    pub fn system(&self) -> CoordinateSystem {
        self.system
    }

    /// The position in degrees, measured in `system` and listed in the same
    /// order that [`AngularPoint::new`] accepts.
    pub fn coordinates(&self, system: CoordinateSystem) -> (f64, f64) {
        match system {
            CoordinateSystem::Equatorial => {
                (self.position.ra().to_degrees(), self.position.dec().to_degrees())
            }
            CoordinateSystem::Survey => {
                let (lambda, eta) = equatorial_to_survey(&self.position);
                (lambda.to_degrees(), eta.to_degrees())
            }
        }
    }

    /// The separation from `other` in degrees
    pub fn separation_deg(&self, other: &AngularPoint) -> f64 {
        self.position.angle_to(&other.position).to_degrees()
    }
}

/// Co-latitude helper used by the index code: `true` when the cap centered on
/// `v` with angular `radius` (radians) contains a pole.
pub(crate) fn cap_contains_pole(v: &UnitVector, radius: f64) -> bool {
    let dec = v.dec();
    dec + radius >= FRAC_PI_2 || dec - radius <= -FRAC_PI_2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn equatorial_roundtrip() {
        let p = AngularPoint::new(123.5, -45.25, CoordinateSystem::Equatorial).unwrap();
        let (ra, dec) = p.coordinates(CoordinateSystem::Equatorial);
        assert!(close(ra, 123.5, 1e-10));
        assert!(close(dec, -45.25, 1e-10));
        assert_eq!(p.weight(), 1.0);
        assert_eq!(p.aux(), None);
    }

    #[test]
    fn survey_roundtrip() {
        for &(lambda, eta) in &[(20.0, 10.0), (-60.0, -40.0), (5.0, 170.0), (10.0, 120.0)] {
            let p = AngularPoint::new(lambda, eta, CoordinateSystem::Survey).unwrap();
            assert_eq!(p.system(), CoordinateSystem::Survey);
            let (lambda2, eta2) = p.coordinates(CoordinateSystem::Survey);
            assert!(close(lambda, lambda2, 1e-9), "{lambda} vs {lambda2}");
            assert!(close(eta, eta2, 1e-9), "{eta} vs {eta2}");
        }
        // λ is the latitude-like angle
        assert!(AngularPoint::new(95.0, 10.0, CoordinateSystem::Survey).is_err());
    }

    #[test]
    fn survey_origin_is_the_node() {
        // (λ, η) = (0, -η_pole) sits on the survey equator at the node
        let p = AngularPoint::new(0.0, -32.5, CoordinateSystem::Survey).unwrap();
        let (ra, dec) = p.coordinates(CoordinateSystem::Equatorial);
        assert!(close(ra, 185.0, 1e-9), "{ra}");
        assert!(close(dec, 0.0, 1e-9), "{dec}");
    }

    #[test]
    fn bad_inputs() {
        assert!(AngularPoint::new(0.0, 91.0, CoordinateSystem::Equatorial).is_err());
        assert!(AngularPoint::new(f64::NAN, 0.0, CoordinateSystem::Equatorial).is_err());
        let p = AngularPoint::new(0.0, 0.0, CoordinateSystem::Equatorial).unwrap();
        assert!(p.with_weight(-1.0).is_err());
        assert!(p.with_weight(f64::INFINITY).is_err());
        assert_eq!(p.with_weight(2.5).unwrap().weight(), 2.5);
        assert_eq!(p.with_aux(19.5).aux(), Some(19.5));
    }

    #[test]
    fn separations() {
        let a = AngularPoint::new(10.0, 0.0, CoordinateSystem::Equatorial).unwrap();
        let b = AngularPoint::new(10.001, 0.0, CoordinateSystem::Equatorial).unwrap();
        assert!(close(a.separation_deg(&b), 0.001, 1e-12));
        let theta = 0.001_f64.to_radians();
        assert!(close(
            a.unit_vector().squared_chord(b.unit_vector()),
            squared_chord_for_angle(theta),
            1e-20
        ));
        let c = AngularPoint::new(190.0, 0.0, CoordinateSystem::Equatorial).unwrap();
        assert!(close(a.separation_deg(&c), 180.0, 1e-9));
    }

    #[test]
    fn ra_is_wrapped() {
        let v = UnitVector::from_ra_dec(-0.5, 0.1);
        assert!(close(v.ra(), TAU - 0.5, 1e-12));
        assert!(v.ra() < TAU);
    }
}
