//! # Topocentric ephemeris
//!
//! Converts catalog (J2000 equatorial) coordinates to the local **altitude/azimuth**
//! seen by an observer at a UTC instant.
//!
//! ## Pipeline
//!
//! ```text
//! J2000 unit vector --P(t)--> mean equator of date --Rz(-LST)--> hour-angle frame --H(φ)--> (N, E, Up)
//! ```
//!
//! - `P(t)`: IAU 1976 precession ([`prec`]).
//! - `LST`: local mean sidereal time, GMST plus east longitude ([`local_sidereal_time`]).
//! - `H(φ)`: tilt to the observer's geodetic latitude.
//!
//! The three rotations are folded into one matrix by [`HorizonFrame::new`], so that
//! evaluating a whole catalog for one frame costs one matrix-vector product per star.
//!
//! ## Conventions
//!
//! - Azimuth is measured from North through East, in `[0, 2π)`.
//! - Altitude is geometric: no atmospheric refraction. Negative altitudes are valid output.
//! - Nutation and aberration are neglected (tens of arcseconds at most).
//!
//! All functions are pure: the same star, observer and epoch always give the same result.

pub mod planets;
pub mod solar;

use hifitime::Epoch;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::catalog::Star;
use crate::constants::{
    Degree, Meter, Radian, DPI, EARTH_MAJOR_AXIS, EARTH_MINOR_AXIS, HALF_PI, MJD, RADEG,
};
use crate::earth_orientation::{prec, radec_to_unit, rotmt, unit_to_radec};
use crate::skycover_errors::SkycoverError;
use crate::time::{local_sidereal_time, mjd_tt};

/// Geodetic position of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverLocation {
    /// Geodetic latitude, radians, north positive.
    pub latitude: Radian,
    /// Longitude, radians, east positive.
    pub longitude: Radian,
    /// Height above the reference ellipsoid, meters.
    pub elevation: Meter,
}

impl ObserverLocation {
    /// Build a validated observer location from radians and meters.
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::InvalidObserverLocation`] if a value is not finite or
    ///   `|latitude| > π/2`.
    pub fn new(latitude: Radian, longitude: Radian, elevation: Meter) -> Result<Self, SkycoverError> {
        if !(latitude.is_finite() && longitude.is_finite() && elevation.is_finite()) {
            return Err(SkycoverError::InvalidObserverLocation(
                "latitude, longitude and elevation must be finite".into(),
            ));
        }
        if latitude.abs() > HALF_PI {
            return Err(SkycoverError::InvalidObserverLocation(format!(
                "latitude {:.4} rad is outside [-π/2, π/2]",
                latitude
            )));
        }
        Ok(ObserverLocation {
            latitude,
            longitude,
            elevation,
        })
    }

    /// Same as [`ObserverLocation::new`] with angles in degrees.
    pub fn from_degrees(
        latitude: Degree,
        longitude: Degree,
        elevation: Meter,
    ) -> Result<Self, SkycoverError> {
        Self::new(latitude * RADEG, longitude * RADEG, elevation)
    }

    /// Geocentric parallax coordinates `(ρ·cosφ', ρ·sinφ')` in Earth equatorial radii.
    ///
    /// Accounts for the Earth's oblateness through the parametric latitude and adds the
    /// elevation above the ellipsoid.
    pub fn parallax_coordinates(&self) -> (f64, f64) {
        let axis_ratio = EARTH_MINOR_AXIS / EARTH_MAJOR_AXIS;
        let (sin_lat, cos_lat) = self.latitude.sin_cos();

        let u = (sin_lat * axis_ratio).atan2(cos_lat);
        let h = self.elevation / EARTH_MAJOR_AXIS;

        let rho_cos_phi = u.cos() + h * cos_lat;
        let rho_sin_phi = axis_ratio * u.sin() + h * sin_lat;
        (rho_cos_phi, rho_sin_phi)
    }
}

/// Local horizontal coordinates of a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopocentricPosition {
    /// Altitude above the horizon, radians, in `[-π/2, π/2]`.
    pub altitude: Radian,
    /// Azimuth from North through East, radians, in `[0, 2π)`.
    pub azimuth: Radian,
}

impl TopocentricPosition {
    pub fn new(altitude: Radian, azimuth: Radian) -> Self {
        TopocentricPosition { altitude, azimuth }
    }

    /// Strictly above the geometric horizon.
    pub fn is_above_horizon(&self) -> bool {
        self.altitude > 0.0
    }

    /// Unit vector in the (North, East, Up) frame.
    pub fn unit_vector(&self) -> Vector3<f64> {
        let (sa, ca) = self.altitude.sin_cos();
        let (sz, cz) = self.azimuth.sin_cos();
        Vector3::new(ca * cz, ca * sz, sa)
    }

    /// Great-circle separation between two horizontal directions.
    pub fn separation(&self, other: &TopocentricPosition) -> Radian {
        let a = self.unit_vector();
        let b = other.unit_vector();
        a.cross(&b).norm().atan2(a.dot(&b))
    }

    fn from_horizontal_vector(v: &Vector3<f64>) -> Self {
        let n = v.norm();
        TopocentricPosition {
            altitude: (v.z / n).clamp(-1.0, 1.0).asin(),
            azimuth: v.y.atan2(v.x).rem_euclid(DPI),
        }
    }
}

/// Precomputed J2000 → horizontal transformation for one observer and one instant.
///
/// Build once per frame and reuse for every catalog star.
#[derive(Debug, Clone)]
pub struct HorizonFrame {
    observer: ObserverLocation,
    mjd_tt: MJD,
    lst: Radian,
    /// Equatorial of date → (North, East, Up).
    date_to_horizon: Matrix3<f64>,
    /// J2000 → (North, East, Up).
    j2000_to_horizon: Matrix3<f64>,
}

impl HorizonFrame {
    /// Assemble the rotation chain for `observer` at `epoch` (UTC).
    pub fn new(observer: &ObserverLocation, epoch: &Epoch) -> Self {
        let tjm = mjd_tt(epoch);
        let lst = local_sidereal_time(epoch, observer.longitude);

        let (sin_lat, cos_lat) = observer.latitude.sin_cos();
        #[rustfmt::skip]
        let tilt = Matrix3::new(
            -sin_lat, 0.0, cos_lat,
             0.0,     1.0, 0.0,
             cos_lat, 0.0, sin_lat,
        );

        let date_to_horizon = tilt * rotmt(-lst, 2);
        let j2000_to_horizon = date_to_horizon * prec(tjm);

        HorizonFrame {
            observer: *observer,
            mjd_tt: tjm,
            lst,
            date_to_horizon,
            j2000_to_horizon,
        }
    }

    pub fn observer(&self) -> &ObserverLocation {
        &self.observer
    }

    /// Epoch of the frame, MJD on the TT scale.
    pub fn mjd_tt(&self) -> MJD {
        self.mjd_tt
    }

    /// Local mean sidereal time, radians.
    pub fn local_sidereal_time(&self) -> Radian {
        self.lst
    }

    /// Horizontal position of J2000 equatorial coordinates.
    pub fn from_j2000(&self, ra: Radian, dec: Radian) -> TopocentricPosition {
        TopocentricPosition::from_horizontal_vector(&(self.j2000_to_horizon * radec_to_unit(ra, dec)))
    }

    /// Horizontal position of a catalog star.
    pub fn topocentric(&self, star: &Star) -> TopocentricPosition {
        self.from_j2000(star.ra, star.dec)
    }

    /// J2000 `(ra, dec)` of a horizontal direction, the inverse of [`HorizonFrame::from_j2000`].
    ///
    /// Combined with [`CalibrationParameters::inverse`](crate::projection::CalibrationParameters::inverse)
    /// this gives the sky coordinates of an image pixel.
    pub fn to_j2000(&self, position: &TopocentricPosition) -> (Radian, Radian) {
        unit_to_radec(&(self.j2000_to_horizon.transpose() * position.unit_vector()))
    }

    /// Horizontal direction of a geocentric vector expressed in the equator of date,
    /// corrected for the observer's offset from the geocenter.
    ///
    /// `geocentric` is in Earth equatorial radii; for stars the correction vanishes,
    /// for the Moon it is close to one degree.
    pub fn from_geocentric_of_date(&self, geocentric: &Vector3<f64>) -> TopocentricPosition {
        let (rho_cos_phi, rho_sin_phi) = self.observer.parallax_coordinates();
        let (sin_lst, cos_lst) = self.lst.sin_cos();
        let site = Vector3::new(rho_cos_phi * cos_lst, rho_cos_phi * sin_lst, rho_sin_phi);

        TopocentricPosition::from_horizontal_vector(&(self.date_to_horizon * (geocentric - site)))
    }
}

/// Topocentric position of `star` seen from `observer` at `epoch` (UTC).
///
/// Convenience wrapper around [`HorizonFrame`]; prefer building the frame once when
/// evaluating many stars at the same instant.
pub fn topocentric(star: &Star, observer: &ObserverLocation, epoch: &Epoch) -> TopocentricPosition {
    HorizonFrame::new(observer, epoch).topocentric(star)
}
