//! Low-precision Sun and Moon positions.
//!
//! Series from the Astronomical Almanac ("low precision formulas"), good to about
//! 0.01° for the Sun and 0.3° for the Moon between 1950 and 2050. That is enough to
//! tell night from twilight and to keep stars out of the lunar glare.
//!
//! Positions are returned as geocentric vectors on the equator and equinox of date,
//! in Earth equatorial radii, so that [`HorizonFrame::from_geocentric_of_date`] can
//! apply the topocentric (parallax) correction.

use nalgebra::Vector3;

use crate::constants::{EARTH_MAJOR_AXIS, JULIAN_CENTURY, RADEG, T2000};

use super::{HorizonFrame, TopocentricPosition};

/// Astronomical unit in Earth equatorial radii.
const AU_IN_EARTH_RADII: f64 = 149_597_870_700.0 / EARTH_MAJOR_AXIS;

/// Sine of a series argument given in degrees.
fn sind(deg: f64) -> f64 {
    (deg * RADEG).sin()
}

fn cosd(deg: f64) -> f64 {
    (deg * RADEG).cos()
}

/// Rotate ecliptic-of-date spherical coordinates to an equatorial vector.
fn ecliptic_to_equatorial(lon_deg: f64, lat_deg: f64, dist: f64, obliquity_deg: f64) -> Vector3<f64> {
    let (cb, sb) = (cosd(lat_deg), sind(lat_deg));
    let (cl, sl) = (cosd(lon_deg), sind(lon_deg));
    let (ce, se) = (cosd(obliquity_deg), sind(obliquity_deg));

    let (x, y, z) = (cb * cl, cb * sl, sb);
    Vector3::new(x, ce * y - se * z, se * y + ce * z) * dist
}

/// Geocentric Sun vector, equator of date, Earth radii.
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date (TT).
pub fn sun_geocentric(tjm: f64) -> Vector3<f64> {
    let n = tjm - T2000;

    let mean_lon = 280.460 + 0.9856474 * n;
    let anomaly = 357.528 + 0.9856003 * n;
    let lon = mean_lon + 1.915 * sind(anomaly) + 0.020 * sind(2.0 * anomaly);
    let obliquity = 23.439 - 0.0000004 * n;
    let dist_au = 1.00014 - 0.01671 * cosd(anomaly) - 0.00014 * cosd(2.0 * anomaly);

    ecliptic_to_equatorial(lon, 0.0, dist_au * AU_IN_EARTH_RADII, obliquity)
}

/// Geocentric Moon vector, equator of date, Earth radii.
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date (TT).
pub fn moon_geocentric(tjm: f64) -> Vector3<f64> {
    let n = tjm - T2000;
    let t = n / JULIAN_CENTURY;

    let lon = 218.32 + 481267.881 * t
        + 6.29 * sind(135.0 + 477198.87 * t)
        - 1.27 * sind(259.3 - 413335.36 * t)
        + 0.66 * sind(235.7 + 890534.22 * t)
        + 0.21 * sind(269.9 + 954397.74 * t)
        - 0.19 * sind(357.5 + 35999.05 * t)
        - 0.11 * sind(186.5 + 966404.03 * t);

    let lat = 5.13 * sind(93.3 + 483202.02 * t)
        + 0.28 * sind(228.2 + 960400.89 * t)
        - 0.28 * sind(318.3 + 6003.15 * t)
        - 0.17 * sind(217.6 - 407332.21 * t);

    let parallax = 0.9508
        + 0.0518 * cosd(135.0 + 477198.87 * t)
        + 0.0095 * cosd(259.3 - 413335.36 * t)
        + 0.0078 * cosd(235.7 + 890534.22 * t)
        + 0.0028 * cosd(269.9 + 954397.74 * t);

    let obliquity = 23.439 - 0.0000004 * n;
    ecliptic_to_equatorial(lon, lat, 1.0 / sind(parallax), obliquity)
}

impl HorizonFrame {
    /// Topocentric position of the Sun at the frame epoch.
    pub fn sun(&self) -> TopocentricPosition {
        self.from_geocentric_of_date(&sun_geocentric(self.mjd_tt()))
    }

    /// Topocentric position of the Moon at the frame epoch, parallax included.
    pub fn moon(&self) -> TopocentricPosition {
        self.from_geocentric_of_date(&moon_geocentric(self.mjd_tt()))
    }
}
