//! Bright planets and the solar-system bodies of a frame.
//!
//! Venus, Mars, Jupiter and Saturn are placed from mean Keplerian elements with linear
//! rates (Standish, *Keplerian Elements for Approximate Positions of the Major Planets*,
//! 1800-2050 table), good to a few arcminutes. Light time, aberration and planetary
//! parallax are neglected.
//!
//! Visual magnitudes use the phase-angle laws of the Astronomical Almanac:
//!
//! ```text
//! Venus    V = -4.40 + 5 log10(r Δ) + 0.0009 i + 0.000239 i² - 0.00000065 i³
//! Mars     V = -1.52 + 5 log10(r Δ) + 0.016 i
//! Jupiter  V = -9.40 + 5 log10(r Δ) + 0.005 i
//! Saturn   V = -8.88 + 5 log10(r Δ) - 2.60 |sin B| + 1.25 sin² B
//! Moon     V = -12.73 + 0.026 ψ + 4e-9 ψ⁴
//! ```
//!
//! with `r`, `Δ` the heliocentric and geocentric distances (AU), `i`, `ψ` the phase
//! angles (degrees) and `B` the tilt of Saturn's rings toward the Earth.

use std::fmt;

use nalgebra::Vector3;

use crate::constants::{Magnitude, JULIAN_CENTURY, MJD, RADEG, T2000};
use crate::earth_orientation::unit_to_radec;

use super::solar::{moon_geocentric, sun_geocentric};
use super::{HorizonFrame, TopocentricPosition};

/// Mean obliquity of the ecliptic at J2000, degrees.
const OBLIQUITY_J2000: f64 = 23.439_28;

const SUN_MAGNITUDE: Magnitude = -26.74;

const KEPLER_MAX_ITER: usize = 20;

/// Saturn ring plane on the J2000 ecliptic, degrees.
const RING_INCLINATION: f64 = 28.0752;
const RING_NODE: f64 = 169.5085;

/// Mean elements as `[value at J2000, rate per Julian century]`.
///
/// Semi-major axis in AU, angles in degrees, ecliptic and equinox J2000.
#[derive(Debug, Clone, Copy)]
struct OrbitalElements {
    semi_major_axis: [f64; 2],
    eccentricity: [f64; 2],
    inclination: [f64; 2],
    mean_longitude: [f64; 2],
    perihelion_longitude: [f64; 2],
    node_longitude: [f64; 2],
}

const VENUS: OrbitalElements = OrbitalElements {
    semi_major_axis: [0.723_335_66, 0.000_003_90],
    eccentricity: [0.006_776_72, -0.000_041_07],
    inclination: [3.394_676_05, -0.000_788_90],
    mean_longitude: [181.979_099_50, 58_517.815_387_29],
    perihelion_longitude: [131.602_467_18, 0.002_683_29],
    node_longitude: [76.679_842_55, -0.277_694_18],
};

const EARTH_MOON_BARYCENTER: OrbitalElements = OrbitalElements {
    semi_major_axis: [1.000_002_61, 0.000_005_62],
    eccentricity: [0.016_711_23, -0.000_043_92],
    inclination: [-0.000_015_31, -0.012_946_68],
    mean_longitude: [100.464_571_66, 35_999.372_449_81],
    perihelion_longitude: [102.937_681_93, 0.323_273_64],
    node_longitude: [0.0, 0.0],
};

const MARS: OrbitalElements = OrbitalElements {
    semi_major_axis: [1.523_710_34, 0.000_018_47],
    eccentricity: [0.093_394_10, 0.000_078_82],
    inclination: [1.849_691_42, -0.008_131_31],
    mean_longitude: [-4.553_432_05, 19_140.302_684_99],
    perihelion_longitude: [-23.943_629_59, 0.444_410_88],
    node_longitude: [49.559_538_91, -0.292_573_43],
};

const JUPITER: OrbitalElements = OrbitalElements {
    semi_major_axis: [5.202_887_00, -0.000_116_07],
    eccentricity: [0.048_386_24, -0.000_132_53],
    inclination: [1.304_396_95, -0.001_837_14],
    mean_longitude: [34.396_440_51, 3_034.746_127_75],
    perihelion_longitude: [14.728_479_83, 0.212_526_68],
    node_longitude: [100.473_909_09, 0.204_691_06],
};

const SATURN: OrbitalElements = OrbitalElements {
    semi_major_axis: [9.536_675_94, -0.001_250_60],
    eccentricity: [0.053_861_79, -0.000_509_91],
    inclination: [2.485_991_87, 0.001_936_09],
    mean_longitude: [49.954_244_23, 1_222.493_622_01],
    perihelion_longitude: [92.598_878_31, -0.418_972_16],
    node_longitude: [113.662_424_48, -0.288_677_94],
};

impl OrbitalElements {
    /// Heliocentric position, ecliptic J2000, AU.
    ///
    /// Arguments
    /// ---------
    /// * `t`: Julian centuries (TT) since J2000.
    fn heliocentric(&self, t: f64) -> Vector3<f64> {
        let at = |[value, rate]: [f64; 2]| value + rate * t;

        let a = at(self.semi_major_axis);
        let e = at(self.eccentricity);
        let perihelion = at(self.perihelion_longitude);
        let node = at(self.node_longitude);
        let mean_anomaly = (at(self.mean_longitude) - perihelion).rem_euclid(360.0) * RADEG;
        let ecc_anomaly = solve_kepler(mean_anomaly, e);

        // In the orbital plane, x toward perihelion
        let xp = a * (ecc_anomaly.cos() - e);
        let yp = a * (1.0 - e * e).sqrt() * ecc_anomaly.sin();

        let (so, co) = ((perihelion - node) * RADEG).sin_cos();
        let (sn, cn) = (node * RADEG).sin_cos();
        let (si, ci) = (at(self.inclination) * RADEG).sin_cos();

        Vector3::new(
            (co * cn - so * sn * ci) * xp + (-so * cn - co * sn * ci) * yp,
            (co * sn + so * cn * ci) * xp + (-so * sn + co * cn * ci) * yp,
            so * si * xp + co * si * yp,
        )
    }
}

/// Eccentric anomaly for the mean anomaly `m` (radians), by Newton iteration.
fn solve_kepler(m: f64, e: f64) -> f64 {
    let mut ecc = m + e * m.sin();
    for _ in 0..KEPLER_MAX_ITER {
        let delta = (ecc - e * ecc.sin() - m) / (1.0 - e * ecc.cos());
        ecc -= delta;
        if delta.abs() < 1e-12 {
            break;
        }
    }
    ecc
}

fn ecliptic_to_equatorial(v: &Vector3<f64>) -> Vector3<f64> {
    let (se, ce) = (OBLIQUITY_J2000 * RADEG).sin_cos();
    Vector3::new(v.x, ce * v.y - se * v.z, se * v.y + ce * v.z)
}

/// Sine of the Earth's elevation above Saturn's ring plane.
fn ring_tilt_sine(geocentric_ecliptic: &Vector3<f64>) -> f64 {
    let lon = geocentric_ecliptic.y.atan2(geocentric_ecliptic.x);
    let lat = (geocentric_ecliptic.z / geocentric_ecliptic.norm()).asin();
    let (si, ci) = (RING_INCLINATION * RADEG).sin_cos();
    si * lat.cos() * (lon - RING_NODE * RADEG).sin() - ci * lat.sin()
}

/// A naked-eye planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Planet {
    Venus,
    Mars,
    Jupiter,
    Saturn,
}

impl Planet {
    fn elements(&self) -> &'static OrbitalElements {
        match self {
            Planet::Venus => &VENUS,
            Planet::Mars => &MARS,
            Planet::Jupiter => &JUPITER,
            Planet::Saturn => &SATURN,
        }
    }

    /// Geocentric position and visual magnitude.
    ///
    /// Arguments
    /// ---------
    /// * `tjm`: Modified Julian Date (TT).
    ///
    /// Return
    /// ------
    /// * The geocentric vector on the J2000 equator, in AU, and the visual magnitude.
    pub fn geocentric(&self, tjm: MJD) -> (Vector3<f64>, Magnitude) {
        let t = (tjm - T2000) / JULIAN_CENTURY;
        let earth = EARTH_MOON_BARYCENTER.heliocentric(t);
        let heliocentric = self.elements().heliocentric(t);
        let geocentric = heliocentric - earth;

        let (r, delta, sun_distance) = (heliocentric.norm(), geocentric.norm(), earth.norm());
        let phase = ((r * r + delta * delta - sun_distance * sun_distance) / (2.0 * r * delta))
            .clamp(-1.0, 1.0)
            .acos()
            / RADEG;
        let distance_term = 5.0 * (r * delta).log10();

        let magnitude = match self {
            Planet::Venus => {
                -4.40 + distance_term + 0.0009 * phase + 0.000239 * phase.powi(2)
                    - 0.00000065 * phase.powi(3)
            }
            Planet::Mars => -1.52 + distance_term + 0.016 * phase,
            Planet::Jupiter => -9.40 + distance_term + 0.005 * phase,
            Planet::Saturn => {
                let sin_b = ring_tilt_sine(&geocentric);
                -8.88 + distance_term - 2.60 * sin_b.abs() + 1.25 * sin_b * sin_b
            }
        };

        (ecliptic_to_equatorial(&geocentric), magnitude)
    }
}

/// A body of the solar system bright enough to show in an all-sky frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolarSystemBody {
    Planet(Planet),
    Moon,
    Sun,
}

impl SolarSystemBody {
    /// Every body, planets first.
    pub const ALL: [SolarSystemBody; 6] = [
        SolarSystemBody::Planet(Planet::Venus),
        SolarSystemBody::Planet(Planet::Mars),
        SolarSystemBody::Planet(Planet::Jupiter),
        SolarSystemBody::Planet(Planet::Saturn),
        SolarSystemBody::Moon,
        SolarSystemBody::Sun,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SolarSystemBody::Planet(Planet::Venus) => "Venus",
            SolarSystemBody::Planet(Planet::Mars) => "Mars",
            SolarSystemBody::Planet(Planet::Jupiter) => "Jupiter",
            SolarSystemBody::Planet(Planet::Saturn) => "Saturn",
            SolarSystemBody::Moon => "Moon",
            SolarSystemBody::Sun => "Sun",
        }
    }
}

impl fmt::Display for SolarSystemBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A solar-system body seen at the frame epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyPosition {
    pub body: SolarSystemBody,
    pub magnitude: Magnitude,
    pub position: TopocentricPosition,
}

/// Moon magnitude from the Sun-Moon elongation seen from the geocenter.
fn moon_magnitude(tjm: MJD) -> Magnitude {
    let elongation = moon_geocentric(tjm).angle(&sun_geocentric(tjm)) / RADEG;
    let phase = 180.0 - elongation;
    -12.73 + 0.026 * phase + 4.0e-9 * phase.powi(4)
}

impl HorizonFrame {
    /// Position and magnitude of one body at the frame epoch.
    pub fn body(&self, body: SolarSystemBody) -> BodyPosition {
        let tjm = self.mjd_tt();
        let (position, magnitude) = match body {
            SolarSystemBody::Sun => (self.sun(), SUN_MAGNITUDE),
            SolarSystemBody::Moon => (self.moon(), moon_magnitude(tjm)),
            SolarSystemBody::Planet(planet) => {
                let (geocentric, magnitude) = planet.geocentric(tjm);
                let (ra, dec) = unit_to_radec(&geocentric);
                (self.from_j2000(ra, dec), magnitude)
            }
        };
        BodyPosition {
            body,
            magnitude,
            position,
        }
    }

    /// Every body of [`SolarSystemBody::ALL`], above the horizon or not.
    ///
    /// See also
    /// ------------
    /// * [`SkyRenderer::render_catalog`](crate::render::SkyRenderer::render_catalog), which
    ///   draws the bodies next to the catalog stars.
    pub fn bodies(&self) -> Vec<BodyPosition> {
        SolarSystemBody::ALL.iter().map(|b| self.body(*b)).collect()
    }
}
