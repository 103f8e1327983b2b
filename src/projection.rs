//! # All-sky lens projection
//!
//! Parametric mapping between local horizontal coordinates (altitude, azimuth) and
//! image pixels for a fisheye camera looking at the zenith.
//!
//! ## Model
//!
//! With the normalized zenith distance `u = (π/2 - alt) / (π/2)` (0 at zenith, 1 on the
//! horizon), the radial distance from the optical center is
//!
//! ```text
//! ρ(u) = radius · g(u),   g(u) = u + k1·(u² - u) + k2·(u³ - u)
//! ```
//!
//! so that `g(0) = 0` and `g(1) = 1` for every coefficient pair: `radius` is always the
//! pixel radius of the horizon circle, and `(k1, k2)` only bend the profile in between.
//! `k1 = k2 = 0` is the ideal equidistant fisheye.
//!
//! The position angle is `φ = s·azimuth + rotation` with `s = +1`, or `-1` for mirrored
//! optics, and the pixel is
//!
//! ```text
//! x = cx - ρ·sin φ
//! y = cy - ρ·cos φ
//! ```
//!
//! With `s = +1` and `rotation = 0`, North points up and East points left, i.e. the
//! sky as seen from below.
//!
//! ## Invariants
//!
//! A usable parameter set ([`CalibrationParameters::validate`]) has finite fields, its
//! center inside the image, `0 < radius ≤ image diagonal`, and a non-decreasing
//! profile over `u ∈ [0, 1]`. Forward and inverse are then mutual inverses over the
//! visible hemisphere.
//!
//! Below-horizon or non-finite inputs are not errors: they simply map outside the
//! image (or to NaN), and callers bounds-check the result.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::constants::{Pixel, Radian, DPI, HALF_PI, RADEG};
use crate::skycover_errors::{FitInvariant, SkycoverError};

/// Zenith-distance distortion profile `g(u) = u + k1·(u² - u) + k2·(u³ - u)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RadialProfile {
    pub k1: f64,
    pub k2: f64,
}

impl RadialProfile {
    pub fn new(k1: f64, k2: f64) -> Self {
        RadialProfile { k1, k2 }
    }

    /// Ideal equidistant profile.
    pub fn equidistant() -> Self {
        Self::default()
    }

    /// Normalized radius at normalized zenith distance `u`.
    #[inline]
    pub fn eval(&self, u: f64) -> f64 {
        let u2 = u * u;
        u + self.k1 * (u2 - u) + self.k2 * (u2 * u - u)
    }

    /// Derivative `dg/du`.
    #[inline]
    pub fn slope(&self, u: f64) -> f64 {
        1.0 + self.k1 * (2.0 * u - 1.0) + self.k2 * (3.0 * u * u - 1.0)
    }

    /// Partial derivatives `(∂g/∂k1, ∂g/∂k2)` at `u`.
    #[inline]
    pub fn coefficient_gradient(&self, u: f64) -> (f64, f64) {
        let u2 = u * u;
        (u2 - u, u2 * u - u)
    }

    /// Smallest slope over `[0, 1]` and where it occurs.
    ///
    /// The slope is a quadratic in `u`, so the minimum is at an endpoint or at the vertex.
    pub fn min_slope(&self) -> (f64, f64) {
        let mut candidates = vec![0.0, 1.0];
        if self.k2 != 0.0 {
            let vertex = -self.k1 / (3.0 * self.k2);
            if vertex > 0.0 && vertex < 1.0 {
                candidates.push(vertex);
            }
        }
        candidates
            .into_iter()
            .map(|u| (u, self.slope(u)))
            .fold((0.0, f64::INFINITY), |best, cur| {
                if cur.1 < best.1 {
                    cur
                } else {
                    best
                }
            })
    }

    /// Check that the profile never decreases between zenith and horizon.
    pub fn check_monotonic(&self) -> Result<(), FitInvariant> {
        let (u, slope) = self.min_slope();
        if slope < 0.0 || !slope.is_finite() {
            return Err(FitInvariant::NonMonotonicProfile {
                zenith_deg: u * 90.0,
                slope,
            });
        }
        Ok(())
    }

    /// Solve `g(u) = target` for `u ≥ 0`.
    ///
    /// Newton iteration kept inside a bisection bracket, so flat spots of a
    /// non-decreasing profile cannot throw it off. Targets beyond the horizon are
    /// bracketed by doubling up to `u = 2` (the nadir); past that the bracket end is
    /// returned as is.
    pub fn invert(&self, target: f64) -> f64 {
        if target <= 0.0 {
            return 0.0;
        }
        if !target.is_finite() {
            return f64::NAN;
        }

        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        while self.eval(hi) < target {
            lo = hi;
            hi *= 2.0;
            if hi > 2.0 {
                return hi;
            }
        }

        let mut u = lo + (hi - lo) * 0.5;
        for _ in 0..100 {
            let f = self.eval(u) - target;
            if f.abs() < 1e-15 {
                break;
            }
            if f > 0.0 {
                hi = u;
            } else {
                lo = u;
            }

            let df = self.slope(u);
            let newton = u - f / df;
            u = if df > 0.0 && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };

            if hi - lo < 1e-15 {
                break;
            }
        }
        u
    }
}

/// Fitted optical geometry of an all-sky camera.
///
/// Produced by the [`Calibrator`](crate::calibration::Calibrator), consumed by the
/// [`CloudDetector`](crate::detection::CloudDetector). Persisted as a flat JSON record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    /// Optical center (zenith) column, pixels.
    pub center_x: Pixel,
    /// Optical center (zenith) row, pixels.
    pub center_y: Pixel,
    /// Pixel radius of the horizon circle.
    pub radius: Pixel,
    /// Position angle offset, radians.
    pub rotation: Radian,
    /// Zenith-distance distortion.
    pub profile: RadialProfile,
    /// Mirrored azimuth axis.
    pub flipped: bool,
    /// Width of the images this calibration applies to.
    pub image_width: u32,
    /// Height of the images this calibration applies to.
    pub image_height: u32,
}

impl CalibrationParameters {
    /// Starting point derived from the image dimensions: zenith at the image center,
    /// horizon circle inscribed in the shorter side, no rotation, no distortion.
    pub fn initial_guess(image_width: u32, image_height: u32) -> Self {
        CalibrationParameters {
            center_x: image_width as f64 / 2.0,
            center_y: image_height as f64 / 2.0,
            radius: image_width.min(image_height) as f64 / 2.0,
            rotation: 0.0,
            profile: RadialProfile::equidistant(),
            flipped: false,
            image_width,
            image_height,
        }
    }

    /// `+1` for direct optics, `-1` for mirrored ones.
    #[inline]
    pub fn azimuth_sign(&self) -> f64 {
        if self.flipped {
            -1.0
        } else {
            1.0
        }
    }

    /// Project horizontal coordinates to pixel coordinates.
    ///
    /// Arguments
    /// -----------------
    /// * `altitude`, `azimuth`: radians, azimuth from North through East.
    ///
    /// Return
    /// ----------
    /// * `(x, y)` in pixels. Not bounds-checked: below-horizon targets land outside the
    ///   horizon circle and possibly outside the image.
    pub fn forward(&self, altitude: Radian, azimuth: Radian) -> (Pixel, Pixel) {
        let u = (HALF_PI - altitude) / HALF_PI;
        let rho = self.radius * self.profile.eval(u);
        let phi = self.azimuth_sign() * azimuth + self.rotation;
        let (s, c) = phi.sin_cos();
        (self.center_x - rho * s, self.center_y - rho * c)
    }

    /// Recover horizontal coordinates from pixel coordinates.
    ///
    /// Return
    /// ----------
    /// * `(altitude, azimuth)` in radians, azimuth in `[0, 2π)`. At the optical center the
    ///   azimuth is undefined and reported as the value for a zero position angle.
    pub fn inverse(&self, x: Pixel, y: Pixel) -> (Radian, Radian) {
        let dx = self.center_x - x;
        let dy = self.center_y - y;
        let rho = dx.hypot(dy);
        let phi = dx.atan2(dy);

        let azimuth = (self.azimuth_sign() * (phi - self.rotation)).rem_euclid(DPI);
        let u = self.profile.invert(rho / self.radius);
        (HALF_PI - u * HALF_PI, azimuth)
    }

    /// True when `(x, y)` rounds to a pixel of the calibrated image.
    pub fn contains(&self, x: Pixel, y: Pixel) -> bool {
        let (w, h) = (self.image_width as f64, self.image_height as f64);
        x >= -0.5 && x < w - 0.5 && y >= -0.5 && y < h - 0.5
    }

    /// Check every invariant of a usable calibration.
    ///
    /// Errors
    /// ----------
    /// * the first violated [`FitInvariant`].
    pub fn validate(&self) -> Result<(), FitInvariant> {
        let fields = [
            ("center_x", self.center_x),
            ("center_y", self.center_y),
            ("radius", self.radius),
            ("rotation", self.rotation),
            ("k1", self.profile.k1),
            ("k2", self.profile.k2),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(FitInvariant::NonFinite(name));
        }

        let (width, height) = (self.image_width, self.image_height);
        if width == 0 || height == 0 {
            return Err(FitInvariant::EmptyImage { width, height });
        }

        let inside_x = self.center_x >= 0.0 && self.center_x <= width as f64;
        let inside_y = self.center_y >= 0.0 && self.center_y <= height as f64;
        if !(inside_x && inside_y) {
            return Err(FitInvariant::CenterOutOfBounds {
                x: self.center_x,
                y: self.center_y,
                width,
                height,
            });
        }

        let max_radius = (width as f64).hypot(height as f64);
        if self.radius <= 0.0 || self.radius > max_radius {
            return Err(FitInvariant::RadiusOutOfRange {
                radius: self.radius,
                max: max_radius,
            });
        }

        self.profile.check_monotonic()
    }

    /// Write the parameters as a pretty-printed JSON record.
    pub fn save_json(&self, path: impl AsRef<Utf8Path>) -> Result<(), SkycoverError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SkycoverError::SourceUnavailable {
            what: "calibration record",
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read and validate a JSON record written by [`CalibrationParameters::save_json`].
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::SourceUnavailable`] if the file cannot be opened,
    /// * [`SkycoverError::Serialization`] if the record is malformed,
    /// * [`SkycoverError::DegenerateFit`] if the stored parameters violate an invariant.
    pub fn load_json(path: impl AsRef<Utf8Path>) -> Result<Self, SkycoverError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SkycoverError::SourceUnavailable {
            what: "calibration record",
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let params: CalibrationParameters = serde_json::from_reader(BufReader::new(file))?;
        params.validate()?;
        Ok(params)
    }
}

impl fmt::Display for CalibrationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "center=({:.2}, {:.2}) px, radius={:.2} px, rotation={:.3}°, k1={:.4}, k2={:.4}, flipped={}, image={}x{}",
            self.center_x,
            self.center_y,
            self.radius,
            self.rotation / RADEG,
            self.profile.k1,
            self.profile.k2,
            self.flipped,
            self.image_width,
            self.image_height
        )
    }
}

#[cfg(test)]
mod projection_test {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_params() -> CalibrationParameters {
        CalibrationParameters {
            center_x: 322.4,
            center_y: 236.8,
            radius: 231.0,
            rotation: 0.37,
            profile: RadialProfile::new(-0.12, 0.05),
            flipped: false,
            image_width: 640,
            image_height: 480,
        }
    }

    fn angle_diff(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(DPI);
        d.min(DPI - d)
    }

    #[test]
    fn test_roundtrip_grid() {
        for flipped in [false, true] {
            let params = CalibrationParameters {
                flipped,
                ..sample_params()
            };
            for i in 0..=17 {
                let alt = (1.0 + 5.0 * i as f64) * RADEG;
                for j in 0..24 {
                    let az = (15.0 * j as f64 + 3.0) * RADEG;
                    let (x, y) = params.forward(alt, az);
                    let (alt_back, az_back) = params.inverse(x, y);
                    assert!((alt_back - alt).abs() < 1e-6, "alt {alt} -> {alt_back}");
                    assert!(angle_diff(az_back, az) < 1e-6, "az {az} -> {az_back}");
                }
            }
        }
    }

    #[test]
    fn test_zenith_maps_to_center() {
        let params = sample_params();
        let (x, y) = params.forward(HALF_PI, 1.234);
        assert_relative_eq!(x, params.center_x, epsilon = 1e-9);
        assert_relative_eq!(y, params.center_y, epsilon = 1e-9);
    }

    #[test]
    fn test_horizon_lies_on_radius() {
        let params = sample_params();
        let (x, y) = params.forward(0.0, 2.0);
        let rho = (x - params.center_x).hypot(y - params.center_y);
        assert_relative_eq!(rho, params.radius, epsilon = 1e-9);
    }

    #[test]
    fn test_orientation_north_up_east_left() {
        let params = CalibrationParameters::initial_guess(512, 512);
        let (xn, yn) = params.forward(45.0 * RADEG, 0.0);
        assert_relative_eq!(xn, 256.0, epsilon = 1e-9);
        assert!(yn < 256.0);
        let (xe, ye) = params.forward(45.0 * RADEG, HALF_PI);
        assert!(xe < 256.0);
        assert_relative_eq!(ye, 256.0, epsilon = 1e-9);

        let mirrored = CalibrationParameters {
            flipped: true,
            ..params
        };
        let (xe, _) = mirrored.forward(45.0 * RADEG, HALF_PI);
        assert!(xe > 256.0);
    }

    #[test]
    fn test_below_horizon_is_outside_circle() {
        let params = sample_params();
        let (x, y) = params.forward(-10.0 * RADEG, 0.5);
        let rho = (x - params.center_x).hypot(y - params.center_y);
        assert!(rho > params.radius);
    }

    #[test]
    fn test_profile_monotonicity() {
        assert!(RadialProfile::new(0.3, -0.2).check_monotonic().is_ok());
        let bent = RadialProfile::new(0.0, 2.0);
        // slope at u=0 is 1 - k2 = -1
        assert!(matches!(
            bent.check_monotonic(),
            Err(FitInvariant::NonMonotonicProfile { .. })
        ));
    }

    #[test]
    fn test_profile_invert_flat_spot() {
        // slope vanishes at u = 0 but the profile is still non-decreasing
        let profile = RadialProfile::new(0.5, 0.5);
        assert!(profile.check_monotonic().is_ok());
        for &u in &[0.01, 0.2, 0.5, 0.9, 1.0] {
            assert_relative_eq!(profile.invert(profile.eval(u)), u, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_validate_rejects_invariants() {
        let ok = sample_params();
        assert!(ok.validate().is_ok());

        let off_center = CalibrationParameters {
            center_x: -3.0,
            ..ok
        };
        assert!(matches!(
            off_center.validate(),
            Err(FitInvariant::CenterOutOfBounds { .. })
        ));

        let huge = CalibrationParameters {
            radius: 1e4,
            ..ok
        };
        assert!(matches!(
            huge.validate(),
            Err(FitInvariant::RadiusOutOfRange { .. })
        ));

        let nan = CalibrationParameters {
            rotation: f64::NAN,
            ..ok
        };
        assert_eq!(nan.validate(), Err(FitInvariant::NonFinite("rotation")));
    }

    #[test]
    fn test_contains() {
        let params = CalibrationParameters::initial_guess(100, 50);
        assert!(params.contains(0.0, 0.0));
        assert!(params.contains(99.4, 49.4));
        assert!(!params.contains(99.6, 10.0));
        assert!(!params.contains(f64::NAN, 10.0));
    }
}
