//! # Cloud detection
//!
//! Decides, star by star, whether the catalog stars that should be visible in a frame
//! actually are, and turns the verdicts into a cloud-coverage fraction.
//!
//! ## Per-star pipeline
//!
//! 1. Topocentric position at the frame epoch. `altitude ≤ 0` → [`Visibility::BelowHorizon`].
//! 2. Forward projection through the calibration. Outside the image, on a non-sky mask
//!    pixel, or (when configured) closer to the Moon than `moon_exclusion_radius` →
//!    [`Visibility::MaskedOut`].
//! 3. Neighborhood photometry ([`SkyImage::sample`]): disk peak against the annulus median.
//! 4. The signal is compared with a magnitude-scaled requirement:
//!
//! ```text
//! required = max(min_signal, threshold · 10^(-0.4 · (mag - reference_magnitude)))
//! ```
//!
//!    `signal ≥ required` → [`Visibility::Visible`], otherwise [`Visibility::Occluded`].
//!
//! ## Coverage
//!
//! `occluded / (visible + occluded)`; below-horizon and masked-out stars do not count.
//! With no contributing star the coverage is undefined (`None`), never zero.
//!
//! ## Example
//!
//! ```rust,no_run
//! use skycover::catalog::StarCatalog;
//! use skycover::detection::{CloudDetector, DetectorConfig};
//! use skycover::ephemeris::ObserverLocation;
//! use skycover::frame::SkyImage;
//! use skycover::mask::SkyMask;
//! use skycover::projection::CalibrationParameters;
//! use skycover::time::utc_epoch;
//!
//! let catalog = StarCatalog::load("data/bright_stars.edb")?.filter_magnitude(4.0);
//! let params = CalibrationParameters::load_json("camera.json")?;
//! let image = SkyImage::load("frames/2024-01-25T22-00-00.png")?;
//! let mask = SkyMask::load("mask.png")?;
//! let observer = ObserverLocation::from_degrees(48.15, 11.58, 520.0)?;
//!
//! let detector = CloudDetector::new(DetectorConfig::builder().threshold(60.0).build()?);
//! let report = detector.evaluate(
//!     &image,
//!     &utc_epoch(2024, 1, 25, 22, 0, 0),
//!     &observer,
//!     &catalog,
//!     &mask,
//!     &params,
//! )?;
//! println!("{report}");
//! # Ok::<(), skycover::skycover_errors::SkycoverError>(())
//! ```

pub mod report;

use std::cmp::Ordering::{Equal, Greater};
use std::f64::consts::PI;
use std::fmt;

use hifitime::Epoch;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::StarCatalog;
use crate::constants::{Magnitude, Pixel, Radian, RADEG};
use crate::ephemeris::{HorizonFrame, ObserverLocation, TopocentricPosition};
use crate::frame::{pixel_index, NeighborhoodSample, SampleGeometry, SkyImage};
use crate::mask::SkyMask;
use crate::projection::CalibrationParameters;
use crate::skycover_errors::SkycoverError;

/// Verdict for one catalog star in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    Occluded,
    BelowHorizon,
    MaskedOut,
}

impl Visibility {
    /// Whether the verdict enters the coverage fraction.
    pub fn contributes(&self) -> bool {
        matches!(self, Visibility::Visible | Visibility::Occluded)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Visible => "visible",
            Visibility::Occluded => "occluded",
            Visibility::BelowHorizon => "below_horizon",
            Visibility::MaskedOut => "masked_out",
        };
        f.write_str(s)
    }
}

/// Photometric thresholds and sampling geometry of the [`CloudDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Radius of the sampled disk around the star pixel.
    pub sample_radius: Pixel,
    /// Inner radius of the background annulus.
    pub background_inner: Pixel,
    /// Outer radius of the background annulus.
    pub background_outer: Pixel,
    /// Required signal (0–255 scale) for a star of `reference_magnitude`.
    pub threshold: f64,
    pub reference_magnitude: Magnitude,
    /// Floor of the required signal, whatever the magnitude.
    pub min_signal: f64,
    /// Stars closer than this to an above-horizon Moon are masked out.
    pub moon_exclusion_radius: Option<Radian>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            sample_radius: 3.0,
            background_inner: 5.0,
            background_outer: 8.0,
            threshold: 40.0,
            reference_magnitude: 0.0,
            min_signal: 5.0,
            moon_exclusion_radius: None,
        }
    }
}

impl DetectorConfig {
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::new()
    }

    /// Signal a star of magnitude `magnitude` must reach to count as visible.
    ///
    /// Scales with the expected flux ratio to the reference magnitude.
    pub fn required_signal(&self, magnitude: Magnitude) -> f64 {
        let scaled = self.threshold * 10f64.powf(-0.4 * (magnitude - self.reference_magnitude));
        scaled.max(self.min_signal)
    }

    fn geometry(&self) -> SampleGeometry {
        SampleGeometry {
            radius: self.sample_radius,
            inner: self.background_inner,
            outer: self.background_outer,
        }
    }
}

impl fmt::Display for DetectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let moon = match self.moon_exclusion_radius {
            Some(r) => format!("{:.1}°", r / RADEG),
            None => "off".to_string(),
        };
        if f.alternate() {
            writeln!(f, "Cloud Detector Configuration")?;
            writeln!(f, "----------------------------")?;
            writeln!(f, "  sample_radius         = {} px", self.sample_radius)?;
            writeln!(
                f,
                "  background annulus    = ({}, {}] px",
                self.background_inner, self.background_outer
            )?;
            writeln!(
                f,
                "  threshold             = {} at mag {}",
                self.threshold, self.reference_magnitude
            )?;
            writeln!(f, "  min_signal            = {}", self.min_signal)?;
            write!(f, "  moon_exclusion_radius = {moon}")
        } else {
            write!(
                f,
                "DetectorConfig(r={}, annulus=({}, {}], threshold={}@{}, min_signal={}, moon={moon})",
                self.sample_radius,
                self.background_inner,
                self.background_outer,
                self.threshold,
                self.reference_magnitude,
                self.min_signal
            )
        }
    }
}

/// Fluent, validating builder of [`DetectorConfig`].
#[derive(Debug, Clone, Default)]
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_radius(mut self, v: Pixel) -> Self {
        self.config.sample_radius = v;
        self
    }
    pub fn background_annulus(mut self, inner: Pixel, outer: Pixel) -> Self {
        self.config.background_inner = inner;
        self.config.background_outer = outer;
        self
    }
    pub fn threshold(mut self, v: f64) -> Self {
        self.config.threshold = v;
        self
    }
    pub fn reference_magnitude(mut self, v: Magnitude) -> Self {
        self.config.reference_magnitude = v;
        self
    }
    pub fn min_signal(mut self, v: f64) -> Self {
        self.config.min_signal = v;
        self
    }
    pub fn moon_exclusion_radius(mut self, v: Option<Radian>) -> Self {
        self.config.moon_exclusion_radius = v;
        self
    }

    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `sample_radius > 0`.
    /// * `sample_radius ≤ background_inner < background_outer`.
    /// * `threshold ≥ 0`, `min_signal ≥ 0`, `reference_magnitude` finite.
    /// * `moon_exclusion_radius`, when set, in `(0, π]`.
    pub fn build(self) -> Result<DetectorConfig, SkycoverError> {
        let c = &self.config;
        let invalid = |msg: &str| Err(SkycoverError::InvalidDetectorParameter(msg.into()));

        if !Self::gt0(c.sample_radius) {
            return invalid("sample_radius must be > 0");
        }
        if !(c.background_inner >= c.sample_radius && c.background_outer > c.background_inner) {
            return invalid("require sample_radius <= background_inner < background_outer");
        }
        if !Self::ge0(c.threshold) {
            return invalid("threshold must be >= 0");
        }
        if !Self::ge0(c.min_signal) {
            return invalid("min_signal must be >= 0");
        }
        if !c.reference_magnitude.is_finite() {
            return invalid("reference_magnitude must be finite");
        }
        if let Some(r) = c.moon_exclusion_radius {
            if !(Self::gt0(r) && r <= PI) {
                return invalid("moon_exclusion_radius must be in (0, pi]");
            }
        }

        Ok(self.config)
    }
}

/// One catalog star in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarObservation {
    pub name: String,
    pub magnitude: Magnitude,
    pub position: TopocentricPosition,
    /// Projected pixel; `None` for stars below the horizon.
    pub pixel: Option<(Pixel, Pixel)>,
    /// Photometry; present for visible and occluded stars only.
    pub sample: Option<NeighborhoodSample>,
    /// Requirement the signal was compared with; present when `sample` is.
    pub required_signal: Option<f64>,
    pub visibility: Visibility,
}

/// Verdict counts and the resulting cloud fraction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageEstimate {
    /// `occluded / (visible + occluded)`, `None` when no star contributes.
    pub fraction: Option<f64>,
    pub visible: usize,
    pub occluded: usize,
    pub below_horizon: usize,
    pub masked_out: usize,
}

impl CoverageEstimate {
    pub fn from_observations(observations: &[StarObservation]) -> Self {
        let mut estimate = CoverageEstimate::default();
        for obs in observations {
            match obs.visibility {
                Visibility::Visible => estimate.visible += 1,
                Visibility::Occluded => estimate.occluded += 1,
                Visibility::BelowHorizon => estimate.below_horizon += 1,
                Visibility::MaskedOut => estimate.masked_out += 1,
            }
        }
        let contributing = estimate.contributing();
        estimate.fraction =
            (contributing > 0).then(|| estimate.occluded as f64 / contributing as f64);
        estimate
    }

    /// Stars entering the fraction.
    pub fn contributing(&self) -> usize {
        self.visible + self.occluded
    }
}

/// Result of evaluating one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub epoch: Epoch,
    /// One entry per catalog star, in catalog order.
    pub observations: Vec<StarObservation>,
    pub coverage: CoverageEstimate,
    /// Sun altitude, radians. Twilight frames can be flagged by the caller.
    pub sun_altitude: Radian,
    pub moon_altitude: Radian,
}

/// A star placed on the local sky of one frame.
struct Target<'a> {
    name: &'a str,
    magnitude: Magnitude,
    position: TopocentricPosition,
}

/// An image with its capture time, input of [`CloudDetector::evaluate_batch`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: SkyImage,
    pub epoch: Epoch,
}

/// Star-based cloud detector.
#[derive(Debug, Clone, Default)]
pub struct CloudDetector {
    config: DetectorConfig,
}

impl CloudDetector {
    pub fn new(config: DetectorConfig) -> Self {
        CloudDetector { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Evaluate every catalog star in one frame.
    ///
    /// Arguments
    /// -----------------
    /// * `image`: the frame, same size as the calibration and the mask.
    /// * `epoch`: capture time (UTC).
    /// * `observer`: camera location.
    /// * `catalog`: stars to test, typically pre-filtered by magnitude.
    /// * `mask`: sky mask.
    /// * `params`: lens calibration.
    ///
    /// Return
    /// ----------
    /// * A [`FrameReport`] with one [`StarObservation`] per catalog star.
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::DimensionMismatch`] if the mask or the calibration does not
    ///   match the image size.
    pub fn evaluate(
        &self,
        image: &SkyImage,
        epoch: &Epoch,
        observer: &ObserverLocation,
        catalog: &StarCatalog,
        mask: &SkyMask,
        params: &CalibrationParameters,
    ) -> Result<FrameReport, SkycoverError> {
        let dims = image.dimensions();
        if mask.dimensions() != dims {
            return Err(SkycoverError::DimensionMismatch {
                what: "sky mask",
                expected: dims,
                found: mask.dimensions(),
            });
        }
        let calibrated = (params.image_width, params.image_height);
        if calibrated != dims {
            return Err(SkycoverError::DimensionMismatch {
                what: "calibration",
                expected: dims,
                found: calibrated,
            });
        }

        let horizon = HorizonFrame::new(observer, epoch);
        let targets = catalog.iter().map(|star| Target {
            name: &star.name,
            magnitude: star.magnitude,
            position: horizon.topocentric(star),
        });
        Ok(self.assess(epoch, &horizon, targets, image, mask, params))
    }

    /// Verdicts and coverage for targets already placed on the local sky.
    fn assess<'a>(
        &self,
        epoch: &Epoch,
        horizon: &HorizonFrame,
        targets: impl Iterator<Item = Target<'a>>,
        image: &SkyImage,
        mask: &SkyMask,
        params: &CalibrationParameters,
    ) -> FrameReport {
        let sun = horizon.sun();
        let moon = horizon.moon();
        let glare = self
            .config
            .moon_exclusion_radius
            .filter(|_| moon.is_above_horizon())
            .map(|radius| (moon, radius));

        let observations: Vec<StarObservation> = targets
            .map(|target| self.observe(target, image, mask, params, glare))
            .collect();
        let coverage = CoverageEstimate::from_observations(&observations);

        debug!(
            "Frame {epoch}: {} visible, {} occluded, {} below horizon, {} masked",
            coverage.visible, coverage.occluded, coverage.below_horizon, coverage.masked_out
        );

        FrameReport {
            epoch: *epoch,
            observations,
            coverage,
            sun_altitude: sun.altitude,
            moon_altitude: moon.altitude,
        }
    }

    /// Evaluate independent frames in parallel, sharing the read-only inputs.
    ///
    /// Results keep the order of `frames`; one failing frame does not affect the others.
    pub fn evaluate_batch(
        &self,
        frames: &[Frame],
        observer: &ObserverLocation,
        catalog: &StarCatalog,
        mask: &SkyMask,
        params: &CalibrationParameters,
    ) -> Vec<Result<FrameReport, SkycoverError>> {
        let reports: Vec<_> = frames
            .par_iter()
            .map(|frame| self.evaluate(&frame.image, &frame.epoch, observer, catalog, mask, params))
            .collect();

        info!(
            "Evaluated {} frames ({} failed)",
            reports.len(),
            reports.iter().filter(|r| r.is_err()).count()
        );
        reports
    }

    fn observe(
        &self,
        target: Target<'_>,
        image: &SkyImage,
        mask: &SkyMask,
        params: &CalibrationParameters,
        glare: Option<(TopocentricPosition, Radian)>,
    ) -> StarObservation {
        let position = target.position;
        let mut observation = StarObservation {
            name: target.name.to_string(),
            magnitude: target.magnitude,
            position,
            pixel: None,
            sample: None,
            required_signal: None,
            visibility: Visibility::BelowHorizon,
        };
        if !position.is_above_horizon() {
            return observation;
        }

        let (x, y) = params.forward(position.altitude, position.azimuth);
        observation.pixel = Some((x, y));
        observation.visibility = Visibility::MaskedOut;

        let Some((col, row)) = pixel_index(x, y, image.width(), image.height()) else {
            return observation;
        };
        if !mask.is_sky(col, row) {
            return observation;
        }
        if let Some((moon, radius)) = glare {
            if position.separation(&moon) < radius {
                return observation;
            }
        }
        let Some(sample) = image.sample(col, row, &self.config.geometry()) else {
            return observation;
        };

        let required = self.config.required_signal(target.magnitude);
        observation.visibility = if sample.signal() as f64 >= required {
            Visibility::Visible
        } else {
            Visibility::Occluded
        };
        observation.sample = Some(sample);
        observation.required_signal = Some(required);
        observation
    }
}
