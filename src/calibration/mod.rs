//! # Lens calibration
//!
//! Fits [`CalibrationParameters`] from **reference correspondences**: stars whose
//! topocentric position at capture time is known and whose pixel in the image was
//! identified (by hand, e.g. through [`SkyRenderer::find_star`](crate::render::SkyRenderer::find_star),
//! or by a matcher).
//!
//! ## Procedure
//!
//! 1. **Preconditions**: at least four correspondences whose pixels are not collinear.
//! 2. **Initial guess**: zenith at the image center, horizon circle inscribed in the
//!    shorter image side, no distortion, and a rotation equal to the circular mean of the
//!    observed-minus-predicted position angles.
//! 3. **Pass one** (reweighted): Levenberg–Marquardt over `(cx, cy, radius, rotation)`,
//!    then again with up to two profile coefficients
//!    ([`CalibrationConfig::distortion_terms`]). Between runs every correspondence gets a
//!    Cauchy weight `1 / (1 + (d / (2.385 σ))²)` from its pixel distance `d`, with the
//!    robust scale `σ = 1.4826 × MAD` of the distances about zero. At most
//!    20 reweightings per stage.
//! 4. **Trim**: correspondences farther than `outlier_sigma × σ` from their prediction
//!    are dropped. Since `σ` is a median, a few grossly wrong stars cannot inflate it.
//! 5. **Pass two**: plain least squares, run once on the survivors (on everything when
//!    fewer than four would survive). There is no further iteration.
//! 6. **Validation**: the result must satisfy [`CalibrationParameters::validate`].
//!
//! With [`Handedness::Auto`], the whole procedure runs for both azimuth orientations; the
//! one with the smaller robust scale wins, then the one with the lower RMS.
//!
//! ## Example
//!
//! ```rust,no_run
//! use skycover::calibration::{CalibrationConfig, Calibrator, Handedness, ReferenceObservation};
//!
//! let config = CalibrationConfig::builder()
//!     .image_size(1280, 960)
//!     .distortion_terms(2)
//!     .handedness(Handedness::Auto)
//!     .outlier_sigma(3.0)
//!     .build()?;
//!
//! let observations: Vec<ReferenceObservation> = Vec::new(); // filled from identified stars
//! let fit = Calibrator::new(config).fit(&observations)?;
//! println!("{}", fit.parameters);
//! fit.parameters.save_json("camera.json")?;
//! # Ok::<(), skycover::skycover_errors::SkycoverError>(())
//! ```

pub mod levenberg;

use std::cmp::Ordering::{self, Equal, Greater};
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{Pixel, RADEG};
use crate::ephemeris::TopocentricPosition;
use crate::projection::CalibrationParameters;
use crate::skycover_errors::SkycoverError;

use levenberg::{levenberg_marquardt, residuals, LmSettings};

/// Fewest correspondences that constrain the four geometric parameters with redundancy.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Residuals below this many pixels are never trimmed.
const TRIM_FLOOR_PX: f64 = 1e-3;

/// Reweighting rounds per stage of pass one.
const ROBUST_ROUNDS: usize = 20;

/// Pass one stops reweighting once no weight moves by more than this.
const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Cauchy tuning constant (95 % efficiency on Gaussian residuals).
const CAUCHY_TUNING: f64 = 2.385;

/// MAD → standard deviation for normally distributed data.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Azimuth orientation of the optics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    /// Azimuth increases with the position angle (sky seen from below).
    Normal,
    /// Mirrored image.
    Flipped,
    /// Fit both and keep the one with the smaller robust residual scale.
    Auto,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Normal => write!(f, "normal"),
            Handedness::Flipped => write!(f, "flipped"),
            Handedness::Auto => write!(f, "auto"),
        }
    }
}

/// A star with its computed sky position and the pixel where it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceObservation {
    /// Catalog name, for reporting only.
    pub star: Option<String>,
    /// Topocentric position at capture time.
    pub position: TopocentricPosition,
    pub pixel_x: Pixel,
    pub pixel_y: Pixel,
}

impl ReferenceObservation {
    pub fn new(position: TopocentricPosition, pixel_x: Pixel, pixel_y: Pixel) -> Self {
        ReferenceObservation {
            star: None,
            position,
            pixel_x,
            pixel_y,
        }
    }

    pub fn with_star(mut self, name: impl Into<String>) -> Self {
        self.star = Some(name.into());
        self
    }
}

/// Tunables of the [`Calibrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Width of the calibrated images, pixels.
    pub image_width: u32,
    /// Height of the calibrated images, pixels.
    pub image_height: u32,
    /// Iteration cap of each Levenberg–Marquardt run.
    pub max_iterations: usize,
    /// Convergence on the relative parameter step.
    pub step_tolerance: f64,
    /// Convergence on the relative decrease of the squared residual sum.
    pub cost_tolerance: f64,
    /// Rejection threshold of the trim step, in units of the robust pass-one residual scale.
    pub outlier_sigma: f64,
    /// Number of free profile coefficients: 0 (equidistant), 1 (`k1`) or 2 (`k1`, `k2`).
    pub distortion_terms: usize,
    pub handedness: Handedness,
}

impl CalibrationConfig {
    /// Create a [`CalibrationConfigBuilder`]. The image size has to be set before
    /// [`CalibrationConfigBuilder::build`] accepts it.
    pub fn builder() -> CalibrationConfigBuilder {
        CalibrationConfigBuilder::new()
    }

    fn lm_settings(&self) -> LmSettings {
        LmSettings {
            max_iterations: self.max_iterations,
            step_tolerance: self.step_tolerance,
            cost_tolerance: self.cost_tolerance,
        }
    }
}

/// Fluent, validating builder of [`CalibrationConfig`].
#[derive(Debug, Clone)]
pub struct CalibrationConfigBuilder {
    config: CalibrationConfig,
}

impl Default for CalibrationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CalibrationConfig {
                image_width: 0,
                image_height: 0,
                max_iterations: 200,
                step_tolerance: 1e-10,
                cost_tolerance: 1e-12,
                outlier_sigma: 3.0,
                distortion_terms: 2,
                handedness: Handedness::Auto,
            },
        }
    }

    pub fn image_size(mut self, width: u32, height: u32) -> Self {
        self.config.image_width = width;
        self.config.image_height = height;
        self
    }
    pub fn max_iterations(mut self, v: usize) -> Self {
        self.config.max_iterations = v;
        self
    }
    pub fn step_tolerance(mut self, v: f64) -> Self {
        self.config.step_tolerance = v;
        self
    }
    pub fn cost_tolerance(mut self, v: f64) -> Self {
        self.config.cost_tolerance = v;
        self
    }
    pub fn outlier_sigma(mut self, v: f64) -> Self {
        self.config.outlier_sigma = v;
        self
    }
    pub fn distortion_terms(mut self, v: usize) -> Self {
        self.config.distortion_terms = v;
        self
    }
    pub fn handedness(mut self, v: Handedness) -> Self {
        self.config.handedness = v;
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
    /// * `image_width > 0`, `image_height > 0`.
    /// * `max_iterations ≥ 1`.
    /// * `step_tolerance > 0`, `cost_tolerance ≥ 0`.
    /// * `outlier_sigma > 0`.
    /// * `distortion_terms ≤ 2`.
    ///
    /// Returns
    /// -----------------
    /// * `Err(SkycoverError::InvalidCalibrationParameter)` naming the first violated rule.
    pub fn build(self) -> Result<CalibrationConfig, SkycoverError> {
        let c = &self.config;
        let invalid = |msg: &str| Err(SkycoverError::InvalidCalibrationParameter(msg.into()));

        if c.image_width == 0 || c.image_height == 0 {
            return invalid("image_size must be set to a non-empty size");
        }
        if c.max_iterations == 0 {
            return invalid("max_iterations must be >= 1");
        }
        if !Self::gt0(c.step_tolerance) {
            return invalid("step_tolerance must be > 0");
        }
        if !Self::ge0(c.cost_tolerance) {
            return invalid("cost_tolerance must be >= 0");
        }
        if !Self::gt0(c.outlier_sigma) {
            return invalid("outlier_sigma must be > 0");
        }
        if c.distortion_terms > 2 {
            return invalid("distortion_terms must be 0, 1 or 2");
        }

        Ok(self.config)
    }
}

impl fmt::Display for CalibrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Calibration Configuration")?;
            writeln!(f, "-------------------------")?;
            writeln!(f, "  image_size       = {}x{}", self.image_width, self.image_height)?;
            writeln!(f, "  max_iterations   = {}", self.max_iterations)?;
            writeln!(f, "  step_tolerance   = {:.1e}", self.step_tolerance)?;
            writeln!(f, "  cost_tolerance   = {:.1e}", self.cost_tolerance)?;
            writeln!(f, "  outlier_sigma    = {}", self.outlier_sigma)?;
            writeln!(f, "  distortion_terms = {}", self.distortion_terms)?;
            write!(f, "  handedness       = {}", self.handedness)
        } else {
            write!(
                f,
                "CalibrationConfig(image={}x{}, max_it={}, sigma={}, k_terms={}, handedness={})",
                self.image_width,
                self.image_height,
                self.max_iterations,
                self.outlier_sigma,
                self.distortion_terms,
                self.handedness
            )
        }
    }
}

/// Fit quality summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// RMS of the per-correspondence pixel distance over the inliers.
    pub rms_px: f64,
    /// Number of correspondences in the final fit.
    pub inliers: usize,
    /// Indices (into the input slice) dropped by the trim step.
    pub rejected: Vec<usize>,
    /// Robust residual scale `1.4826 × MAD` after the reweighted pass, pixels.
    pub robust_scale_px: f64,
    /// Levenberg–Marquardt iterations summed over every run of both passes.
    pub iterations: usize,
}

impl CalibrationReport {
    /// Lower robust scale first, then lower RMS.
    fn beats(&self, other: &CalibrationReport) -> bool {
        match self.robust_scale_px.total_cmp(&other.robust_scale_px) {
            Ordering::Less => true,
            Ordering::Equal => self.rms_px < other.rms_px,
            Ordering::Greater => false,
        }
    }
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rms = {:.3} px, {} inliers, {} rejected, {} iterations",
            self.rms_px,
            self.inliers,
            self.rejected.len(),
            self.iterations
        )
    }
}

/// Fitted parameters and how well they fit.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub parameters: CalibrationParameters,
    pub report: CalibrationReport,
}

/// Least-squares calibration of the lens model.
#[derive(Debug, Clone)]
pub struct Calibrator {
    config: CalibrationConfig,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Calibrator { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Fit the lens parameters from scratch.
    ///
    /// Arguments
    /// -----------------
    /// * `observations`: reference correspondences; their order defines the indices of
    ///   [`CalibrationReport::rejected`].
    ///
    /// Return
    /// ----------
    /// * A validated [`CalibrationResult`].
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::InsufficientData`]: fewer than four correspondences, or collinear pixels.
    /// * [`SkycoverError::CalibrationDidNotConverge`]: iteration cap reached.
    /// * [`SkycoverError::DegenerateFit`]: the optimum violates a parameter invariant.
    ///
    /// See also
    /// ------------
    /// * [`Calibrator::refine`] to start from an existing calibration.
    pub fn fit(&self, observations: &[ReferenceObservation]) -> Result<CalibrationResult, SkycoverError> {
        check_preconditions(observations)?;

        let base = CalibrationParameters::initial_guess(
            self.config.image_width,
            self.config.image_height,
        );

        let flips: &[bool] = match self.config.handedness {
            Handedness::Normal => &[false],
            Handedness::Flipped => &[true],
            Handedness::Auto => &[false, true],
        };

        let mut best: Option<CalibrationResult> = None;
        let mut first_error = None;
        for &flipped in flips {
            let mut start = CalibrationParameters { flipped, ..base };
            start.rotation = initial_rotation(&start, observations);

            match self.two_pass(&start, observations) {
                Ok(result) => {
                    debug!(
                        "Handedness {}: {}",
                        if flipped { "flipped" } else { "normal" },
                        result.report
                    );
                    if best.as_ref().map_or(true, |b| result.report.beats(&b.report)) {
                        best = Some(result);
                    }
                }
                Err(err) => {
                    debug!("Handedness flipped={flipped} rejected: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        match (best, first_error) {
            (Some(result), _) => {
                info!("Calibration: {} | {}", result.parameters, result.report);
                Ok(result)
            }
            (None, Some(err)) => Err(err),
            (None, None) => unreachable!("at least one handedness is always tried"),
        }
    }

    /// Refit starting from an existing calibration, keeping its handedness.
    ///
    /// `prior` is left untouched; the refined parameters are returned.
    pub fn refine(
        &self,
        prior: &CalibrationParameters,
        observations: &[ReferenceObservation],
    ) -> Result<CalibrationResult, SkycoverError> {
        check_preconditions(observations)?;
        let result = self.two_pass(prior, observations)?;
        info!("Refined calibration: {} | {}", result.parameters, result.report);
        Ok(result)
    }

    /// Reweighted pass one, trim, least-squares pass two, then validation.
    fn two_pass(
        &self,
        start: &CalibrationParameters,
        observations: &[ReferenceObservation],
    ) -> Result<CalibrationResult, SkycoverError> {
        let all = observations.iter().collect_vec();
        let (first, first_iterations) = self.reweighted(start, &all)?;

        let distances = pixel_distances(&first, &all);
        let scale = robust_scale(&distances);
        let threshold = (self.config.outlier_sigma * scale).max(TRIM_FLOOR_PX);

        let (kept, rejected): (Vec<usize>, Vec<usize>) =
            (0..observations.len()).partition(|&i| distances[i] <= threshold);

        let (inliers, rejected) = if rejected.is_empty() {
            (all, Vec::new())
        } else if kept.len() < MIN_CORRESPONDENCES {
            warn!(
                "Trim would leave {} correspondences, refitting all of them",
                kept.len()
            );
            (all, Vec::new())
        } else {
            debug!("Trim: dropping {rejected:?} (threshold {threshold:.3} px)");
            (kept.iter().map(|&i| &observations[i]).collect_vec(), rejected)
        };

        let unit = vec![1.0; inliers.len()];
        let (parameters, second_iterations) =
            self.run(&first, &inliers, &unit, self.config.distortion_terms)?;
        let iterations = first_iterations + second_iterations;

        parameters.validate()?;

        let report = CalibrationReport {
            rms_px: rms_of(&parameters, &inliers),
            inliers: inliers.len(),
            rejected,
            robust_scale_px: scale,
            iterations,
        };
        Ok(CalibrationResult { parameters, report })
    }

    /// Pass one: geometry alone, then with the profile coefficients, each stage
    /// alternating a weighted fit with a Cauchy reweighting of every correspondence.
    fn reweighted(
        &self,
        start: &CalibrationParameters,
        data: &[&ReferenceObservation],
    ) -> Result<(CalibrationParameters, usize), SkycoverError> {
        let stages: &[usize] = if self.config.distortion_terms == 0 {
            &[0]
        } else {
            &[0, self.config.distortion_terms]
        };

        let mut params = *start;
        let mut weights = vec![1.0; data.len()];
        let mut iterations = 0;
        for &terms in stages {
            for round in 1..=ROBUST_ROUNDS {
                let (fitted, n) = self.run(&params, data, &weights, terms)?;
                params = fitted;
                iterations += n;

                let distances = pixel_distances(&params, data);
                let next = cauchy_weights(&distances, robust_scale(&distances));
                let change = weights
                    .iter()
                    .zip(&next)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                weights = next;

                if change < WEIGHT_TOLERANCE {
                    debug!("Reweighting with {terms} profile terms settled after {round} rounds");
                    break;
                }
            }
        }
        Ok((params, iterations))
    }

    fn run(
        &self,
        start: &CalibrationParameters,
        data: &[&ReferenceObservation],
        weights: &[f64],
        distortion_terms: usize,
    ) -> Result<(CalibrationParameters, usize), SkycoverError> {
        let outcome = levenberg_marquardt(
            start,
            data,
            weights,
            distortion_terms,
            &self.config.lm_settings(),
        );

        if !outcome.converged {
            return Err(SkycoverError::CalibrationDidNotConverge {
                iterations: outcome.iterations,
                last_step: outcome.last_step,
                rms_px: rms_of(&outcome.params, data),
            });
        }
        Ok((outcome.params, outcome.iterations))
    }
}

/// Reject too few or collinear correspondences.
fn check_preconditions(observations: &[ReferenceObservation]) -> Result<(), SkycoverError> {
    let n = observations.len();
    if n < MIN_CORRESPONDENCES {
        return Err(SkycoverError::InsufficientData {
            provided: n,
            required: MIN_CORRESPONDENCES,
            detail: "too few reference correspondences".into(),
        });
    }

    let non_finite = observations.iter().position(|o| {
        !(o.pixel_x.is_finite()
            && o.pixel_y.is_finite()
            && o.position.altitude.is_finite()
            && o.position.azimuth.is_finite())
    });
    if let Some(i) = non_finite {
        return Err(SkycoverError::InsufficientData {
            provided: n,
            required: MIN_CORRESPONDENCES,
            detail: format!("correspondence {i} has non-finite coordinates"),
        });
    }

    if pixels_collinear(observations) {
        return Err(SkycoverError::InsufficientData {
            provided: n,
            required: MIN_CORRESPONDENCES,
            detail: "observed pixels are collinear".into(),
        });
    }
    Ok(())
}

/// Eigenvalues of the pixel scatter matrix: one vanishing direction means a line.
fn pixels_collinear(observations: &[ReferenceObservation]) -> bool {
    let n = observations.len() as f64;
    let mx = observations.iter().map(|o| o.pixel_x).sum::<f64>() / n;
    let my = observations.iter().map(|o| o.pixel_y).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for o in observations {
        let (dx, dy) = (o.pixel_x - mx, o.pixel_y - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let sum = sxx + syy;
    let discriminant = (4.0 * sxy * sxy + (sxx - syy).powi(2)).sqrt();
    let lambda_max = (sum + discriminant) / 2.0;
    let lambda_min = (sum - discriminant) / 2.0;

    lambda_max <= f64::EPSILON || lambda_min <= 1e-9 * lambda_max
}

/// Circular mean of observed-minus-predicted position angles.
fn initial_rotation(start: &CalibrationParameters, observations: &[ReferenceObservation]) -> f64 {
    let (sin_sum, cos_sum) = observations
        .iter()
        .map(|o| {
            let observed = (start.center_x - o.pixel_x).atan2(start.center_y - o.pixel_y);
            let predicted = start.azimuth_sign() * o.position.azimuth;
            (observed - predicted).sin_cos()
        })
        .fold((0.0, 0.0), |(s, c), (ds, dc)| (s + ds, c + dc));

    let rotation = sin_sum.atan2(cos_sum);
    debug!("Initial rotation estimate {:.3} deg", rotation / RADEG);
    rotation
}

fn pixel_distances(p: &CalibrationParameters, data: &[&ReferenceObservation]) -> Vec<f64> {
    let r = residuals(p, data);
    r.as_slice()
        .chunks_exact(2)
        .map(|xy| xy[0].hypot(xy[1]))
        .collect()
}

/// `1.4826 × median(d)`: the MAD of the residual distances about their ideal value, zero.
fn robust_scale(distances: &[f64]) -> f64 {
    let sorted = distances.iter().copied().sorted_by(f64::total_cmp).collect_vec();
    let n = sorted.len();
    let median = match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => 0.5 * (sorted[n / 2 - 1] + sorted[n / 2]),
    };
    (MAD_TO_SIGMA * median).max(TRIM_FLOOR_PX)
}

fn cauchy_weights(distances: &[f64], scale: f64) -> Vec<f64> {
    distances
        .iter()
        .map(|d| 1.0 / (1.0 + (d / (CAUCHY_TUNING * scale)).powi(2)))
        .collect()
}

fn rms(distances: &[f64]) -> f64 {
    if distances.is_empty() {
        return 0.0;
    }
    (distances.iter().map(|d| d * d).sum::<f64>() / distances.len() as f64).sqrt()
}

fn rms_of(p: &CalibrationParameters, data: &[&ReferenceObservation]) -> f64 {
    rms(&pixel_distances(p, data))
}
