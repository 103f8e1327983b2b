//! Damped least squares on the lens parameters.
//!
//! Minimizes `Σ w_i |forward(alt_i, az_i) - pixel_i|²` over the free parameters
//! `(cx, cy, radius, rotation[, k1[, k2]])` with a Levenberg–Marquardt iteration
//! using the analytic Jacobian of [`CalibrationParameters::forward`] and Marquardt's
//! diagonal scaling of the damping term. Unit weights give plain least squares; the
//! calibrator lowers the weights of suspect correspondences in its reweighted pass.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::constants::HALF_PI;
use crate::projection::CalibrationParameters;

use super::ReferenceObservation;

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;

/// Stopping rules of one optimization run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LmSettings {
    pub max_iterations: usize,
    pub step_tolerance: f64,
    pub cost_tolerance: f64,
}

/// Final state of one optimization run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LmOutcome {
    pub params: CalibrationParameters,
    pub iterations: usize,
    pub last_step: f64,
    /// Weighted sum of squared pixel residuals.
    pub cost: f64,
    pub converged: bool,
}

/// Number of optimized values for `distortion_terms` free profile coefficients.
fn dimension(distortion_terms: usize) -> usize {
    4 + distortion_terms.min(2)
}

fn pack(p: &CalibrationParameters, distortion_terms: usize) -> DVector<f64> {
    let all = [
        p.center_x,
        p.center_y,
        p.radius,
        p.rotation,
        p.profile.k1,
        p.profile.k2,
    ];
    DVector::from_column_slice(&all[..dimension(distortion_terms)])
}

fn unpack(
    template: &CalibrationParameters,
    v: &DVector<f64>,
    distortion_terms: usize,
) -> CalibrationParameters {
    let mut p = *template;
    p.center_x = v[0];
    p.center_y = v[1];
    p.radius = v[2];
    p.rotation = v[3];
    if distortion_terms >= 1 {
        p.profile.k1 = v[4];
    }
    if distortion_terms >= 2 {
        p.profile.k2 = v[5];
    }
    p
}

/// Stacked `(x_pred - x_obs, y_pred - y_obs)` for every observation.
pub(crate) fn residuals(p: &CalibrationParameters, data: &[&ReferenceObservation]) -> DVector<f64> {
    let mut r = DVector::zeros(2 * data.len());
    for (i, obs) in data.iter().enumerate() {
        let (x, y) = p.forward(obs.position.altitude, obs.position.azimuth);
        r[2 * i] = x - obs.pixel_x;
        r[2 * i + 1] = y - obs.pixel_y;
    }
    r
}

/// Scale the two rows of observation `i` by `√w_i`.
fn weight_rows(rows: &mut DMatrix<f64>, sqrt_weights: &[f64]) {
    for (i, w) in sqrt_weights.iter().enumerate() {
        rows.row_mut(2 * i).scale_mut(*w);
        rows.row_mut(2 * i + 1).scale_mut(*w);
    }
}

fn weighted_residuals(
    p: &CalibrationParameters,
    data: &[&ReferenceObservation],
    sqrt_weights: &[f64],
) -> DVector<f64> {
    let mut r = residuals(p, data);
    for (i, w) in sqrt_weights.iter().enumerate() {
        r[2 * i] *= w;
        r[2 * i + 1] *= w;
    }
    r
}

/// Analytic Jacobian of [`residuals`] with respect to the packed parameters.
fn jacobian(
    p: &CalibrationParameters,
    data: &[&ReferenceObservation],
    distortion_terms: usize,
) -> DMatrix<f64> {
    let mut j = DMatrix::zeros(2 * data.len(), dimension(distortion_terms));
    let sign = p.azimuth_sign();

    for (i, obs) in data.iter().enumerate() {
        let u = (HALF_PI - obs.position.altitude) / HALF_PI;
        let g = p.profile.eval(u);
        let rho = p.radius * g;
        let (s, c) = (sign * obs.position.azimuth + p.rotation).sin_cos();
        let (rx, ry) = (2 * i, 2 * i + 1);

        j[(rx, 0)] = 1.0;
        j[(ry, 1)] = 1.0;
        j[(rx, 2)] = -g * s;
        j[(ry, 2)] = -g * c;
        j[(rx, 3)] = -rho * c;
        j[(ry, 3)] = rho * s;

        if distortion_terms >= 1 {
            let (dk1, dk2) = p.profile.coefficient_gradient(u);
            j[(rx, 4)] = -p.radius * dk1 * s;
            j[(ry, 4)] = -p.radius * dk1 * c;
            if distortion_terms >= 2 {
                j[(rx, 5)] = -p.radius * dk2 * s;
                j[(ry, 5)] = -p.radius * dk2 * c;
            }
        }
    }
    j
}

/// Run Levenberg–Marquardt from `start`.
///
/// Arguments
/// -----------------
/// * `start`: initial parameters; its handedness and image size are kept fixed.
/// * `data`: correspondences entering the fit.
/// * `weights`: one non-negative weight per correspondence.
/// * `distortion_terms`: number of free profile coefficients (0, 1 or 2); fixed ones keep
///   their value from `start`.
/// * `settings`: iteration cap and tolerances.
///
/// Return
/// ----------
/// * The last accepted parameters with the iteration count. `converged` is false only
///   when the iteration cap was reached.
pub(crate) fn levenberg_marquardt(
    start: &CalibrationParameters,
    data: &[&ReferenceObservation],
    weights: &[f64],
    distortion_terms: usize,
    settings: &LmSettings,
) -> LmOutcome {
    debug_assert_eq!(weights.len(), data.len());
    let sqrt_weights: Vec<f64> = weights.iter().map(|w| w.max(0.0).sqrt()).collect();

    let mut current = *start;
    let mut x = pack(&current, distortion_terms);
    let mut r = weighted_residuals(&current, data, &sqrt_weights);
    let mut cost = r.norm_squared();
    let mut lambda = LAMBDA_START;
    let mut last_step = f64::INFINITY;

    for iteration in 1..=settings.max_iterations {
        let mut j = jacobian(&current, data, distortion_terms);
        weight_rows(&mut j, &sqrt_weights);
        let jtj = j.tr_mul(&j);
        let rhs = -j.tr_mul(&r);

        let mut accepted = None;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj.clone();
            for k in 0..damped.nrows() {
                damped[(k, k)] += lambda * jtj[(k, k)].max(LAMBDA_MIN);
            }

            let Some(step) = damped.cholesky().map(|c| c.solve(&rhs)) else {
                lambda *= 10.0;
                continue;
            };

            let candidate_x = &x + &step;
            let candidate = unpack(&current, &candidate_x, distortion_terms);
            let candidate_r = weighted_residuals(&candidate, data, &sqrt_weights);
            let candidate_cost = candidate_r.norm_squared();

            if candidate.radius > 0.0 && candidate_cost.is_finite() && candidate_cost < cost {
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                accepted = Some((candidate_x, candidate, candidate_r, candidate_cost, step.norm()));
                break;
            }
            lambda *= 10.0;
        }

        // No descent direction left: the current point is a minimum.
        let Some((new_x, new_params, new_r, new_cost, step_norm)) = accepted else {
            debug!("LM stalled at iteration {iteration}, cost {cost:.6e}");
            return LmOutcome {
                params: current,
                iterations: iteration,
                last_step: 0.0,
                cost,
                converged: true,
            };
        };

        let cost_change = cost - new_cost;
        let relative_step = step_norm / (x.norm() + settings.step_tolerance);

        x = new_x;
        current = new_params;
        r = new_r;
        cost = new_cost;
        last_step = step_norm;

        debug!(
            "LM iteration {iteration}: cost {cost:.6e}, step {step_norm:.3e}, lambda {lambda:.1e}"
        );

        if relative_step < settings.step_tolerance
            || cost_change <= settings.cost_tolerance * cost
            || cost == 0.0
        {
            return LmOutcome {
                params: current,
                iterations: iteration,
                last_step,
                cost,
                converged: true,
            };
        }
    }

    LmOutcome {
        params: current,
        iterations: settings.max_iterations,
        last_step,
        cost,
        converged: false,
    }
}
