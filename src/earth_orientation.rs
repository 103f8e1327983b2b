use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::constants::{Radian, DPI, JULIAN_CENTURY, MJD, RADEG, T2000};

/// Elementary active rotation of angle `alpha` around one of the coordinate axes.
///
/// Arguments
/// ---------
/// * `alpha`: rotation angle in radians (counter-clockwise when looking down the axis).
/// * `axis`: `0` → X-axis, `1` → Y-axis, `2` → Z-axis.
///
/// Returns
/// --------
/// * A 3×3 orthonormal matrix `R` such that the rotated vector is `x' = R · x`.
///
/// # Panics
///
/// Panics if `axis > 2`.
pub fn rotmt(alpha: Radian, axis: usize) -> Matrix3<f64> {
    let axis = match axis {
        0 => Vector3::x_axis(),
        1 => Vector3::y_axis(),
        2 => Vector3::z_axis(),
        _ => panic!("rotmt: invalid axis index {axis} (must be 0, 1 or 2)"),
    };

    Rotation3::from_axis_angle(&axis, alpha).into()
}

/// Compute the precession matrix from J2000 to the mean equator and equinox of a given epoch
/// (IAU 1976 model).
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date in TT scale (target epoch).
///
/// Returns
/// --------
/// * `P` such that `x_mean(tjm) = P · x_J2000`.
///
/// Method
/// ------
/// Three successive rotations with the IAU 1976 angles, `T = (tjm - T2000) / 36525`:
///
/// ```text
/// ζ(T) = (0.6406161 + 0.0000839·T + 0.0000050·T²) · T  [deg]
/// θ(T) = (0.5567530 - 0.0001185·T - 0.0000116·T²) · T  [deg]
/// z(T) = (0.6406161 + 0.0003041·T + 0.0000051·T²) · T  [deg]
///
/// P = Rz(z) · Ry(-θ) · Rz(ζ)     (active rotations)
/// ```
///
/// The transpose maps a mean-of-date vector back to J2000.
pub fn prec(tjm: MJD) -> Matrix3<f64> {
    let t = (tjm - T2000) / JULIAN_CENTURY;

    let zeta = ((0.0000050 * t + 0.0000839) * t + 0.6406161) * t * RADEG;
    let z = ((0.0000051 * t + 0.0003041) * t + 0.6406161) * t * RADEG;
    let theta = ((-0.0000116 * t - 0.0001185) * t + 0.5567530) * t * RADEG;

    rotmt(z, 2) * rotmt(-theta, 1) * rotmt(zeta, 2)
}

/// Unit vector of equatorial coordinates.
pub fn radec_to_unit(ra: Radian, dec: Radian) -> Vector3<f64> {
    let (sd, cd) = dec.sin_cos();
    let (sa, ca) = ra.sin_cos();
    Vector3::new(cd * ca, cd * sa, sd)
}

/// Equatorial coordinates of a vector; RA is normalized to [0, 2π).
pub fn unit_to_radec(v: &Vector3<f64>) -> (Radian, Radian) {
    let n = v.norm();
    let dec = (v.z / n).clamp(-1.0, 1.0).asin();
    let ra = v.y.atan2(v.x).rem_euclid(DPI);
    (ra, dec)
}

/// Precess J2000 mean coordinates to the mean equator and equinox of `tjm` (TT).
pub fn precess_from_j2000(ra: Radian, dec: Radian, tjm: MJD) -> (Radian, Radian) {
    unit_to_radec(&(prec(tjm) * radec_to_unit(ra, dec)))
}

/// Precess mean coordinates of epoch `tjm` (TT) back to J2000.
pub fn precess_to_j2000(ra: Radian, dec: Radian, tjm: MJD) -> (Radian, Radian) {
    unit_to_radec(&(prec(tjm).transpose() * radec_to_unit(ra, dec)))
}
