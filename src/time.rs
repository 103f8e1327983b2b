//! Time scales used by the ephemeris: UTC epochs from the frame metadata, MJD
//! on the TT scale for precession, and sidereal time for the hour angle.

use hifitime::{Epoch, TimeScale};

use crate::constants::{Radian, DPI, JULIAN_YEAR, MJD, T2000};

/// Modified Julian Date of a capture timestamp on the UTC scale.
///
/// UT1 is approximated by UTC for sidereal time. The difference is bounded by
/// 0.9 s, i.e. about 14 arcseconds of Earth rotation.
pub fn mjd_utc(epoch: &Epoch) -> MJD {
    epoch.to_mjd_utc_days()
}

/// Modified Julian Date of a timestamp on the TT scale.
pub fn mjd_tt(epoch: &Epoch) -> MJD {
    epoch.to_mjd_tt_days()
}

/// Convert a Julian epoch year (e.g. `2000.0`, `1950.0`) to MJD (TT).
///
/// Argument
/// --------
/// * `year`: Julian epoch expressed in years
///
/// Return
/// ------
/// * the MJD of that epoch, `T2000 + (year - 2000) * 365.25`
pub fn julian_year_to_mjd(year: f64) -> MJD {
    T2000 + (year - 2000.0) * JULIAN_YEAR
}

/// Build a UTC epoch from calendar fields.
///
/// Thin helper so callers do not need to depend on `hifitime` directly to stamp a frame.
pub fn utc_epoch(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Epoch {
    Epoch::from_gregorian(year, month, day, hour, minute, second, 0, TimeScale::UTC)
}

/// Compute the Greenwich Mean Sidereal Time (GMST) in radians
/// for a given Modified Julian Date (UT1 time scale).
///
/// The IAU 1982 cubic gives GMST at 0h UT1; the elapsed fraction of the day is
/// then scaled by the ratio of sidereal to solar day.
///
/// # Arguments
/// * `tjm` - Modified Julian Date (MJD, UT1 time scale)
///
/// # Returns
/// * GMST angle in radians, normalized to the interval [0, 2π).
pub fn gmst(tjm: MJD) -> Radian {
    // Polynomial coefficients for GMST at 0h UT1 (in seconds)
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    // Ratio of sidereal day to solar day
    const RAP: f64 = 1.00273790934;

    let midnight = tjm.floor();
    let t = (midnight - T2000) / 36525.0;

    let gmst0 = (((C3 * t + C2) * t + C1) * t + C0) * DPI / 86400.0;
    let rotation = tjm.fract() * DPI * RAP;

    (gmst0 + rotation).rem_euclid(DPI)
}

/// Local mean sidereal time for an observer at east longitude `longitude`.
pub fn local_sidereal_time(epoch: &Epoch, longitude: Radian) -> Radian {
    (gmst(mjd_utc(epoch)) + longitude).rem_euclid(DPI)
}
