use std::sync::LazyLock;

use regex::Regex;

use crate::constants::Degree;

/// `[sign] a [: b [: c]]`, each component decimal. XEphem writes `05:14:32.27`,
/// `-08:12:05.9`, or a bare decimal value.
static SEXAGESIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)(\d+(?:\.\d*)?)(?::(\d+(?:\.\d*)?))?(?::(\d+(?:\.\d*)?))?$")
        .expect("sexagesimal pattern is valid")
});

/// Parse a sexagesimal field into a signed decimal value in the same major unit.
///
/// Arguments
/// ---------
/// * `field`: `D:M:S`, `D:M` or `D`, optionally signed; minutes and seconds must be below 60.
///
/// Returns
/// -------
/// * `Option<f64>`: `D + M/60 + S/3600` with the sign of the field, or `None` if malformed.
pub(crate) fn parse_sexagesimal(field: &str) -> Option<f64> {
    let caps = SEXAGESIMAL.captures(field.trim())?;

    let sign = if &caps[1] == "-" { -1.0 } else { 1.0 };
    let major: f64 = caps[2].parse().ok()?;
    let minutes: f64 = caps.get(3).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;
    let seconds: f64 = caps.get(4).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;

    if minutes >= 60.0 || seconds >= 60.0 {
        return None;
    }

    Some(sign * (major + minutes / 60.0 + seconds / 3600.0))
}

/// Parse a right ascension field expressed in hours to degrees.
///
/// Returns `None` for malformed input or an hour angle outside [0, 24).
pub(crate) fn parse_ra_hours_to_deg(ra: &str) -> Option<Degree> {
    let hours = parse_sexagesimal(ra)?;
    if !(0.0..24.0).contains(&hours) {
        return None;
    }
    Some(hours * 15.0)
}

/// Parse a declination field expressed in degrees.
///
/// Returns `None` for malformed input or a value outside [-90, 90].
pub(crate) fn parse_dec_to_deg(dec: &str) -> Option<Degree> {
    let deg = parse_sexagesimal(dec)?;
    if !(-90.0..=90.0).contains(&deg) {
        return None;
    }
    Some(deg)
}
