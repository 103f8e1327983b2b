//! XEphem EDB record parser.
//!
//! A fixed-object record is a comma-separated line:
//!
//! ```text
//! Sirius,f|S|A1,6:45:08.9|-546.0,-16:42:58|-1223.1,-1.44,2000,0
//! ^name  ^type  ^RA [h]    |pm    ^Dec [deg] |pm     ^mag  ^epoch
//! ```
//!
//! Every field may carry `|`-separated sub-fields (spectral class, proper motion,
//! alternative names); only the first sub-field is used. Proper motion is ignored.

use crate::constants::RADEG;
use crate::conversion::{parse_dec_to_deg, parse_ra_hours_to_deg};
use crate::earth_orientation::precess_to_j2000;
use crate::skycover_errors::CatalogParseError;
use crate::time::julian_year_to_mjd;

use super::Star;

/// Default equinox of an EDB record that omits its epoch field.
const DEFAULT_EPOCH_YEAR: f64 = 2000.0;

/// Outcome of parsing one physical line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EdbLine {
    /// Blank line or comment (`#` / `*`).
    Skip,
    Star(Star),
}

fn first_subfield(field: &str) -> &str {
    field.split('|').next().unwrap_or("").trim()
}

/// Parse one EDB line.
///
/// Arguments
/// ---------
/// * `line_no`: 1-based line number, used in error reports.
/// * `line`: the raw line content (without the trailing newline).
///
/// Return
/// ------
/// * `Ok(EdbLine::Skip)` for blank and comment lines,
/// * `Ok(EdbLine::Star)` with J2000 coordinates in radians,
/// * `Err(CatalogParseError)` describing the first malformed field.
pub(crate) fn parse_edb_line(line_no: usize, line: &str) -> Result<EdbLine, CatalogParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('*') {
        return Ok(EdbLine::Skip);
    }

    let reject = |reason: String| CatalogParseError {
        line: line_no,
        reason,
    };

    let fields: Vec<&str> = trimmed.split(',').collect();
    if fields.len() < 5 {
        return Err(reject(format!(
            "expected at least 5 comma-separated fields, found {}",
            fields.len()
        )));
    }

    let name = first_subfield(fields[0]);
    if name.is_empty() {
        return Err(reject("empty object name".into()));
    }

    let kind = first_subfield(fields[1]);
    if !kind.starts_with('f') {
        return Err(reject(format!(
            "unsupported object type `{kind}` (only fixed objects carry RA/Dec)"
        )));
    }

    let ra_field = first_subfield(fields[2]);
    let ra_deg = parse_ra_hours_to_deg(ra_field)
        .ok_or_else(|| reject(format!("invalid right ascension `{ra_field}`")))?;

    let dec_field = first_subfield(fields[3]);
    let dec_deg = parse_dec_to_deg(dec_field)
        .ok_or_else(|| reject(format!("invalid declination `{dec_field}`")))?;

    let mag_field = first_subfield(fields[4]);
    let magnitude: f64 = mag_field
        .parse()
        .ok()
        .filter(|m: &f64| m.is_finite())
        .ok_or_else(|| reject(format!("invalid magnitude `{mag_field}`")))?;

    let epoch_year = match fields.get(5).map(|f| first_subfield(f)) {
        None | Some("") => DEFAULT_EPOCH_YEAR,
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|y| y.is_finite())
            .ok_or_else(|| reject(format!("invalid epoch `{raw}`")))?,
    };

    let (mut ra, mut dec) = (ra_deg * RADEG, dec_deg * RADEG);
    if epoch_year != DEFAULT_EPOCH_YEAR {
        (ra, dec) = precess_to_j2000(ra, dec, julian_year_to_mjd(epoch_year));
    }

    Ok(EdbLine::Star(Star {
        name: name.to_string(),
        ra,
        dec,
        magnitude,
    }))
}
