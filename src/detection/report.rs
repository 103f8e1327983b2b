//! Frame report output: CSV export of the per-star table and text summaries.
//!
//! CSV columns
//! -----------------
//! `star, magnitude, altitude_deg, azimuth_deg, x, y, peak, background, signal,
//! required, visibility`
//!
//! Pixel and photometry columns are empty when the star never reached that stage
//! (below the horizon, or masked out).

use std::fmt;
use std::fs::File;
use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;

use crate::constants::RADEG;
use crate::skycover_errors::SkycoverError;

use super::{CoverageEstimate, FrameReport, StarObservation};

/// Flat CSV record of one [`StarObservation`].
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    star: &'a str,
    magnitude: f64,
    altitude_deg: f64,
    azimuth_deg: f64,
    x: Option<f64>,
    y: Option<f64>,
    peak: Option<f32>,
    background: Option<f32>,
    signal: Option<f32>,
    required: Option<f64>,
    visibility: String,
}

impl<'a> From<&'a StarObservation> for CsvRow<'a> {
    fn from(o: &'a StarObservation) -> Self {
        CsvRow {
            star: &o.name,
            magnitude: o.magnitude,
            altitude_deg: o.position.altitude / RADEG,
            azimuth_deg: o.position.azimuth / RADEG,
            x: o.pixel.map(|p| p.0),
            y: o.pixel.map(|p| p.1),
            peak: o.sample.map(|s| s.peak),
            background: o.sample.map(|s| s.background),
            signal: o.sample.map(|s| s.signal()),
            required: o.required_signal,
            visibility: o.visibility.to_string(),
        }
    }
}

impl FrameReport {
    /// Write the per-star table as CSV, header included.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), SkycoverError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for observation in &self.observations {
            csv_writer.serialize(CsvRow::from(observation))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write the per-star table to a CSV file.
    pub fn save_csv(&self, path: impl AsRef<Utf8Path>) -> Result<(), SkycoverError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SkycoverError::SourceUnavailable {
            what: "frame report",
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        self.write_csv(file)
    }
}

impl fmt::Display for CoverageEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fraction {
            Some(fraction) => write!(
                f,
                "coverage {:.1}% ({} of {} stars occluded)",
                100.0 * fraction,
                self.occluded,
                self.contributing()
            ),
            None => write!(f, "coverage undefined (no star in view)"),
        }
    }
}

impl fmt::Display for FrameReport {
    /// One summary line; the alternate form (`{:#}`) appends the per-star table.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}, {} below horizon, {} masked out, sun {:.1}°, moon {:.1}°",
            self.epoch,
            self.coverage,
            self.coverage.below_horizon,
            self.coverage.masked_out,
            self.sun_altitude / RADEG,
            self.moon_altitude / RADEG
        )?;

        if f.alternate() {
            writeln!(f)?;
            writeln!(
                f,
                "{:<20} {:>6} {:>7} {:>7} {:>8} {:>8} {:>7} {:>7}  {}",
                "star", "mag", "alt", "az", "x", "y", "signal", "req", "verdict"
            )?;
            for o in &self.observations {
                let (x, y) = match o.pixel {
                    Some((x, y)) => (format!("{x:.1}"), format!("{y:.1}")),
                    None => ("-".into(), "-".into()),
                };
                let signal = o
                    .sample
                    .map_or_else(|| "-".to_string(), |s| format!("{:.1}", s.signal()));
                let required = o
                    .required_signal
                    .map_or_else(|| "-".to_string(), |r| format!("{r:.1}"));
                writeln!(
                    f,
                    "{:<20} {:>6.2} {:>7.2} {:>7.2} {:>8} {:>8} {:>7} {:>7}  {}",
                    o.name,
                    o.magnitude,
                    o.position.altitude / RADEG,
                    o.position.azimuth / RADEG,
                    x,
                    y,
                    signal,
                    required,
                    o.visibility
                )?;
            }
        }
        Ok(())
    }
}
