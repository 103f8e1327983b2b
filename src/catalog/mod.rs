//! # Star catalog
//!
//! In-memory table of [`Star`] records read from an XEphem EDB catalog.
//!
//! ## Loading policy
//!
//! - Blank lines and comments are ignored.
//! - A malformed record is **skipped**, logged at `warn` level and kept as a
//!   [`CatalogParseError`] in [`StarCatalog::rejected`]; loading continues.
//! - An unreadable source fails the whole load with
//!   [`SkycoverError::SourceUnavailable`].
//! - Records keep their file order; duplicate names are allowed and independent.
//!
//! ## Example
//!
//! ```rust,no_run
//! use skycover::catalog::StarCatalog;
//!
//! let catalog = StarCatalog::load("data/bright_stars.edb")?;
//! println!("{} stars, {} rejected lines", catalog.len(), catalog.rejected().len());
//! let naked_eye = catalog.filter_magnitude(4.5);
//! # Ok::<(), skycover::skycover_errors::SkycoverError>(())
//! ```

pub mod edb;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::str::FromStr;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{Magnitude, Radian};
use crate::skycover_errors::{CatalogParseError, SkycoverError};

use edb::{parse_edb_line, EdbLine};

/// A catalog star with J2000 mean equatorial coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Star {
    /// Catalog name (first sub-field of the EDB name column).
    pub name: String,
    /// Right ascension, radians, J2000.
    pub ra: Radian,
    /// Declination, radians, J2000.
    pub dec: Radian,
    /// Apparent visual magnitude.
    pub magnitude: Magnitude,
}

impl Star {
    pub fn new(name: impl Into<String>, ra: Radian, dec: Radian, magnitude: Magnitude) -> Self {
        Star {
            name: name.into(),
            ra,
            dec,
            magnitude,
        }
    }
}

/// Parse a single EDB record, e.g. a star typed in by the operator.
///
/// Errors
/// ----------
/// * [`SkycoverError::CatalogParse`] for a malformed record, or for a blank or
///   comment line that holds no record at all.
impl FromStr for Star {
    type Err = SkycoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_edb_line(1, s)? {
            EdbLine::Star(star) => Ok(star),
            EdbLine::Skip => Err(SkycoverError::CatalogParse(CatalogParseError {
                line: 1,
                reason: "line holds no record".into(),
            })),
        }
    }
}

/// Ordered, immutable collection of catalog stars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarCatalog {
    stars: Vec<Star>,
    rejected: Vec<CatalogParseError>,
}

impl StarCatalog {
    /// Build a catalog from already parsed stars.
    pub fn from_stars(stars: Vec<Star>) -> Self {
        StarCatalog {
            stars,
            rejected: Vec::new(),
        }
    }

    /// Load an EDB catalog file.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: location of the EDB file.
    ///
    /// Return
    /// ----------
    /// * The parsed catalog; malformed records are available through [`StarCatalog::rejected`].
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::SourceUnavailable`] if the file cannot be opened or read.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, SkycoverError> {
        let path = path.as_ref();
        let unavailable = |e: std::io::Error| SkycoverError::SourceUnavailable {
            what: "star catalog",
            path: path.to_string(),
            reason: e.to_string(),
        };

        let file = File::open(path).map_err(unavailable)?;
        let catalog = Self::parse_lines(BufReader::new(file)).map_err(unavailable)?;

        info!(
            "Loaded {} stars from {path} ({} records rejected)",
            catalog.len(),
            catalog.rejected.len()
        );
        Ok(catalog)
    }

    /// Parse an EDB catalog from any buffered reader.
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::IoError`] if the reader fails mid-stream.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, SkycoverError> {
        Ok(Self::parse_lines(reader)?)
    }

    fn parse_lines<R: BufRead>(reader: R) -> Result<Self, std::io::Error> {
        let mut catalog = StarCatalog::default();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            match parse_edb_line(idx + 1, &line) {
                Ok(EdbLine::Star(star)) => catalog.stars.push(star),
                Ok(EdbLine::Skip) => {}
                Err(err) => {
                    warn!("Skipping {err}");
                    catalog.rejected.push(err);
                }
            }
        }

        Ok(catalog)
    }

    /// Stars in catalog order.
    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Star> {
        self.stars.iter()
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Records skipped during loading, in file order.
    pub fn rejected(&self) -> &[CatalogParseError] {
        &self.rejected
    }

    /// New catalog with only the stars brighter than (numerically below) `max_magnitude`.
    ///
    /// Rejected-record bookkeeping is not carried over.
    pub fn filter_magnitude(&self, max_magnitude: Magnitude) -> StarCatalog {
        StarCatalog::from_stars(
            self.stars
                .iter()
                .filter(|s| s.magnitude < max_magnitude)
                .cloned()
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a StarCatalog {
    type Item = &'a Star;
    type IntoIter = std::slice::Iter<'a, Star>;

    fn into_iter(self) -> Self::IntoIter {
        self.stars.iter()
    }
}

#[cfg(test)]
mod catalog_test {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
# a tiny catalog
Sirius,f|S|A1,6:45:08.9|-546.0,-16:42:58|-1223.1,-1.44,2000,0
Canopus,f|S|F0,6:23:57.1,-52:41:44,-0.62,2000

Broken line without enough fields
Arcturus,f|S|K2,14:15:39.7,19:10:57,-0.05,2000
Bad Dec,f,10:00:00,95:00:00,1.0,2000
Sirius,f|S|A1,6:45:08.9,-16:42:58,-1.44,2000
";

    #[test]
    fn test_from_reader_skips_and_counts() {
        let catalog = StarCatalog::from_reader(Cursor::new(SAMPLE)).unwrap();
        let names: Vec<&str> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Sirius", "Canopus", "Arcturus", "Sirius"]);

        assert_eq!(catalog.rejected().len(), 2);
        assert_eq!(catalog.rejected()[0].line, 5);
        assert_eq!(catalog.rejected()[1].line, 7);
    }

    #[test]
    fn test_duplicates_are_independent() {
        let catalog = StarCatalog::from_reader(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(catalog.stars()[0], catalog.stars()[3]);
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_filter_magnitude() {
        let catalog = StarCatalog::from_reader(Cursor::new(SAMPLE)).unwrap();
        let bright = catalog.filter_magnitude(-0.5);
        assert_eq!(bright.len(), 3);
        assert!(bright.rejected().is_empty());
    }

    #[test]
    fn test_single_record_from_str() {
        let vega: Star = "Vega|Alpha Lyr,f|V|A0,18:36:56.3,38:47:01,0.03".parse().unwrap();
        assert_eq!(vega.name, "Vega");
        assert_eq!(vega.magnitude, 0.03);

        let err = "Bad Dec,f,10:00:00,95:00:00,1.0".parse::<Star>().unwrap_err();
        match err {
            SkycoverError::CatalogParse(e) => assert!(e.reason.contains("declination"), "{e}"),
            other => panic!("unexpected error {other:?}"),
        }

        assert!(matches!(
            "# comment".parse::<Star>(),
            Err(SkycoverError::CatalogParse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = StarCatalog::load("does/not/exist.edb").unwrap_err();
        assert_eq!(
            err,
            SkycoverError::SourceUnavailable {
                what: "star catalog",
                path: "does/not/exist.edb".into(),
                reason: String::new(),
            }
        );
    }
}
