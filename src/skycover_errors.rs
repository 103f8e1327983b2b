use thiserror::Error;

/// A single rejected catalog record.
///
/// Catalog loading is tolerant: malformed records are skipped and collected as
/// `CatalogParseError`s next to the successfully parsed stars.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("catalog line {line}: {reason}")]
pub struct CatalogParseError {
    /// 1-based line number in the source.
    pub line: usize,
    /// Human-readable description of the defect.
    pub reason: String,
}

/// Invariant of [`CalibrationParameters`](crate::projection::CalibrationParameters)
/// that a fitted or loaded parameter set violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitInvariant {
    #[error("parameter `{0}` is not finite")]
    NonFinite(&'static str),

    #[error("optical center ({x:.2}, {y:.2}) lies outside the {width}x{height} image")]
    CenterOutOfBounds {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },

    #[error("image radius {radius:.2} px is outside (0, {max:.2}] px")]
    RadiusOutOfRange { radius: f64, max: f64 },

    #[error(
        "zenith-distance profile decreases near zenith angle {zenith_deg:.2} deg (slope {slope:.4})"
    )]
    NonMonotonicProfile { zenith_deg: f64, slope: f64 },

    #[error("image dimensions {width}x{height} are empty")]
    EmptyImage { width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum SkycoverError {
    #[error("Malformed catalog record: {0}")]
    CatalogParse(#[from] CatalogParseError),

    #[error("Unable to read {what} from {path}: {reason}")]
    SourceUnavailable {
        what: &'static str,
        path: String,
        reason: String,
    },

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Insufficient calibration data: {detail} ({provided} provided, {required} required)")]
    InsufficientData {
        provided: usize,
        required: usize,
        detail: String,
    },

    #[error(
        "Calibration did not converge after {iterations} iterations (last step {last_step:.3e}, rms {rms_px:.3} px)"
    )]
    CalibrationDidNotConverge {
        iterations: usize,
        last_step: f64,
        rms_px: f64,
    },

    #[error("Degenerate calibration rejected: {0}")]
    DegenerateFit(#[from] FitInvariant),

    #[error("Dimension mismatch for {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("Invalid calibration parameter: {0}")]
    InvalidCalibrationParameter(String),

    #[error("Invalid detector parameter: {0}")]
    InvalidDetectorParameter(String),

    #[error("Invalid observer location: {0}")]
    InvalidObserverLocation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    CsvExport(#[from] csv::Error),
}

impl PartialEq for SkycoverError {
    fn eq(&self, other: &Self) -> bool {
        use SkycoverError::*;
        match (self, other) {
            (CatalogParse(a), CatalogParse(b)) => a == b,
            (
                SourceUnavailable {
                    what: wa, path: pa, ..
                },
                SourceUnavailable {
                    what: wb, path: pb, ..
                },
            ) => wa == wb && pa == pb,
            (
                InsufficientData {
                    provided: pa,
                    required: ra,
                    ..
                },
                InsufficientData {
                    provided: pb,
                    required: rb,
                    ..
                },
            ) => pa == pb && ra == rb,
            (
                CalibrationDidNotConverge { iterations: a, .. },
                CalibrationDidNotConverge { iterations: b, .. },
            ) => a == b,
            (DegenerateFit(a), DegenerateFit(b)) => a == b,
            (
                DimensionMismatch {
                    what: wa,
                    expected: ea,
                    found: fa,
                },
                DimensionMismatch {
                    what: wb,
                    expected: eb,
                    found: fb,
                },
            ) => wa == wb && ea == eb && fa == fb,
            (InvalidCalibrationParameter(a), InvalidCalibrationParameter(b)) => a == b,
            (InvalidDetectorParameter(a), InvalidDetectorParameter(b)) => a == b,
            (InvalidObserverLocation(a), InvalidObserverLocation(b)) => a == b,

            // Wrapped foreign errors are not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,
            (Serialization(_), Serialization(_)) => true,
            (CsvExport(_), CsvExport(_)) => true,

            _ => false,
        }
    }
}
