//! # Constants and type definitions for skycover
//!
//! This module centralizes the **astronomical constants**, **conversion factors**, and
//! **type aliases** shared by the catalog, ephemeris, projection and detection modules.
//!
//! ## Overview
//!
//! - Angle conversions (degrees, arcseconds ↔ radians)
//! - Time origins (J2000.0 as MJD, Julian centuries)
//! - Earth figure used for the observer's geocentric distance
//! - Unit-carrying type aliases used in signatures across the crate

// -------------------------------------------------------------------------------------------------
// Angles and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// π/2, the zenith distance of the horizon
pub const HALF_PI: f64 = std::f64::consts::FRAC_PI_2;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Arcseconds → radians
pub const RADSEC: f64 = std::f64::consts::PI / 648000.0;

// -------------------------------------------------------------------------------------------------
// Time
// -------------------------------------------------------------------------------------------------

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// Days in a Julian century
pub const JULIAN_CENTURY: f64 = 36525.0;

/// Days in a Julian year
pub const JULIAN_YEAR: f64 = 365.25;

// -------------------------------------------------------------------------------------------------
// Earth figure
// -------------------------------------------------------------------------------------------------

/// Earth equatorial radius in meters (GRS1980/WGS84)
pub const EARTH_MAJOR_AXIS: f64 = 6_378_137.0;

/// Earth polar radius in meters (GRS1980/WGS84)
pub const EARTH_MINOR_AXIS: f64 = 6_356_752.3;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in meters
pub type Meter = f64;
/// Image coordinate or length in pixels
pub type Pixel = f64;
/// Visual magnitude
pub type Magnitude = f64;
/// Modified Julian Date (days)
pub type MJD = f64;
