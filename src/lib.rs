pub mod calibration;
pub mod catalog;
pub mod constants;
mod conversion;
pub mod detection;
pub mod earth_orientation;
pub mod ephemeris;
pub mod frame;
pub mod mask;
pub mod projection;
pub mod render;
pub mod skycover_errors;
pub mod time;
