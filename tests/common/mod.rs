#![allow(dead_code)]

use approx::assert_relative_eq;
use hifitime::Epoch;
use skycover::calibration::ReferenceObservation;
use skycover::catalog::Star;
use skycover::constants::{DPI, RADEG};
use skycover::ephemeris::{HorizonFrame, ObserverLocation, TopocentricPosition};
use skycover::frame::SkyImage;
use skycover::projection::{CalibrationParameters, RadialProfile};
use skycover::render::fill_disk;
use skycover::time::utc_epoch;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const SKY_LEVEL: f32 = 10.0;

/// Off-center, rotated, mildly distorted fisheye.
pub fn camera() -> CalibrationParameters {
    CalibrationParameters {
        center_x: 322.5,
        center_y: 238.0,
        radius: 232.0,
        rotation: 0.4,
        profile: RadialProfile::new(-0.1, 0.04),
        flipped: false,
        image_width: WIDTH,
        image_height: HEIGHT,
    }
}

pub fn observer() -> ObserverLocation {
    ObserverLocation::from_degrees(47.0, 8.5, 450.0).unwrap()
}

/// Moonless winter night over central Europe.
pub fn night_epoch() -> Epoch {
    utc_epoch(2024, 1, 10, 23, 0, 0)
}

/// Deterministic spiral of directions covering altitudes 8°..85°.
pub fn spread_positions(n: usize) -> Vec<TopocentricPosition> {
    let golden = 2.399_963_229_728_653;
    (0..n)
        .map(|i| {
            let t = (i as f64 + 0.5) / n as f64;
            let alt = (8.0 + 77.0 * t) * RADEG;
            let az = (i as f64 * golden).rem_euclid(DPI);
            TopocentricPosition::new(alt, az)
        })
        .collect()
}

/// Exact correspondences generated through `params`.
pub fn correspondences(
    params: &CalibrationParameters,
    positions: &[TopocentricPosition],
) -> Vec<ReferenceObservation> {
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (x, y) = params.forward(p.altitude, p.azimuth);
            ReferenceObservation::new(*p, x, y).with_star(format!("ref-{i}"))
        })
        .collect()
}

/// Catalog star that appears at `(alt, az)` in `frame`.
pub fn star_at(frame: &HorizonFrame, name: &str, magnitude: f64, alt_deg: f64, az_deg: f64) -> Star {
    let (ra, dec) = frame.to_j2000(&TopocentricPosition::new(alt_deg * RADEG, az_deg * RADEG));
    Star::new(name, ra, dec, magnitude)
}

/// Uniform night-sky background.
pub fn sky_background() -> SkyImage {
    let mut image = SkyImage::dark(WIDTH, HEIGHT);
    image.as_array_mut().fill(SKY_LEVEL);
    image
}

/// Paint a bright 2-pixel star where `star` projects.
pub fn paint_star(image: &mut SkyImage, frame: &HorizonFrame, params: &CalibrationParameters, star: &Star) {
    let p = frame.topocentric(star);
    let (x, y) = params.forward(p.altitude, p.azimuth);
    fill_disk(image, x, y, 2.0, 200.0);
}

/// Largest pixel disagreement between two calibrations over the visible hemisphere.
pub fn max_projection_difference(a: &CalibrationParameters, b: &CalibrationParameters) -> f64 {
    let mut worst: f64 = 0.0;
    for i in 0..=16 {
        let alt = (5.0 + 5.0 * i as f64) * RADEG;
        for j in 0..36 {
            let az = (10.0 * j as f64) * RADEG;
            let (xa, ya) = a.forward(alt, az);
            let (xb, yb) = b.forward(alt, az);
            worst = worst.max((xa - xb).hypot(ya - yb));
        }
    }
    worst
}

pub fn assert_geometry_close(actual: &CalibrationParameters, expected: &CalibrationParameters, px: f64, rad: f64) {
    assert_relative_eq!(actual.center_x, expected.center_x, epsilon = px);
    assert_relative_eq!(actual.center_y, expected.center_y, epsilon = px);
    assert_relative_eq!(actual.radius, expected.radius, epsilon = px);
    assert_relative_eq!(actual.rotation, expected.rotation, epsilon = rad);
    assert_eq!(actual.flipped, expected.flipped);
}

pub fn assert_center_close(actual: &CalibrationParameters, expected: &CalibrationParameters, px: f64) {
    assert_relative_eq!(actual.center_x, expected.center_x, epsilon = px);
    assert_relative_eq!(actual.center_y, expected.center_y, epsilon = px);
    assert_eq!(actual.flipped, expected.flipped);
}
