use std::env;
use std::io;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use skycover::calibration::{CalibrationConfig, Calibrator, Handedness, ReferenceObservation};
use skycover::catalog::StarCatalog;
use skycover::constants::RADEG;
use skycover::detection::{CloudDetector, DetectorConfig};
use skycover::ephemeris::{HorizonFrame, ObserverLocation};
use skycover::mask::SkyMask;
use skycover::projection::{CalibrationParameters, RadialProfile};
use skycover::render::SkyRenderer;
use skycover::skycover_errors::SkycoverError;
use skycover::time::utc_epoch;
use tracing_subscriber::EnvFilter;

/// Render one night frame through a known lens, cover its eastern half with cloud,
/// calibrate from noisy star clicks and measure the coverage.
///
/// Usage:
///   synthetic_night [CATALOG.edb]
///
/// Set `RUST_LOG=debug` to follow the fit and the detector.
fn main() -> Result<(), SkycoverError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let catalog_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/data/bright_stars.edb".to_string());
    let catalog = StarCatalog::load(&catalog_path)?;

    let observer = ObserverLocation::from_degrees(46.55, 7.98, 3571.0)?;
    let epoch = utc_epoch(2024, 2, 14, 21, 30, 0);
    let horizon = HorizonFrame::new(&observer, &epoch);

    let truth = CalibrationParameters {
        center_x: 652.0,
        center_y: 478.5,
        radius: 455.0,
        rotation: -0.35,
        profile: RadialProfile::new(-0.12, 0.05),
        flipped: false,
        image_width: 1280,
        image_height: 960,
    };

    let mut renderer = SkyRenderer::new(truth);
    let mut image = renderer.render_catalog(&catalog, &horizon, 3.0);
    println!("{} stars and bodies above the horizon", renderer.stars().len());

    // Clicks on the rendering, with half a pixel of hand jitter
    let mut rng = StdRng::seed_from_u64(2024);
    let jitter = Normal::new(0.0, 0.5).expect("valid standard deviation");
    let clicks: Vec<ReferenceObservation> = renderer
        .stars()
        .iter()
        .map(|s| {
            ReferenceObservation::new(
                s.position,
                s.x + jitter.sample(&mut rng),
                s.y + jitter.sample(&mut rng),
            )
            .with_star(s.name.clone())
        })
        .collect();

    let config = CalibrationConfig::builder()
        .image_size(truth.image_width, truth.image_height)
        .distortion_terms(if clicks.len() >= 8 { 2 } else { 0 })
        .handedness(Handedness::Auto)
        .build()?;
    println!("{config:#}");
    let fit = Calibrator::new(config).fit(&clicks)?;
    println!("{}", fit.report);
    println!("{}", fit.parameters);

    // A bank of cloud over the eastern half of the frame
    let cloud_edge = truth.center_x as usize;
    for mut row in image.as_array_mut().rows_mut() {
        for px in row.iter_mut().skip(cloud_edge) {
            *px = 60.0;
        }
    }

    let mask = SkyMask::above_altitude(&fit.parameters, 5.0 * RADEG);
    let detector = CloudDetector::new(
        DetectorConfig::builder()
            .moon_exclusion_radius(Some(15.0 * RADEG))
            .build()?,
    );
    let report = detector.evaluate(&image, &epoch, &observer, &catalog, &mask, &fit.parameters)?;

    println!("{report:#}");
    report.write_csv(io::stdout().lock())?;
    Ok(())
}
