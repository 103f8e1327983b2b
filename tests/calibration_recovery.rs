mod common;

use approx::assert_relative_eq;
use camino::Utf8PathBuf;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use skycover::calibration::{CalibrationConfig, Calibrator, Handedness, ReferenceObservation};
use skycover::projection::CalibrationParameters;
use skycover::skycover_errors::{FitInvariant, SkycoverError};

use crate::common::{
    assert_center_close, assert_geometry_close, camera, correspondences, max_projection_difference, spread_positions,
    HEIGHT, WIDTH,
};

fn calibrator(handedness: Handedness) -> Calibrator {
    let config = CalibrationConfig::builder()
        .image_size(WIDTH, HEIGHT)
        .distortion_terms(2)
        .handedness(handedness)
        .build()
        .unwrap();
    Calibrator::new(config)
}

fn noisy(observations: &mut [ReferenceObservation], sigma: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma).unwrap();
    for o in observations {
        o.pixel_x += normal.sample(&mut rng);
        o.pixel_y += normal.sample(&mut rng);
    }
}

#[test]
fn recovers_distorted_camera_from_noisy_stars() {
    let truth = camera();
    let mut observations = correspondences(&truth, &spread_positions(40));
    noisy(&mut observations, 0.5, 42);

    let fit = calibrator(Handedness::Auto).fit(&observations).unwrap();

    assert!(!fit.parameters.flipped);
    assert!(fit.report.rms_px < 1.0, "rms {}", fit.report.rms_px);
    assert_center_close(&fit.parameters, &truth, 0.6);
    let worst = max_projection_difference(&fit.parameters, &truth);
    assert!(worst < 1.0, "projection differs by up to {worst} px");
}

#[test]
fn mirrored_camera_is_detected() {
    let truth = CalibrationParameters {
        flipped: true,
        ..camera()
    };
    let mut observations = correspondences(&truth, &spread_positions(30));
    noisy(&mut observations, 0.3, 7);

    let fit = calibrator(Handedness::Auto).fit(&observations).unwrap();
    assert!(fit.parameters.flipped);
    assert!(max_projection_difference(&fit.parameters, &truth) < 1.0);
}

#[test]
fn gross_outliers_are_trimmed_in_second_pass() {
    let truth = camera();
    let mut observations = correspondences(&truth, &spread_positions(60));
    noisy(&mut observations, 0.5, 1234);

    // misidentified stars
    observations[4].pixel_x += 120.0;
    observations[17].pixel_y -= 140.0;
    observations[41].pixel_x += 100.0;
    observations[41].pixel_y += 100.0;

    let fit = calibrator(Handedness::Normal).fit(&observations).unwrap();
    assert_eq!(fit.report.rejected, vec![4, 17, 41]);
    assert_eq!(fit.report.inliers, 57);
    assert!(fit.report.rms_px < 1.0);
    assert_center_close(&fit.parameters, &truth, 0.6);
    assert!(max_projection_difference(&fit.parameters, &truth) < 1.0);
}

#[test]
fn small_sets_shed_misidentified_stars() {
    let truth = camera();
    let cases: [(usize, &[usize]); 5] = [
        (8, &[3]),
        (9, &[6]),
        (12, &[2, 9]),
        (16, &[5, 11]),
        (20, &[0, 7, 15]),
    ];

    for (n, bad) in cases {
        let mut observations = correspondences(&truth, &spread_positions(n));
        noisy(&mut observations, 0.2, 900 + n as u64);
        for &i in bad {
            observations[i].pixel_x += 120.0;
            observations[i].pixel_y -= 90.0;
        }

        let fit = calibrator(Handedness::Normal)
            .fit(&observations)
            .unwrap_or_else(|e| panic!("{n} stars: {e}"));
        assert_eq!(fit.report.rejected, bad.to_vec(), "{n} stars");
        assert_eq!(fit.report.inliers, n - bad.len());
        assert!(fit.report.rms_px < 1.0, "{n} stars: rms {}", fit.report.rms_px);
        let worst = max_projection_difference(&fit.parameters, &truth);
        assert!(worst < 4.0, "{n} stars: projection differs by up to {worst} px");
    }
}

#[test]
fn three_correspondences_are_insufficient() {
    let observations = correspondences(&camera(), &spread_positions(3));
    let err = calibrator(Handedness::Auto).fit(&observations).unwrap_err();
    assert!(matches!(
        err,
        SkycoverError::InsufficientData {
            provided: 3,
            required: 4,
            ..
        }
    ));
}

#[test]
fn four_exact_correspondences_reproduce_the_generator() {
    let truth = CalibrationParameters {
        profile: Default::default(),
        ..camera()
    };
    let observations = correspondences(&truth, &spread_positions(4));
    let config = CalibrationConfig::builder()
        .image_size(WIDTH, HEIGHT)
        .distortion_terms(0)
        .handedness(Handedness::Normal)
        .build()
        .unwrap();

    let fit = Calibrator::new(config).fit(&observations).unwrap();
    assert_geometry_close(&fit.parameters, &truth, 1e-6, 1e-8);
    assert_eq!(fit.report.inliers, 4);
}

#[test]
fn calibration_persists_as_json() {
    let truth = camera();
    let observations = correspondences(&truth, &spread_positions(25));
    let fit = calibrator(Handedness::Normal).fit(&observations).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("camera.json")).unwrap();
    fit.parameters.save_json(&path).unwrap();

    let loaded = CalibrationParameters::load_json(&path).unwrap();
    assert_geometry_close(&loaded, &fit.parameters, 1e-9, 1e-12);
    assert_relative_eq!(loaded.profile.k1, fit.parameters.profile.k1, epsilon = 1e-12);
    assert_relative_eq!(loaded.profile.k2, fit.parameters.profile.k2, epsilon = 1e-12);
    assert_eq!(
        (loaded.image_width, loaded.image_height),
        (fit.parameters.image_width, fit.parameters.image_height)
    );
}

#[test]
fn degenerate_json_is_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("bad.json")).unwrap();

    let mut bad = serde_json::to_value(camera()).unwrap();
    bad["radius"] = serde_json::json!(-5.0);
    std::fs::write(&path, bad.to_string()).unwrap();

    let err = CalibrationParameters::load_json(&path).unwrap_err();
    assert!(matches!(
        err,
        SkycoverError::DegenerateFit(FitInvariant::RadiusOutOfRange { .. })
    ));

    std::fs::write(&path, "{\"center_x\": 1.0").unwrap();
    assert!(matches!(
        CalibrationParameters::load_json(&path).unwrap_err(),
        SkycoverError::Serialization(_)
    ));

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        CalibrationParameters::load_json(missing.to_str().unwrap()).unwrap_err(),
        SkycoverError::SourceUnavailable { .. }
    ));
}
