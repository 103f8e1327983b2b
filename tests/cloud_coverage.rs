mod common;

use approx::assert_relative_eq;
use camino::Utf8PathBuf;
use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array2;
use skycover::catalog::{Star, StarCatalog};
use skycover::constants::RADEG;
use skycover::detection::{CloudDetector, DetectorConfig, Frame, Visibility};
use skycover::ephemeris::{HorizonFrame, TopocentricPosition};
use skycover::frame::SkyImage;
use skycover::mask::SkyMask;
use skycover::render::fill_disk;
use skycover::skycover_errors::SkycoverError;
use skycover::time::utc_epoch;

use crate::common::{
    camera, night_epoch, observer, paint_star, sky_background, star_at, HEIGHT, SKY_LEVEL, WIDTH,
};

fn five_stars(frame: &HorizonFrame) -> Vec<Star> {
    vec![
        star_at(frame, "alpha", 1.0, 70.0, 10.0),
        star_at(frame, "beta", 1.0, 50.0, 100.0),
        star_at(frame, "gamma", 1.0, 35.0, 200.0),
        star_at(frame, "delta", 1.0, 45.0, 290.0),
        star_at(frame, "epsilon", 1.0, 25.0, 150.0),
    ]
}

fn verdicts(report: &skycover::detection::FrameReport) -> Vec<Visibility> {
    report.observations.iter().map(|o| o.visibility).collect()
}

#[test]
fn three_bright_two_dark_gives_forty_percent() {
    let params = camera();
    let epoch = night_epoch();
    let frame = HorizonFrame::new(&observer(), &epoch);
    let stars = five_stars(&frame);

    let mut image = sky_background();
    for star in &stars[..3] {
        paint_star(&mut image, &frame, &params, star);
    }

    let catalog = StarCatalog::from_stars(stars);
    let report = CloudDetector::default()
        .evaluate(
            &image,
            &epoch,
            &observer(),
            &catalog,
            &SkyMask::open(WIDTH, HEIGHT),
            &params,
        )
        .unwrap();

    assert_eq!(
        verdicts(&report),
        vec![
            Visibility::Visible,
            Visibility::Visible,
            Visibility::Visible,
            Visibility::Occluded,
            Visibility::Occluded
        ]
    );
    assert_eq!(report.coverage.visible, 3);
    assert_eq!(report.coverage.occluded, 2);
    assert_relative_eq!(report.coverage.fraction.unwrap(), 0.4);

    let vis = &report.observations[0];
    assert_eq!(vis.name, "alpha");
    let sample = vis.sample.unwrap();
    assert_eq!(sample.background, SKY_LEVEL);
    assert_eq!(sample.signal(), 200.0 - SKY_LEVEL);
    assert!(report.sun_altitude < -18.0 * RADEG);
}

#[test]
fn coverage_grows_as_stars_fade() {
    let params = camera();
    let epoch = night_epoch();
    let frame = HorizonFrame::new(&observer(), &epoch);
    let stars: Vec<Star> = (0..10)
        .map(|i| star_at(&frame, &format!("s{i}"), 1.5, 20.0 + 6.0 * i as f64, 36.0 * i as f64))
        .collect();
    let catalog = StarCatalog::from_stars(stars.clone());
    let mask = SkyMask::open(WIDTH, HEIGHT);
    let detector = CloudDetector::default();

    let mut previous = -1.0;
    for hidden in 0..=stars.len() {
        let mut image = sky_background();
        for star in &stars[hidden..] {
            paint_star(&mut image, &frame, &params, star);
        }
        let report = detector
            .evaluate(&image, &epoch, &observer(), &catalog, &mask, &params)
            .unwrap();
        let coverage = report.coverage.fraction.unwrap();
        assert!(coverage >= previous, "coverage dropped to {coverage} after {previous}");
        assert_relative_eq!(coverage, hidden as f64 / stars.len() as f64);
        previous = coverage;
    }
}

#[test]
fn horizon_and_mask_exclusions_do_not_count() {
    let params = camera();
    let epoch = night_epoch();
    let frame = HorizonFrame::new(&observer(), &epoch);

    let visible = star_at(&frame, "visible", 0.5, 60.0, 45.0);
    let set = star_at(&frame, "set", 0.5, -3.0, 45.0);
    let behind_tree = star_at(&frame, "tree", 0.5, 40.0, 250.0);

    let mut image = sky_background();
    paint_star(&mut image, &frame, &params, &visible);
    paint_star(&mut image, &frame, &params, &behind_tree);

    // mask out a block around the third star
    let p = frame.topocentric(&behind_tree);
    let (x, y) = params.forward(p.altitude, p.azimuth);
    let (col, row) = (x.round() as usize, y.round() as usize);
    let mut sky = Array2::from_elem((HEIGHT as usize, WIDTH as usize), true);
    for r in row - 10..=row + 10 {
        for c in col - 10..=col + 10 {
            sky[[r, c]] = false;
        }
    }

    let catalog = StarCatalog::from_stars(vec![visible, set, behind_tree]);
    let report = CloudDetector::default()
        .evaluate(
            &image,
            &epoch,
            &observer(),
            &catalog,
            &SkyMask::from_array(sky),
            &params,
        )
        .unwrap();

    assert_eq!(
        verdicts(&report),
        vec![Visibility::Visible, Visibility::BelowHorizon, Visibility::MaskedOut]
    );
    assert!(report.observations[1].pixel.is_none());
    assert!(report.observations[2].sample.is_none());
    assert_eq!(report.coverage.contributing(), 1);
    assert_eq!(report.coverage.fraction, Some(0.0));
}

#[test]
fn exactly_on_horizon_is_not_above_it() {
    assert!(!TopocentricPosition::new(0.0, 1.0).is_above_horizon());
}

#[test]
fn all_stars_excluded_leaves_coverage_undefined() {
    let params = camera();
    let epoch = night_epoch();
    let frame = HorizonFrame::new(&observer(), &epoch);
    let catalog = StarCatalog::from_stars(five_stars(&frame));

    let closed = SkyMask::from_array(Array2::from_elem((HEIGHT as usize, WIDTH as usize), false));
    let report = CloudDetector::default()
        .evaluate(&sky_background(), &epoch, &observer(), &catalog, &closed, &params)
        .unwrap();

    assert!(report
        .observations
        .iter()
        .all(|o| o.visibility == Visibility::MaskedOut));
    assert_eq!(report.coverage.fraction, None);
}

#[test]
fn stars_near_the_moon_are_masked_when_configured() {
    // full moon, high in the sky over central Europe
    let epoch = utc_epoch(2024, 1, 25, 23, 0, 0);
    let params = camera();
    let frame = HorizonFrame::new(&observer(), &epoch);
    let moon = frame.moon();
    assert!(moon.altitude > 30.0 * RADEG);

    let near = star_at(&frame, "near", 1.0, moon.altitude / RADEG - 4.0, moon.azimuth / RADEG);
    let far = star_at(&frame, "far", 1.0, 60.0, (moon.azimuth / RADEG + 180.0) % 360.0);
    let catalog = StarCatalog::from_stars(vec![near, far]);
    let mask = SkyMask::open(WIDTH, HEIGHT);

    let plain = CloudDetector::default()
        .evaluate(&sky_background(), &epoch, &observer(), &catalog, &mask, &params)
        .unwrap();
    assert_eq!(verdicts(&plain), vec![Visibility::Occluded, Visibility::Occluded]);

    let config = DetectorConfig::builder()
        .moon_exclusion_radius(Some(10.0 * RADEG))
        .build()
        .unwrap();
    let guarded = CloudDetector::new(config)
        .evaluate(&sky_background(), &epoch, &observer(), &catalog, &mask, &params)
        .unwrap();
    assert_eq!(verdicts(&guarded), vec![Visibility::MaskedOut, Visibility::Occluded]);
    assert_relative_eq!(guarded.moon_altitude, moon.altitude);
}

#[test]
fn faint_stars_need_less_signal() {
    let params = camera();
    let epoch = night_epoch();
    let frame = HorizonFrame::new(&observer(), &epoch);
    let bright = star_at(&frame, "bright", -1.0, 55.0, 30.0);
    let faint = star_at(&frame, "faint", 3.0, 55.0, 210.0);

    // same modest signal of 30 on both: enough for mag 3 (req 5), not for mag -1 (req ~100)
    let mut image = sky_background();
    for star in [&bright, &faint] {
        let p = frame.topocentric(star);
        let (x, y) = params.forward(p.altitude, p.azimuth);
        fill_disk(&mut image, x, y, 1.0, SKY_LEVEL + 30.0);
    }

    let catalog = StarCatalog::from_stars(vec![bright, faint]);
    let report = CloudDetector::default()
        .evaluate(&image, &epoch, &observer(), &catalog, &SkyMask::open(WIDTH, HEIGHT), &params)
        .unwrap();
    assert_eq!(verdicts(&report), vec![Visibility::Occluded, Visibility::Visible]);
    assert_relative_eq!(
        report.observations[0].required_signal.unwrap(),
        40.0 * 10f64.powf(0.4),
        epsilon = 1e-9
    );
}

#[test]
fn batch_evaluation_keeps_frame_order_and_isolates_failures() {
    let params = camera();
    let epoch = night_epoch();
    let frame = HorizonFrame::new(&observer(), &epoch);
    let stars = five_stars(&frame);
    let catalog = StarCatalog::from_stars(stars.clone());
    let mask = SkyMask::open(WIDTH, HEIGHT);

    let mut frames = Vec::new();
    for lit in [5, 0, 2] {
        let mut image = sky_background();
        for star in &stars[..lit] {
            paint_star(&mut image, &frame, &params, star);
        }
        frames.push(Frame { image, epoch });
    }
    frames.insert(
        2,
        Frame {
            image: SkyImage::dark(320, 240),
            epoch,
        },
    );

    let reports = CloudDetector::default().evaluate_batch(&frames, &observer(), &catalog, &mask, &params);
    assert_eq!(reports.len(), 4);
    assert_eq!(reports[0].as_ref().unwrap().coverage.fraction, Some(0.0));
    assert_eq!(reports[1].as_ref().unwrap().coverage.fraction, Some(1.0));
    assert!(matches!(
        reports[2],
        Err(SkycoverError::DimensionMismatch { what: "sky mask", .. })
    ));
    assert_relative_eq!(reports[3].as_ref().unwrap().coverage.fraction.unwrap(), 0.6);
}

#[test]
fn frames_decoded_from_png_match_in_memory_frames() {
    let params = camera();
    let epoch = night_epoch();
    let frame = HorizonFrame::new(&observer(), &epoch);
    let stars = five_stars(&frame);

    let mut image = sky_background();
    for star in &stars[1..4] {
        paint_star(&mut image, &frame, &params, star);
    }

    let mut gray = GrayImage::new(WIDTH, HEIGHT);
    for ((row, col), value) in image.as_array().indexed_iter() {
        gray.put_pixel(col as u32, row as u32, Luma([*value as u8]));
    }
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("frame.png")).unwrap();
    DynamicImage::ImageLuma8(gray).save(&path).unwrap();

    let catalog = StarCatalog::from_stars(stars);
    let mask = SkyMask::open(WIDTH, HEIGHT);
    let detector = CloudDetector::default();
    let from_memory = detector
        .evaluate(&image, &epoch, &observer(), &catalog, &mask, &params)
        .unwrap();
    let from_disk = detector
        .evaluate(&SkyImage::load(&path).unwrap(), &epoch, &observer(), &catalog, &mask, &params)
        .unwrap();

    assert_eq!(verdicts(&from_memory), verdicts(&from_disk));
    assert_relative_eq!(from_disk.coverage.fraction.unwrap(), 0.4);
}
