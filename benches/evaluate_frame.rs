use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use skycover::catalog::{Star, StarCatalog};
use skycover::constants::{DPI, RADEG};
use skycover::detection::{CloudDetector, Frame};
use skycover::ephemeris::{HorizonFrame, ObserverLocation};
use skycover::mask::SkyMask;
use skycover::projection::{CalibrationParameters, RadialProfile};
use skycover::render::SkyRenderer;
use skycover::time::utc_epoch;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 960;

fn camera() -> CalibrationParameters {
    CalibrationParameters {
        center_x: 640.0,
        center_y: 480.0,
        radius: 460.0,
        rotation: 0.2,
        profile: RadialProfile::new(-0.1, 0.04),
        flipped: false,
        image_width: WIDTH,
        image_height: HEIGHT,
    }
}

/// Uniform random stars over the whole celestial sphere, magnitudes in [-1, 5).
fn random_catalog(rng: &mut StdRng, n: usize) -> StarCatalog {
    let stars = (0..n)
        .map(|i| {
            let ra = rng.random::<f64>() * DPI;
            let dec = (2.0 * rng.random::<f64>() - 1.0).asin();
            let mag = rng.random_range(-1.0..5.0);
            Star::new(format!("star-{i}"), ra, dec, mag)
        })
        .collect();
    StarCatalog::from_stars(stars)
}

fn bench_evaluate(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let catalog = random_catalog(&mut rng, 2_000);
    let observer = ObserverLocation::from_degrees(-24.6, -70.4, 2635.0).unwrap();
    let params = camera();
    let mask = SkyMask::above_altitude(&params, 10.0 * RADEG);
    let detector = CloudDetector::default();

    let epoch = utc_epoch(2025, 6, 1, 4, 0, 0);
    let image = SkyRenderer::new(params).render_catalog(&catalog, &HorizonFrame::new(&observer, &epoch), 4.0);

    c.bench_function("evaluate/2000_stars", |b| {
        b.iter(|| {
            detector
                .evaluate(black_box(&image), &epoch, &observer, &catalog, &mask, &params)
                .unwrap()
        })
    });

    let frames: Vec<Frame> = (0..16u8)
        .map(|i| {
            let epoch = utc_epoch(2025, 6, 1, i / 4, 15 * (i % 4), 0);
            let image = SkyRenderer::new(params).render_catalog(
                &catalog,
                &HorizonFrame::new(&observer, &epoch),
                4.0,
            );
            Frame { image, epoch }
        })
        .collect();

    let mut group = c.benchmark_group("evaluate_batch");
    group.sample_size(20);
    group.bench_function("16_frames", |b| {
        b.iter(|| detector.evaluate_batch(black_box(&frames), &observer, &catalog, &mask, &params))
    });
    group.finish();
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
