//! Synthetic star field through a lens calibration.
//!
//! Draws the stars and bright solar-system bodies that should be in view as filled disks, brighter stars larger
//! (radius `max(1, 7 - mag)` pixels, truncated to whole pixels), on a black frame of the
//! calibrated size. Overlaying the rendering on a real frame shows at a glance whether a
//! calibration fits; [`SkyRenderer::find_star`] turns a click on the rendering into a
//! reference correspondence candidate.

use crate::catalog::StarCatalog;
use crate::constants::{Magnitude, Pixel};
use crate::ephemeris::{HorizonFrame, TopocentricPosition};
use crate::frame::{SkyImage, FULL_SCALE};
use crate::projection::CalibrationParameters;

/// A star placed on the rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStar {
    pub name: String,
    pub magnitude: Magnitude,
    pub position: TopocentricPosition,
    pub x: Pixel,
    pub y: Pixel,
}

/// Renderer bound to one calibration.
#[derive(Debug, Clone)]
pub struct SkyRenderer {
    params: CalibrationParameters,
    stars: Vec<RenderedStar>,
}

impl SkyRenderer {
    pub fn new(params: CalibrationParameters) -> Self {
        SkyRenderer {
            params,
            stars: Vec::new(),
        }
    }

    /// Stars placed by the last render call.
    pub fn stars(&self) -> &[RenderedStar] {
        &self.stars
    }

    /// Place every above-horizon catalog star and solar-system body brighter than
    /// `max_magnitude` and draw them.
    ///
    /// The bodies of [`HorizonFrame::bodies`] come first, so [`SkyRenderer::find_star`]
    /// can also pick a planet or the Moon as a reference.
    pub fn render_catalog(
        &mut self,
        catalog: &StarCatalog,
        horizon: &HorizonFrame,
        max_magnitude: Magnitude,
    ) -> SkyImage {
        let bodies = horizon
            .bodies()
            .into_iter()
            .map(|b| (b.body.name().to_string(), b.magnitude, b.position));
        let stars = catalog
            .iter()
            .map(|s| (s.name.clone(), s.magnitude, horizon.topocentric(s)));

        let positions: Vec<(String, Magnitude, TopocentricPosition)> = bodies
            .chain(stars)
            .filter(|(_, magnitude, _)| *magnitude < max_magnitude)
            .collect();
        self.render(positions)
    }

    /// Draw named positions; below-horizon entries are skipped.
    pub fn render(
        &mut self,
        positions: impl IntoIterator<Item = (String, Magnitude, TopocentricPosition)>,
    ) -> SkyImage {
        self.stars = positions
            .into_iter()
            .filter(|(_, _, p)| p.is_above_horizon())
            .map(|(name, magnitude, position)| {
                let (x, y) = self.params.forward(position.altitude, position.azimuth);
                RenderedStar {
                    name,
                    magnitude,
                    position,
                    x,
                    y,
                }
            })
            .collect();

        let mut image = SkyImage::dark(self.params.image_width, self.params.image_height);
        for star in &self.stars {
            let radius = (7.0 - star.magnitude).max(1.0).trunc();
            fill_disk(&mut image, star.x, star.y, radius, FULL_SCALE);
        }
        image
    }

    /// Rendered star nearest to `(x, y)`, if closer than `radius` pixels.
    pub fn find_star(&self, x: Pixel, y: Pixel, radius: Pixel) -> Option<&RenderedStar> {
        self.stars
            .iter()
            .map(|s| (s, (s.x - x).powi(2) + (s.y - y).powi(2)))
            .filter(|(_, d2)| *d2 < radius * radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, _)| s)
    }
}

/// Paint a filled disk centered on the pixel nearest to `(x, y)`, clipped to the image.
pub fn fill_disk(image: &mut SkyImage, x: Pixel, y: Pixel, radius: f64, value: f32) {
    if !(x.is_finite() && y.is_finite()) {
        return;
    }
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    let reach = radius.ceil() as i64;
    let grid = image.as_array_mut();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if ((dx * dx + dy * dy) as f64) > radius * radius {
                continue;
            }
            let (col, row) = (cx + dx, cy + dy);
            if col < 0 || row < 0 {
                continue;
            }
            if let Some(px) = grid.get_mut((row as usize, col as usize)) {
                *px = value;
            }
        }
    }
}
