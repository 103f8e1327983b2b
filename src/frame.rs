//! Sky images and local photometry.
//!
//! A [`SkyImage`] is a luminance grid indexed `[row, column]` (i.e. `[y, x]`), with values
//! on the 8-bit scale (0–255) whatever the depth of the source file, so that detector
//! thresholds keep their meaning across cameras.
//!
//! [`SkyImage::sample`] measures a star's neighborhood: statistics over a disk around the
//! star pixel and a background level from the median of a surrounding annulus. Both
//! regions are clipped at the image border.

use std::fmt;

use camino::Utf8Path;
use image::DynamicImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::constants::Pixel;
use crate::skycover_errors::SkycoverError;

/// Full-scale value of the luminance grid.
pub const FULL_SCALE: f32 = 255.0;

/// Round a sub-pixel position to a pixel index, `None` when it falls outside a
/// `width × height` grid (or is not finite).
pub fn pixel_index(x: Pixel, y: Pixel, width: u32, height: u32) -> Option<(usize, usize)> {
    let (col, row) = (x.round(), y.round());
    if col >= 0.0 && row >= 0.0 && col < width as f64 && row < height as f64 {
        Some((col as usize, row as usize))
    } else {
        None
    }
}

/// Photometry of one star neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodSample {
    /// Mean over the disk.
    pub mean: f32,
    /// Population variance over the disk.
    pub variance: f32,
    /// Brightest disk pixel.
    pub peak: f32,
    /// Median of the annulus, or the disk minimum when the annulus is clipped away.
    pub background: f32,
    /// Disk pixels inside the image.
    pub disk_pixels: usize,
    /// Annulus pixels inside the image.
    pub background_pixels: usize,
}

impl NeighborhoodSample {
    /// Peak above background.
    pub fn signal(&self) -> f32 {
        self.peak - self.background
    }
}

/// Radii of the sampled regions, pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGeometry {
    /// Disk radius.
    pub radius: f64,
    /// Inner radius of the background annulus (exclusive).
    pub inner: f64,
    /// Outer radius of the background annulus (inclusive).
    pub outer: f64,
}

/// Single-channel sky frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyImage {
    data: Array2<f32>,
}

impl SkyImage {
    /// Wrap a `[row, column]` grid already on the 0–255 scale.
    pub fn from_array(data: Array2<f32>) -> Self {
        SkyImage { data }
    }

    /// Black image.
    pub fn dark(width: u32, height: u32) -> Self {
        SkyImage {
            data: Array2::zeros((height as usize, width as usize)),
        }
    }

    /// Reduce any decoded image to luminance on the 0–255 scale.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let luma = image.to_luma32f();
        let (width, height) = luma.dimensions();
        let data = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            luma.get_pixel(col as u32, row as u32)[0] * FULL_SCALE
        });
        SkyImage { data }
    }

    /// Decode an image file.
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::SourceUnavailable`] if the file cannot be opened or decoded.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, SkycoverError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| SkycoverError::SourceUnavailable {
            what: "sky image",
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_dynamic(&image))
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Pixel value at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        self.data.get((y, x)).copied()
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn as_array_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }

    /// Measure the neighborhood of pixel `(x, y)`.
    ///
    /// Arguments
    /// -----------------
    /// * `x`, `y`: column and row of the star pixel, inside the image.
    /// * `geometry`: disk and annulus radii.
    ///
    /// Return
    /// ----------
    /// * `None` only if no disk pixel lies inside the image.
    pub fn sample(&self, x: usize, y: usize, geometry: &SampleGeometry) -> Option<NeighborhoodSample> {
        let reach = geometry.outer.max(geometry.radius).ceil() as isize;
        let (r2, inner2, outer2) = (
            geometry.radius * geometry.radius,
            geometry.inner * geometry.inner,
            geometry.outer * geometry.outer,
        );

        let mut disk = Vec::new();
        let mut annulus = Vec::new();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let (col, row) = (x as isize + dx, y as isize + dy);
                if col < 0 || row < 0 {
                    continue;
                }
                let Some(&value) = self.data.get((row as usize, col as usize)) else {
                    continue;
                };

                let d2 = (dx * dx + dy * dy) as f64;
                if d2 <= r2 {
                    disk.push(value);
                } else if d2 > inner2 && d2 <= outer2 {
                    annulus.push(value);
                }
            }
        }

        if disk.is_empty() {
            return None;
        }

        let n = disk.len() as f32;
        let mean = disk.iter().sum::<f32>() / n;
        let variance = disk.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let peak = disk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let background_pixels = annulus.len();
        let background = match median(&mut annulus) {
            Some(m) => m,
            None => disk.iter().copied().fold(f32::INFINITY, f32::min),
        };

        Some(NeighborhoodSample {
            mean,
            variance,
            peak,
            background,
            disk_pixels: disk.len(),
            background_pixels,
        })
    }
}

impl fmt::Display for SkyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SkyImage({}x{})", self.width(), self.height())
    }
}

/// Median, averaging the two middle values of an even-sized set.
fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}
