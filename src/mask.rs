//! Static sky mask.
//!
//! Marks which pixels see open sky. Everything else (the camera housing, trees,
//! buildings, a dome slit edge) is excluded from cloud detection: a star projected onto a
//! non-sky pixel is reported as masked out rather than occluded.

use camino::Utf8Path;
use image::GrayImage;
use ndarray::Array2;

use crate::constants::{Pixel, Radian};
use crate::frame::pixel_index;
use crate::projection::CalibrationParameters;
use crate::skycover_errors::SkycoverError;

/// Boolean sky/non-sky grid indexed `[row, column]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyMask {
    sky: Array2<bool>,
}

impl SkyMask {
    /// Every pixel is sky.
    pub fn open(width: u32, height: u32) -> Self {
        SkyMask {
            sky: Array2::from_elem((height as usize, width as usize), true),
        }
    }

    pub fn from_array(sky: Array2<bool>) -> Self {
        SkyMask { sky }
    }

    /// Non-zero luminance is sky.
    pub fn from_luma(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let sky = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            image.get_pixel(col as u32, row as u32)[0] != 0
        });
        SkyMask { sky }
    }

    /// Read a mask image; any format the `image` crate decodes, reduced to 8-bit luminance.
    ///
    /// Errors
    /// ----------
    /// * [`SkycoverError::SourceUnavailable`] if the file cannot be opened or decoded.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, SkycoverError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| SkycoverError::SourceUnavailable {
            what: "sky mask",
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_luma(&image.to_luma8()))
    }

    /// Mask of the pixels that see the sky above `min_altitude` under a calibration.
    ///
    /// Useful when no hand-drawn mask exists: everything outside the horizon circle
    /// (or a raised local horizon) is excluded.
    pub fn above_altitude(params: &CalibrationParameters, min_altitude: Radian) -> Self {
        let (width, height) = (params.image_width as usize, params.image_height as usize);
        let sky = Array2::from_shape_fn((height, width), |(row, col)| {
            let (altitude, _) = params.inverse(col as f64, row as f64);
            altitude >= min_altitude
        });
        SkyMask { sky }
    }

    pub fn width(&self) -> u32 {
        self.sky.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.sky.nrows() as u32
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Sky flag of pixel column `x`, row `y`; `false` outside the grid.
    pub fn is_sky(&self, x: usize, y: usize) -> bool {
        self.sky.get((y, x)).copied().unwrap_or(false)
    }

    /// Sky flag of the pixel nearest to a sub-pixel position.
    pub fn is_sky_at(&self, x: Pixel, y: Pixel) -> bool {
        pixel_index(x, y, self.width(), self.height())
            .map(|(col, row)| self.is_sky(col, row))
            .unwrap_or(false)
    }

    /// Fraction of sky pixels.
    pub fn sky_fraction(&self) -> f64 {
        if self.sky.is_empty() {
            return 0.0;
        }
        self.sky.iter().filter(|&&s| s).count() as f64 / self.sky.len() as f64
    }
}
