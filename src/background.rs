// this_file: src/background.rs
//! Background canvas synthesis.
//!
//! Canvases are requested at 8x the measured word size so the warped text
//! region always stays inside canvas bounds after perspective distortion.
//! Half the time the canvas is procedural near-white noise smoothed with a
//! heavy Gaussian blur; otherwise a stock image is resized (without
//! preserving aspect ratio) to the requested size.

use crate::effects::random_gauss_blur;
use crate::error::{Error, Result};
use image::imageops::{self, FilterType};
use image::GrayImage;
use log::{debug, warn};
use rand::Rng;
use std::path::Path;

/// Kernel sizes for smoothing procedural backgrounds.
const BG_BLUR_KERNELS: &[u32] = &[7, 9, 11, 13];

/// Immutable pool of pre-decoded stock background images.
pub struct BackgroundPool {
    images: Vec<GrayImage>,
}

impl BackgroundPool {
    /// Pool with no stock images; only the procedural path will be used.
    pub fn empty() -> Self {
        Self { images: Vec::new() }
    }

    pub fn new(images: Vec<GrayImage>) -> Self {
        Self { images }
    }

    /// Decode every readable image in a directory to grayscale.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut images = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match image::open(&path) {
                Ok(img) => images.push(img.into_luma8()),
                Err(e) => warn!("skipping background {}: {}", path.display(), e),
            }
        }
        if images.is_empty() {
            return Err(Error::Configuration(format!(
                "no readable background images in {}",
                dir.display()
            )));
        }
        debug!("Loaded {} background images", images.len());
        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Produce a canvas of exactly (width, height): 50/50 procedural noise
    /// or a resized stock image. An empty pool always takes the
    /// procedural path.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        width: u32,
        height: u32,
        rng: &mut R,
    ) -> Result<GrayImage> {
        if width == 0 || height == 0 {
            return Err(Error::DegenerateGeometry(
                "background canvas has zero size".into(),
            ));
        }
        if self.images.is_empty() || rng.random_bool(0.5) {
            Ok(gen_rand_bg(width, height, rng))
        } else {
            Ok(self.from_stock(width, height, rng))
        }
    }

    fn from_stock<R: Rng + ?Sized>(&self, width: u32, height: u32, rng: &mut R) -> GrayImage {
        let stock = &self.images[rng.random_range(0..self.images.len())];
        imageops::resize(stock, width, height, FilterType::Triangle)
    }
}

/// Procedural background: a narrow band of near-white values drawn
/// per-pixel, then smoothed with a heavy Gaussian blur.
pub fn gen_rand_bg<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> GrayImage {
    let bg_high = rng.random_range(220.0..255.0f64);
    let bg_low = bg_high - rng.random_range(1.0..60.0f64);

    let low = bg_low.floor().max(0.0) as u32;
    let high = bg_high.floor() as u32;

    let mut bg = GrayImage::new(width, height);
    for pixel in bg.pixels_mut() {
        pixel[0] = rng.random_range(low..high) as u8;
    }

    random_gauss_blur(&bg, BG_BLUR_KERNELS, rng)
}
