// this_file: src/noiser.rs
//! Additive noise collaborator applied to the finished crop.

use crate::error::Result;
use image::GrayImage;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};

/// Adds pixel noise to a finished sample.
pub trait Noiser: Send + Sync {
    fn apply(&self, image: GrayImage, rng: &mut dyn RngCore) -> Result<GrayImage>;
}

/// Default noiser: 50/50 gaussian noise (sigma drawn from [1, 10)) or
/// uniform noise (amplitude drawn from [5, 30)), added per pixel with
/// saturation at the value range edges.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdditiveNoiser;

impl Noiser for AdditiveNoiser {
    fn apply(&self, mut image: GrayImage, rng: &mut dyn RngCore) -> Result<GrayImage> {
        if rng.random_bool(0.5) {
            let sigma = rng.random_range(1.0..10.0f64);
            let Ok(normal) = Normal::new(0.0, sigma) else {
                return Ok(image);
            };
            for pixel in image.pixels_mut() {
                let noise = normal.sample(rng);
                pixel[0] = (pixel[0] as f64 + noise).round().clamp(0.0, 255.0) as u8;
            }
        } else {
            let amplitude = rng.random_range(5.0..30.0f64);
            for pixel in image.pixels_mut() {
                let noise = rng.random_range(-amplitude..amplitude);
                pixel[0] = (pixel[0] as f64 + noise).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn noise_changes_pixels() {
        let image = GrayImage::from_pixel(32, 32, image::Luma([128]));
        let noiser = AdditiveNoiser;
        let mut rng = StdRng::seed_from_u64(4);
        let out = noiser.apply(image.clone(), &mut rng).expect("noise");
        assert_eq!(out.dimensions(), image.dimensions());
        assert!(
            out.pixels().zip(image.pixels()).any(|(a, b)| a[0] != b[0]),
            "noise left the image untouched"
        );
    }

    #[test]
    fn noise_saturates_at_range_edges() {
        let image = GrayImage::from_pixel(16, 16, image::Luma([255]));
        let noiser = AdditiveNoiser;
        let mut rng = StdRng::seed_from_u64(4);
        let out = noiser.apply(image, &mut rng).expect("noise");
        assert!(out.pixels().all(|p| p[0] <= 255));
    }
}
