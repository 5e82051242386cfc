// this_file: src/effects.rs
//! Post-processing effects: configuration, the blur-style choice and the
//! blur/prydown implementations.
//!
//! Blur and prydown are mutually exclusive per sample. Instead of nested
//! conditionals the choice is a single tagged value picked once, so the
//! exclusivity is structural.

use image::imageops::{self, FilterType};
use image::GrayImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which effect categories are eligible to fire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EffectToggles {
    pub blur: bool,
    pub prydown: bool,
    pub line: bool,
    pub noise: bool,
}

impl Default for EffectToggles {
    fn default() -> Self {
        Self {
            blur: true,
            prydown: true,
            line: false,
            noise: true,
        }
    }
}

impl EffectToggles {
    /// Disable every effect category.
    pub fn none() -> Self {
        Self {
            blur: false,
            prydown: false,
            line: false,
            noise: false,
        }
    }
}

/// Per-effect trigger probabilities in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EffectProbs {
    pub blur: f64,
    pub prydown: f64,
    pub line: f64,
    pub noise: f64,
}

impl Default for EffectProbs {
    fn default() -> Self {
        Self {
            blur: 0.03,
            prydown: 0.03,
            line: 0.10,
            noise: 1.0,
        }
    }
}

impl EffectProbs {
    pub(crate) fn validate(&self) -> bool {
        [self.blur, self.prydown, self.line, self.noise]
            .iter()
            .all(|p| (0.0..=1.0).contains(p))
    }
}

/// The blur treatment applied to a finished sample. At most one fires; if
/// the blur gate triggers, prydown is never considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurStyle {
    Off,
    Gaussian,
    Box,
    Prydown,
}

impl BlurStyle {
    /// Draw the per-sample blur style from the configured gates.
    pub fn choose<R: Rng + ?Sized>(
        toggles: &EffectToggles,
        probs: &EffectProbs,
        rng: &mut R,
    ) -> Self {
        if toggles.blur && rng.random_bool(probs.blur) {
            if rng.random_bool(0.5) {
                BlurStyle::Gaussian
            } else {
                BlurStyle::Box
            }
        } else if toggles.prydown && rng.random_bool(probs.prydown) {
            BlurStyle::Prydown
        } else {
            BlurStyle::Off
        }
    }

    /// Apply the chosen style.
    pub fn apply<R: Rng + ?Sized>(&self, image: GrayImage, rng: &mut R) -> GrayImage {
        match self {
            BlurStyle::Off => image,
            BlurStyle::Gaussian => random_gauss_blur(&image, &[3, 5], rng),
            BlurStyle::Box => random_box_blur(&image, &[2, 3], rng),
            BlurStyle::Prydown => prydown(&image, rng),
        }
    }
}

/// Gaussian blur with a kernel size drawn from `kernels`. For small kernels
/// (≤ 3) sigma is drawn from {0..7}; a zero sigma falls back to the value
/// the kernel size implies (`0.3·((k−1)·0.5 − 1) + 0.8`).
pub fn random_gauss_blur<R: Rng + ?Sized>(
    image: &GrayImage,
    kernels: &[u32],
    rng: &mut R,
) -> GrayImage {
    let ksize = kernels[rng.random_range(0..kernels.len())];
    let mut sigma = 0.0f32;
    if ksize <= 3 {
        sigma = rng.random_range(0..=7) as f32;
    }
    if sigma <= 0.0 {
        sigma = 0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Mean blur with a kernel size drawn from `kernels`. Kernel sizes here can
/// be even, which `imageproc::filter::box_filter` cannot express, so the
/// window sum is done directly with replicated borders.
pub fn random_box_blur<R: Rng + ?Sized>(
    image: &GrayImage,
    kernels: &[u32],
    rng: &mut R,
) -> GrayImage {
    let kernel = kernels[rng.random_range(0..kernels.len())];
    box_blur(image, kernel)
}

fn box_blur(image: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let anchor = (kernel / 2) as i64;
    let count = (kernel * kernel) as u32;

    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0u32;
        for dy in 0..kernel as i64 {
            let sy = (y as i64 + dy - anchor).clamp(0, height as i64 - 1) as u32;
            for dx in 0..kernel as i64 {
                let sx = (x as i64 + dx - anchor).clamp(0, width as i64 - 1) as u32;
                sum += image.get_pixel(sx, sy)[0] as u32;
            }
        }
        image::Luma([((sum + count / 2) / count) as u8])
    })
}

/// Simulated low-resolution capture: downscale by a random factor in
/// [1, 2.2) and upscale back, with area-style interpolation both ways.
pub fn prydown<R: Rng + ?Sized>(image: &GrayImage, rng: &mut R) -> GrayImage {
    let scale = rng.random_range(1.0..2.2f64);
    let (width, height) = image.dimensions();
    let down_w = ((width as f64 / scale) as u32).max(1);
    let down_h = ((height as f64 / scale) as u32).max(1);

    let down = imageops::resize(image, down_w, down_h, FilterType::Triangle);
    imageops::resize(&down, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            image::Luma([((x * 11 + y * 17) % 256) as u8])
        })
    }

    #[test]
    fn blur_and_prydown_never_both_fire() {
        let toggles = EffectToggles {
            blur: true,
            prydown: true,
            line: false,
            noise: false,
        };
        let probs = EffectProbs {
            blur: 1.0,
            prydown: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let style = BlurStyle::choose(&toggles, &probs, &mut rng);
            assert!(
                matches!(style, BlurStyle::Gaussian | BlurStyle::Box),
                "blur at probability 1.0 must preempt prydown, got {:?}",
                style
            );
        }
    }

    #[test]
    fn prydown_fires_when_blur_is_disabled() {
        let toggles = EffectToggles {
            blur: false,
            prydown: true,
            line: false,
            noise: false,
        };
        let probs = EffectProbs {
            blur: 1.0,
            prydown: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            assert_eq!(
                BlurStyle::choose(&toggles, &probs, &mut rng),
                BlurStyle::Prydown
            );
        }
    }

    #[test]
    fn zero_probabilities_select_off() {
        let toggles = EffectToggles::default();
        let probs = EffectProbs {
            blur: 0.0,
            prydown: 0.0,
            line: 0.0,
            noise: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            assert_eq!(BlurStyle::choose(&toggles, &probs, &mut rng), BlurStyle::Off);
        }
    }

    #[test]
    fn box_blur_preserves_flat_regions() {
        let image = GrayImage::from_pixel(8, 8, image::Luma([200]));
        let blurred = box_blur(&image, 3);
        assert!(blurred.pixels().all(|p| p[0] == 200));
    }

    #[test]
    fn box_blur_smooths_edges() {
        let mut image = GrayImage::from_pixel(8, 8, image::Luma([0]));
        for y in 0..8 {
            for x in 4..8 {
                image.put_pixel(x, y, image::Luma([255]));
            }
        }
        let blurred = box_blur(&image, 3);
        let edge = blurred.get_pixel(4, 4)[0];
        assert!(edge > 0 && edge < 255, "edge should be smoothed, got {}", edge);
    }

    #[test]
    fn prydown_keeps_dimensions() {
        let image = gradient(64, 32);
        let mut rng = StdRng::seed_from_u64(9);
        let out = prydown(&image, &mut rng);
        assert_eq!(out.dimensions(), (64, 32));
    }

    #[test]
    fn gauss_blur_keeps_dimensions() {
        let image = gradient(32, 32);
        let mut rng = StdRng::seed_from_u64(9);
        let out = random_gauss_blur(&image, &[7, 9, 11, 13], &mut rng);
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn probs_validation() {
        assert!(EffectProbs::default().validate());
        let bad = EffectProbs {
            blur: 1.5,
            ..Default::default()
        };
        assert!(!bad.validate());
    }
}
