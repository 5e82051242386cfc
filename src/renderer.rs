// this_file: src/renderer.rs
//! The rendering orchestrator.
//!
//! `Renderer` holds the collaborators and per-job configuration and turns a
//! sampled word into a labeled training image: background synthesis, text
//! placement, optional line overlay, perspective warp, crop/rescale and the
//! post-effect chain. A `Renderer` is immutable after construction and safe
//! to share across worker threads; every call owns its random stream.

use crate::background::BackgroundPool;
use crate::corpus::Corpus;
use crate::effects::{BlurStyle, EffectProbs, EffectToggles};
use crate::error::{Error, Result};
use crate::font::{Font, FontPool};
use crate::geometry::{clipped_rand_norm, BoundingRect, PerspectiveTransform, Quad, WarpBackend};
use crate::liner::{Liner, SimpleLiner};
use crate::logging::Timer;
use crate::noiser::{AdditiveNoiser, Noiser};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default rotation bounds in degrees around the X, Y and Z axes.
pub const DEFAULT_MAX_ROTATE: (f64, f64, f64) = (25.0, 25.0, 5.0);

/// Vertical field of view of the simulated camera, in degrees.
const FOVY_DEG: f64 = 50.0;

/// Smallest randomized target text height in the crop stage.
const MIN_DST_HEIGHT: u32 = 25;

/// Background canvases are this many times larger than the measured word,
/// so the warped text region stays inside canvas bounds.
const CANVAS_FACTOR: u32 = 8;

/// Whether `gen_img` performs the real crop or replaces it with a
/// diagnostic overlay of the tracked boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    #[default]
    Production,
    Debug,
}

/// Per-job renderer configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RendererConfig {
    pub out_width: u32,
    pub out_height: u32,
    pub mode: OutputMode,
    pub warp_backend: WarpBackend,
    pub toggles: EffectToggles,
    pub probs: EffectProbs,
    pub max_rotate_x: f64,
    pub max_rotate_y: f64,
    pub max_rotate_z: f64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            out_width: 256,
            out_height: 32,
            mode: OutputMode::Production,
            warp_backend: WarpBackend::Direct,
            toggles: EffectToggles::default(),
            probs: EffectProbs::default(),
            max_rotate_x: DEFAULT_MAX_ROTATE.0,
            max_rotate_y: DEFAULT_MAX_ROTATE.1,
            max_rotate_z: DEFAULT_MAX_ROTATE.2,
        }
    }
}

/// Crop arithmetic derived from a warped text bounding box.
///
/// `scale` is chosen so the binding dimension (height against the randomized
/// target height, or width against the output width) exactly fills the
/// output after resize; neither dimension can overflow.
#[derive(Debug, Clone, Copy)]
pub struct CropPlan {
    pub scale: f64,
    s_x: f64,
    s_y: f64,
    s_width: i64,
    s_height: i64,
    pub x_max_offset: u32,
    pub y_max_offset: u32,
    out_width: u32,
    out_height: u32,
}

/// A placed crop window: `dst_bbox` in source-image coordinates, plus the
/// debug-overlay rectangle (`dst_bbox` rescaled by `scale` again).
#[derive(Debug, Clone, Copy)]
pub struct CropPlacement {
    pub dst_bbox: BoundingRect,
    pub crop_bbox: BoundingRect,
}

impl CropPlan {
    pub fn new(
        bbox: BoundingRect,
        dst_height: u32,
        out_width: u32,
        out_height: u32,
    ) -> Result<Self> {
        if bbox.height <= 0 || bbox.width <= 0 {
            return Err(Error::DegenerateGeometry(format!(
                "text box collapsed to {}x{}",
                bbox.width, bbox.height
            )));
        }
        let scale = f64::max(
            bbox.height as f64 / dst_height as f64,
            bbox.width as f64 / out_width as f64,
        );
        let s_width = (bbox.width as f64 / scale).ceil() as i64;
        let s_height = (bbox.height as f64 / scale).ceil() as i64;
        let s_x = (bbox.x as f64 / scale).round();
        let s_y = (bbox.y as f64 / scale).round();
        Ok(Self {
            scale,
            s_x,
            s_y,
            s_width,
            s_height,
            x_max_offset: (out_width as i64 - s_width).max(0) as u32,
            y_max_offset: (out_height as i64 - s_height).max(0) as u32,
            out_width,
            out_height,
        })
    }

    /// Place the crop window for the given jitter offsets (in scaled
    /// coordinates, 0 ..= max offset per axis).
    pub fn place(&self, x_offset: u32, y_offset: u32) -> CropPlacement {
        let dst_bbox = BoundingRect {
            x: ((self.s_x - x_offset as f64) * self.scale).round() as i64,
            y: ((self.s_y - y_offset as f64) * self.scale).round() as i64,
            width: (self.out_width as f64 * self.scale).round() as i64,
            height: (self.out_height as f64 * self.scale).round() as i64,
        };
        let crop_bbox = BoundingRect {
            x: (dst_bbox.x as f64 * self.scale).round() as i64,
            y: (dst_bbox.y as f64 * self.scale).round() as i64,
            width: (dst_bbox.width as f64 * self.scale).round() as i64,
            height: (dst_bbox.height as f64 * self.scale).round() as i64,
        };
        CropPlacement { dst_bbox, crop_bbox }
    }
}

fn check_within(window: &BoundingRect, width: u32, height: u32) -> Result<()> {
    if window.x < 0
        || window.y < 0
        || window.width <= 0
        || window.height <= 0
        || window.x + window.width > width as i64
        || window.y + window.height > height as i64
    {
        return Err(Error::DegenerateGeometry(format!(
            "crop window ({}, {}, {}, {}) outside image {}x{}",
            window.x, window.y, window.width, window.height, width, height
        )));
    }
    Ok(())
}

/// Builder for [`Renderer`]; collaborators without sensible defaults
/// (corpus, fonts) must be provided explicitly.
pub struct RendererBuilder {
    corpus: Option<Box<dyn Corpus>>,
    fonts: Option<Box<dyn FontPool>>,
    backgrounds: BackgroundPool,
    liner: Box<dyn Liner>,
    noiser: Box<dyn Noiser>,
    config: RendererConfig,
}

impl RendererBuilder {
    pub fn new() -> Self {
        Self {
            corpus: None,
            fonts: None,
            backgrounds: BackgroundPool::empty(),
            liner: Box::new(SimpleLiner),
            noiser: Box::new(AdditiveNoiser),
            config: RendererConfig::default(),
        }
    }

    pub fn corpus(mut self, corpus: impl Corpus + 'static) -> Self {
        self.corpus = Some(Box::new(corpus));
        self
    }

    pub fn fonts(mut self, fonts: impl FontPool + 'static) -> Self {
        self.fonts = Some(Box::new(fonts));
        self
    }

    pub fn backgrounds(mut self, backgrounds: BackgroundPool) -> Self {
        self.backgrounds = backgrounds;
        self
    }

    pub fn liner(mut self, liner: impl Liner + 'static) -> Self {
        self.liner = Box::new(liner);
        self
    }

    pub fn noiser(mut self, noiser: impl Noiser + 'static) -> Self {
        self.noiser = Box::new(noiser);
        self
    }

    pub fn output_size(mut self, width: u32, height: u32) -> Self {
        self.config.out_width = width;
        self.config.out_height = height;
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn warp_backend(mut self, backend: WarpBackend) -> Self {
        self.config.warp_backend = backend;
        self
    }

    pub fn toggles(mut self, toggles: EffectToggles) -> Self {
        self.config.toggles = toggles;
        self
    }

    pub fn probs(mut self, probs: EffectProbs) -> Self {
        self.config.probs = probs;
        self
    }

    pub fn max_rotations(mut self, x: f64, y: f64, z: f64) -> Self {
        self.config.max_rotate_x = x;
        self.config.max_rotate_y = y;
        self.config.max_rotate_z = z;
        self
    }

    pub fn build(self) -> Result<Renderer> {
        let corpus = self
            .corpus
            .ok_or_else(|| Error::Configuration("no corpus provided".into()))?;
        let fonts = self
            .fonts
            .ok_or_else(|| Error::Configuration("no font pool provided".into()))?;
        if self.config.out_width == 0 {
            return Err(Error::Configuration("output width must be positive".into()));
        }
        if self.config.out_height < MIN_DST_HEIGHT {
            return Err(Error::Configuration(format!(
                "output height must be at least {}, got {}",
                MIN_DST_HEIGHT, self.config.out_height
            )));
        }
        if !self.config.probs.validate() {
            return Err(Error::Configuration(
                "effect probabilities must be within [0, 1]".into(),
            ));
        }
        Ok(Renderer {
            corpus,
            fonts,
            backgrounds: self.backgrounds,
            liner: self.liner,
            noiser: self.noiser,
            config: self.config,
        })
    }
}

impl Default for RendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Synthetic text-image generator.
pub struct Renderer {
    corpus: Box<dyn Corpus>,
    fonts: Box<dyn FontPool>,
    backgrounds: BackgroundPool,
    liner: Box<dyn Liner>,
    noiser: Box<dyn Noiser>,
    config: RendererConfig,
}

impl Renderer {
    pub fn builder() -> RendererBuilder {
        RendererBuilder::new()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Generate one labeled sample: the rendered image and its ground-truth
    /// word. Failures are per-sample; callers decide whether to resample.
    pub fn gen_img<R: Rng>(&self, rng: &mut R) -> Result<(GrayImage, String)> {
        let _timer = Timer::new("gen_img");

        let word = self.corpus.get_sample(rng)?;
        let (font, word_size) = self.fonts.pick(&word, rng)?;
        debug!("word {:?} measured at {}x{}", word, word_size.0, word_size.1);

        let bg = self.backgrounds.generate(
            word_size.0.saturating_mul(CANVAS_FACTOR),
            word_size.1.saturating_mul(CANVAS_FACTOR),
            rng,
        )?;

        let (mut image, mut quad, color) = self.draw_text_on_bg(&word, font.as_ref(), bg, rng)?;

        if self.config.toggles.line && rng.random_bool(self.config.probs.line) {
            let (lined, lined_quad) = self.liner.apply(image, quad, color, rng)?;
            image = lined;
            quad = lined_quad;
        }

        let (warped, canvas_quad, text_quad) = self.apply_perspective(&image, &quad, rng)?;

        let mut image = match self.config.mode {
            OutputMode::Production => self.crop_img(&warped, &text_quad, rng)?.0,
            OutputMode::Debug => self.debug_overlay(warped, &canvas_quad, &text_quad, rng)?,
        };

        if self.config.toggles.noise && rng.random_bool(self.config.probs.noise) {
            image = self.noiser.apply(image, rng)?;
        }

        let style = BlurStyle::choose(&self.config.toggles, &self.config.probs, rng);
        debug!("blur style {:?}", style);
        let image = style.apply(image, rng);

        Ok((image, word))
    }

    /// Rasterize the word centered on the background, in a color darker
    /// than 2/3 of the background mean.
    fn draw_text_on_bg<R: Rng>(
        &self,
        word: &str,
        font: &dyn Font,
        bg: GrayImage,
        rng: &mut R,
    ) -> Result<(GrayImage, Quad, u8)> {
        let (bg_w, bg_h) = bg.dimensions();
        let (word_w, word_h) = font.measure(word)?;
        if word_w == 0 || word_h == 0 {
            return Err(Error::DegenerateGeometry(format!(
                "word {:?} has zero ink extent",
                word
            )));
        }

        let text_x = ((bg_w - word_w.min(bg_w)) / 2) as i32;
        let text_y = ((bg_h - word_h.min(bg_h)) / 2) as i32;

        let sum: u64 = bg.as_raw().iter().map(|&p| p as u64).sum();
        let mean = sum / bg.as_raw().len() as u64;
        // May still be unreadable on near-flat procedural backgrounds;
        // accepted limitation of the color policy.
        let color_limit = (mean * 2 / 3) as u8;
        let color = rng.random_range(0..=color_limit);

        let (off_x, off_y) = font.offset(word)?;
        let mut image = bg;
        font.render(&mut image, (text_x - off_x, text_y - off_y), word, color)?;

        let quad = Quad::from_rect(text_x as f64, text_y as f64, word_w as f64, word_h as f64);
        Ok((image, quad, color))
    }

    /// Warp the canvas with randomized 3D rotation angles and co-transform
    /// the text quad.
    fn apply_perspective<R: Rng>(
        &self,
        image: &GrayImage,
        quad: &Quad,
        rng: &mut R,
    ) -> Result<(GrayImage, Quad, Quad)> {
        let x = clipped_rand_norm(self.config.max_rotate_x, rng);
        let y = clipped_rand_norm(self.config.max_rotate_y, rng);
        let z = clipped_rand_norm(self.config.max_rotate_z, rng);
        debug!("perspective angles x={:.2} y={:.2} z={:.2}", x, y, z);

        let (width, height) = image.dimensions();
        let transform = PerspectiveTransform::from_angles(x, y, z, 1.0, FOVY_DEG, width, height)?;
        let warped = transform.warp_image(image, self.config.warp_backend)?;
        let text_quad = transform.transform_quad(quad)?;
        Ok((warped, transform.canvas_quad(), text_quad))
    }

    /// Crop a window around the warped text box and resize it to the fixed
    /// output resolution.
    fn crop_img<R: Rng>(
        &self,
        image: &GrayImage,
        quad: &Quad,
        rng: &mut R,
    ) -> Result<(GrayImage, BoundingRect)> {
        let bbox = quad.bounding_rect();

        // Larger rotation angles enlarge the bbox, so resizing to the same
        // randomized height renders more-rotated samples smaller.
        let dst_height = rng.random_range(MIN_DST_HEIGHT..=self.config.out_height);

        let plan = CropPlan::new(bbox, dst_height, self.config.out_width, self.config.out_height)?;
        let y_offset = if plan.y_max_offset > 0 {
            rng.random_range(0..=plan.y_max_offset)
        } else {
            0
        };
        let x_offset = if plan.x_max_offset > 0 {
            rng.random_range(0..=plan.x_max_offset)
        } else {
            0
        };
        let placement = plan.place(x_offset, y_offset);

        let (img_w, img_h) = image.dimensions();
        let window = placement.dst_bbox;
        check_within(&window, img_w, img_h)?;

        // Crop first, then resize; rounding the window after scaling would
        // shift the text within the output.
        let crop = imageops::crop_imm(
            image,
            window.x as u32,
            window.y as u32,
            window.width as u32,
            window.height as u32,
        )
        .to_image();
        let out = imageops::resize(
            &crop,
            self.config.out_width,
            self.config.out_height,
            FilterType::CatmullRom,
        );

        Ok((out, placement.crop_bbox))
    }

    /// Diagnostic path: overlay the warped canvas quad, the warped text
    /// quad and the would-be crop window instead of cropping.
    fn debug_overlay<R: Rng>(
        &self,
        mut image: GrayImage,
        canvas_quad: &Quad,
        text_quad: &Quad,
        rng: &mut R,
    ) -> Result<GrayImage> {
        let (_, crop_bbox) = self.crop_img(&image, text_quad, rng)?;
        draw_quad(&mut image, canvas_quad, Luma([230]));
        draw_quad(&mut image, text_quad, Luma([0]));
        draw_bbox(&mut image, &crop_bbox, Luma([128]));
        Ok(image)
    }
}

fn draw_quad(image: &mut GrayImage, quad: &Quad, color: Luma<u8>) {
    let points = quad.points();
    for i in 0..4 {
        let a = points[i];
        let b = points[(i + 1) % 4];
        draw_line_segment_mut(
            image,
            (a[0] as f32, a[1] as f32),
            (b[0] as f32, b[1] as f32),
            color,
        );
    }
}

fn draw_bbox(image: &mut GrayImage, bbox: &BoundingRect, color: Luma<u8>) {
    if bbox.width <= 0 || bbox.height <= 0 {
        return;
    }
    let rect = Rect::at(bbox.x as i32, bbox.y as i32)
        .of_size(bbox.width as u32, bbox.height as u32);
    draw_hollow_rect_mut(image, rect, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn crop_plan_worked_example() {
        // Word "OK" at 24pt measuring 40x20, placed centered on a 320x160
        // canvas, unrotated: bbox (140, 70, 40, 20), target height 32.
        let bbox = BoundingRect {
            x: 140,
            y: 70,
            width: 40,
            height: 20,
        };
        let plan = CropPlan::new(bbox, 32, 256, 32).expect("plan");
        assert_relative_eq!(plan.scale, 0.625, epsilon = 1e-12);
        assert_eq!(plan.x_max_offset, 192);
        assert_eq!(plan.y_max_offset, 0);

        let placement = plan.place(0, 0);
        assert_eq!(
            placement.dst_bbox,
            BoundingRect {
                x: 140,
                y: 70,
                width: 160,
                height: 20
            }
        );
    }

    #[test]
    fn crop_plan_width_bound() {
        // A wide flat box: width drives the scale.
        let bbox = BoundingRect {
            x: 0,
            y: 0,
            width: 512,
            height: 10,
        };
        let plan = CropPlan::new(bbox, 32, 256, 32).expect("plan");
        assert_relative_eq!(plan.scale, 2.0, epsilon = 1e-12);
        let placement = plan.place(0, 0);
        assert_eq!(placement.dst_bbox.width, 512);
        assert_eq!(placement.dst_bbox.height, 64);
    }

    #[test]
    fn crop_plan_offset_moves_window_back() {
        let bbox = BoundingRect {
            x: 140,
            y: 70,
            width: 40,
            height: 20,
        };
        let plan = CropPlan::new(bbox, 32, 256, 32).expect("plan");
        let jittered = plan.place(16, 0);
        let flush = plan.place(0, 0);
        assert_eq!(jittered.dst_bbox.x, flush.dst_bbox.x - 10);
    }

    #[test]
    fn zero_height_bbox_is_degenerate() {
        let bbox = BoundingRect {
            x: 10,
            y: 10,
            width: 40,
            height: 0,
        };
        assert!(matches!(
            CropPlan::new(bbox, 32, 256, 32),
            Err(Error::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn crop_window_bounds_are_enforced() {
        let inside = BoundingRect {
            x: 0,
            y: 0,
            width: 100,
            height: 50,
        };
        assert!(check_within(&inside, 100, 50).is_ok());

        let outside = BoundingRect {
            x: 90,
            y: 40,
            width: 160,
            height: 20,
        };
        assert!(matches!(
            check_within(&outside, 100, 50),
            Err(Error::DegenerateGeometry(_))
        ));

        let negative = BoundingRect {
            x: -5,
            y: 0,
            width: 50,
            height: 20,
        };
        assert!(check_within(&negative, 100, 50).is_err());
    }

    #[test]
    fn builder_rejects_missing_collaborators() {
        let result = Renderer::builder().build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn draw_bbox_clips_out_of_range_windows() {
        let mut image = GrayImage::from_pixel(16, 16, Luma([255]));
        let bbox = BoundingRect {
            x: 8,
            y: 8,
            width: 100,
            height: 100,
        };
        draw_bbox(&mut image, &bbox, Luma([0]));
        assert_eq!(image.get_pixel(10, 8)[0], 0);
    }
}
