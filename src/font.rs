// this_file: src/font.rs
//! Font collaborators: metrics, glyph rasterization and face pools.
//!
//! The pipeline only needs three things from a font handle: the ink extent
//! of a word net of its internal offset, that offset, and the ability to
//! render the word onto a gray canvas in a given color. `ScaledFont`
//! implements this with skrifa outlines rasterized through zeno;
//! `FontLibrary` loads faces from disk and hands out randomly sized handles.

use crate::error::{Error, Result};
use image::GrayImage;
use log::{debug, warn};
use memmap2::Mmap;
use rand::{Rng, RngCore};
use read_fonts::types::GlyphId;
use skrifa::instance::{LocationRef, Size};
use skrifa::outline::{DrawSettings, OutlinePen};
use skrifa::{FontRef, MetadataProvider};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeno::{Command, Mask, Transform};

/// Pixel sizes drawn per sample when picking a font.
const MIN_PX_SIZE: u32 = 20;
const MAX_PX_SIZE: u32 = 30;

/// A sized font handle, opaque to the renderer.
pub trait Font: Send + Sync {
    /// Ink extent of the word (width, height), net of the internal offset.
    fn measure(&self, word: &str) -> Result<(u32, u32)>;

    /// Offset of the word's ink from the pen origin (dx, dy).
    fn offset(&self, word: &str) -> Result<(i32, i32)>;

    /// Render the word onto the image with its pen origin at `position`,
    /// blending glyph coverage toward `color`.
    fn render(&self, image: &mut GrayImage, position: (i32, i32), word: &str, color: u8)
        -> Result<()>;
}

/// Source of per-sample font handles.
pub trait FontPool: Send + Sync {
    /// Pick a font for the word, returning the handle and the measured
    /// word size.
    fn pick(&self, word: &str, rng: &mut dyn RngCore) -> Result<(Box<dyn Font>, (u32, u32))>;
}

enum FontData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl FontData {
    fn as_bytes(&self) -> &[u8] {
        match self {
            FontData::Mapped(map) => map,
            FontData::Owned(data) => data,
        }
    }
}

/// A loaded and validated font face, shared between sized handles.
pub struct FontFace {
    path: PathBuf,
    data: FontData,
}

impl FontFace {
    /// Memory-map a font file and validate that it parses.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Resource(format!("cannot open font {}: {}", path.display(), e)))?;
        // The mapping stays valid for the life of the face; fonts are not
        // expected to change on disk while a job runs.
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::Resource(format!("cannot map font {}: {}", path.display(), e)))?;
        if map.is_empty() {
            return Err(Error::Resource(format!(
                "font file {} is empty",
                path.display()
            )));
        }
        FontRef::new(&map)
            .map_err(|e| Error::Font(format!("cannot parse font {}: {}", path.display(), e)))?;
        debug!("Loaded font: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            data: FontData::Mapped(map),
        })
    }

    /// Wrap already-loaded font bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        FontRef::new(&data).map_err(|e| Error::Font(format!("cannot parse font data: {}", e)))?;
        Ok(Self {
            path: PathBuf::from("<memory>"),
            data: FontData::Owned(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn font_ref(&self) -> Result<FontRef<'_>> {
        FontRef::new(self.data.as_bytes())
            .map_err(|e| Error::Font(format!("cannot re-parse font {}: {}", self.path.display(), e)))
    }
}

/// A face bound to a pixel size.
pub struct ScaledFont {
    face: Arc<FontFace>,
    px: f32,
}

/// Placement of one glyph's ink within the word layout.
struct PlacedGlyph {
    glyph_id: GlyphId,
    /// Pen x position at which the glyph starts, in pixels.
    pen_x: f32,
    /// Ink bounds relative to the pen position, y-up around the baseline.
    x_min: f32,
    x_max: f32,
    y_min: f32,
    y_max: f32,
}

/// Word layout: placed glyphs plus the ink rectangle in y-down layout
/// coordinates (origin at the pen start, baseline at `ascent`).
struct WordLayout {
    glyphs: Vec<PlacedGlyph>,
    ascent: f32,
    ink_x0: f32,
    ink_y0: f32,
    ink_x1: f32,
    ink_y1: f32,
}

impl ScaledFont {
    pub fn new(face: Arc<FontFace>, px: f32) -> Result<Self> {
        if px <= 0.0 {
            return Err(Error::Configuration(format!(
                "font pixel size must be positive, got {}",
                px
            )));
        }
        Ok(Self { face, px })
    }

    pub fn px(&self) -> f32 {
        self.px
    }

    fn layout(&self, word: &str) -> Result<WordLayout> {
        let font = self.face.font_ref()?;
        let size = Size::new(self.px);
        let location = LocationRef::default();
        let charmap = font.charmap();
        let glyph_metrics = font.glyph_metrics(size, location);
        let metrics = font.metrics(size, location);
        let outlines = font.outline_glyphs();

        let mut glyphs = Vec::new();
        let mut pen_x = 0.0f32;
        let mut ink_x0 = f32::INFINITY;
        let mut ink_y0 = f32::INFINITY;
        let mut ink_x1 = f32::NEG_INFINITY;
        let mut ink_y1 = f32::NEG_INFINITY;

        for ch in word.chars() {
            let Some(glyph_id) = charmap.map(ch) else {
                warn!(
                    "font {} has no glyph for {:?}, skipping",
                    self.face.path.display(),
                    ch
                );
                continue;
            };
            let advance = glyph_metrics.advance_width(glyph_id).unwrap_or(self.px * 0.5);

            if let Some(outline) = outlines.get(glyph_id) {
                let mut bounds = BoundsPen::default();
                let settings = DrawSettings::unhinted(size, location);
                let _ = outline.draw(settings, &mut bounds);
                if let Some((x_min, y_min, x_max, y_max)) = bounds.bounds() {
                    ink_x0 = ink_x0.min(pen_x + x_min);
                    ink_x1 = ink_x1.max(pen_x + x_max);
                    // Convert y-up outline coords to y-down layout coords.
                    ink_y0 = ink_y0.min(metrics.ascent - y_max);
                    ink_y1 = ink_y1.max(metrics.ascent - y_min);
                    glyphs.push(PlacedGlyph {
                        glyph_id,
                        pen_x,
                        x_min,
                        x_max,
                        y_min,
                        y_max,
                    });
                }
            }
            pen_x += advance;
        }

        if glyphs.is_empty() {
            return Err(Error::Font(format!(
                "word {:?} has no visible ink in font {}",
                word,
                self.face.path.display()
            )));
        }

        Ok(WordLayout {
            glyphs,
            ascent: metrics.ascent,
            ink_x0,
            ink_y0,
            ink_x1,
            ink_y1,
        })
    }
}

impl Font for ScaledFont {
    fn measure(&self, word: &str) -> Result<(u32, u32)> {
        let layout = self.layout(word)?;
        let width = layout.ink_x1.ceil() - layout.ink_x0.floor();
        let height = layout.ink_y1.ceil() - layout.ink_y0.floor();
        Ok((width.max(0.0) as u32, height.max(0.0) as u32))
    }

    fn offset(&self, word: &str) -> Result<(i32, i32)> {
        let layout = self.layout(word)?;
        Ok((layout.ink_x0.floor() as i32, layout.ink_y0.floor() as i32))
    }

    fn render(
        &self,
        image: &mut GrayImage,
        position: (i32, i32),
        word: &str,
        color: u8,
    ) -> Result<()> {
        let font = self.face.font_ref()?;
        let size = Size::new(self.px);
        let location = LocationRef::default();
        let outlines = font.outline_glyphs();
        let layout = self.layout(word)?;
        let baseline_y = position.1 + layout.ascent.round() as i32;

        for placed in &layout.glyphs {
            let Some(outline) = outlines.get(placed.glyph_id) else {
                continue;
            };
            let mut pen = ZenoPen::default();
            let settings = DrawSettings::unhinted(size, location);
            outline
                .draw(settings, &mut pen)
                .map_err(|e| Error::Font(format!("outline extraction failed: {:?}", e)))?;
            let path = pen.build();

            let left = placed.x_min.floor();
            let top = placed.y_max.ceil();
            let mask_w = (placed.x_max.ceil() - left).max(0.0) as u32;
            let mask_h = (top - placed.y_min.floor()).max(0.0) as u32;
            if mask_w == 0 || mask_h == 0 {
                continue;
            }

            // ZenoPen emits y-down commands, so shifting by the ink top
            // puts the glyph at the mask origin.
            let transform = Transform::translation(-left, top);
            let (mask, _placement) = Mask::new(&path)
                .transform(Some(transform))
                .size(mask_w, mask_h)
                .render();

            let origin_x = position.0 + (placed.pen_x + left) as i32;
            let origin_y = baseline_y - top as i32;
            blit_mask(image, &mask, mask_w, mask_h, origin_x, origin_y, color);
        }
        Ok(())
    }
}

/// Blend an alpha mask toward `color` at the given image position, skipping
/// out-of-bounds rows and columns.
fn blit_mask(
    image: &mut GrayImage,
    mask: &[u8],
    mask_w: u32,
    mask_h: u32,
    origin_x: i32,
    origin_y: i32,
    color: u8,
) {
    let (img_w, img_h) = image.dimensions();
    for my in 0..mask_h {
        let dst_y = origin_y + my as i32;
        if dst_y < 0 || dst_y >= img_h as i32 {
            continue;
        }
        for mx in 0..mask_w {
            let dst_x = origin_x + mx as i32;
            if dst_x < 0 || dst_x >= img_w as i32 {
                continue;
            }
            let alpha = mask[(my * mask_w + mx) as usize] as u16;
            if alpha == 0 {
                continue;
            }
            let pixel = image.get_pixel_mut(dst_x as u32, dst_y as u32);
            let bg = pixel[0] as u16;
            let fg = color as u16;
            pixel[0] = ((bg * (255 - alpha) + fg * alpha) / 255) as u8;
        }
    }
}

/// Pen that accumulates the ink bounding box of an outline (y-up).
#[derive(Default)]
struct BoundsPen {
    min_x: f32,
    max_x: f32,
    min_y: f32,
    max_y: f32,
    has_points: bool,
}

impl BoundsPen {
    fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        if self.has_points && self.min_x < self.max_x && self.min_y < self.max_y {
            Some((self.min_x, self.min_y, self.max_x, self.max_y))
        } else {
            None
        }
    }

    fn update(&mut self, x: f32, y: f32) {
        if !self.has_points {
            self.min_x = x;
            self.max_x = x;
            self.min_y = y;
            self.max_y = y;
            self.has_points = true;
        } else {
            self.min_x = self.min_x.min(x);
            self.max_x = self.max_x.max(x);
            self.min_y = self.min_y.min(y);
            self.max_y = self.max_y.max(y);
        }
    }
}

impl OutlinePen for BoundsPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.update(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.update(x, y);
    }

    fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        self.update(cx, cy);
        self.update(x, y);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.update(cx0, cy0);
        self.update(cx1, cy1);
        self.update(x, y);
    }

    fn close(&mut self) {}
}

/// Pen that collects zeno path commands, flipping the y axis so the path is
/// y-down with the baseline at 0.
#[derive(Default)]
struct ZenoPen {
    commands: Vec<Command>,
}

impl ZenoPen {
    fn build(self) -> Vec<Command> {
        self.commands
    }
}

impl OutlinePen for ZenoPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.commands.push(Command::MoveTo((x, -y).into()));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.commands.push(Command::LineTo((x, -y).into()));
    }

    fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        self.commands
            .push(Command::QuadTo((cx, -cy).into(), (x, -y).into()));
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.commands.push(Command::CurveTo(
            (cx0, -cy0).into(),
            (cx1, -cy1).into(),
            (x, -y).into(),
        ));
    }

    fn close(&mut self) {
        self.commands.push(Command::Close);
    }
}

/// A directory-backed pool of font faces.
pub struct FontLibrary {
    faces: Vec<Arc<FontFace>>,
}

impl FontLibrary {
    /// Load every `.ttf`/`.otf` file in a directory.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut faces = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_font = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf"))
                .unwrap_or(false);
            if !is_font {
                continue;
            }
            match FontFace::from_file(&path) {
                Ok(face) => faces.push(Arc::new(face)),
                Err(e) => warn!("skipping font {}: {}", path.display(), e),
            }
        }
        Self::from_faces(faces)
    }

    pub fn from_faces(faces: Vec<Arc<FontFace>>) -> Result<Self> {
        if faces.is_empty() {
            return Err(Error::Configuration("font pool is empty".into()));
        }
        Ok(Self { faces })
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

impl FontPool for FontLibrary {
    fn pick(&self, word: &str, rng: &mut dyn RngCore) -> Result<(Box<dyn Font>, (u32, u32))> {
        let face = self.faces[rng.random_range(0..self.faces.len())].clone();
        let px = rng.random_range(MIN_PX_SIZE..=MAX_PX_SIZE) as f32;
        let font = ScaledFont::new(face, px)?;
        let size = font.measure(word)?;
        Ok((Box::new(font), size))
    }
}
