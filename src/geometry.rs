// this_file: src/geometry.rs
//! Quads, bounding rectangles and the 3D-rotation perspective transform
//! used to warp rendered text canvases.
//!
//! The transform models the text canvas as a plane rotated in 3D around its
//! center and projected back to 2D with a fixed field of view. The resulting
//! homography is applied both to full images (with resampling) and to corner
//! point sets (pure coordinate transform), so the text bounding box stays in
//! sync with the warped raster.

use crate::error::{Error, Result};
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::{Matrix3, Rotation3, SMatrix, SVector, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Hard cap on warped canvas dimensions; anything larger means the
/// projection degenerated.
const MAX_WARP_DIM: u32 = 16_384;

/// Ordered corner points of a (possibly warped) rectangle:
/// top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad(pub [[f64; 2]; 4]);

impl Quad {
    /// Axis-aligned rectangle as a quad.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Quad([
            [x, y],
            [x + width, y],
            [x + width, y + height],
            [x, y + height],
        ])
    }

    pub fn points(&self) -> &[[f64; 2]; 4] {
        &self.0
    }

    /// Axis-aligned bounding rectangle. Rotation information is
    /// intentionally discarded; downstream cropping works on a flat raster.
    pub fn bounding_rect(&self) -> BoundingRect {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for [x, y] in self.0 {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let x = min_x.floor() as i64;
        let y = min_y.floor() as i64;
        BoundingRect {
            x,
            y,
            width: max_x.ceil() as i64 - x,
            height: max_y.ceil() as i64 - y,
        }
    }
}

/// Axis-aligned integer bounding rectangle derived from a [`Quad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Draw from a normal distribution centered at 0 and clipped to
/// `[-bound, bound]`, with sigma chosen so ~99% of the mass lies inside the
/// bound. A non-positive bound always yields 0.
pub fn clipped_rand_norm<R: Rng + ?Sized>(bound: f64, rng: &mut R) -> f64 {
    if bound <= 0.0 {
        return 0.0;
    }
    let Ok(normal) = Normal::new(0.0, bound / 3.0) else {
        return 0.0;
    };
    normal.sample(rng).clamp(-bound, bound)
}

/// Image-warp execution strategy, selected once at renderer construction.
///
/// Both backends are inverse-mapped bilinear warps and produce numerically
/// equivalent output within resampling tolerance; `Parallel` fans output
/// rows out across the rayon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WarpBackend {
    #[default]
    Direct,
    Parallel,
}

/// A 2D homography derived from simulated 3D rotation of the canvas plane
/// plus a field-of-view projection.
///
/// The stored matrix maps source canvas coordinates to warped-output
/// coordinates with the output translated so its bounding box starts at the
/// origin. Zero rotation angles reduce to the identity transform.
pub struct PerspectiveTransform {
    matrix: Matrix3<f64>,
    out_width: u32,
    out_height: u32,
    canvas_quad: Quad,
}

impl PerspectiveTransform {
    /// Build the homography for rotation angles (degrees) around the X, Y
    /// and Z axes, an isotropic scale factor and a vertical field of view.
    pub fn from_angles(
        x_deg: f64,
        y_deg: f64,
        z_deg: f64,
        scale: f64,
        fovy_deg: f64,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::DegenerateGeometry(
                "cannot warp an empty canvas".into(),
            ));
        }
        let w = width as f64;
        let h = height as f64;

        // Camera distance chosen so the canvas diagonal fills the fov.
        let z_cam = (w * w + h * h).sqrt() / 2.0 / (fovy_deg.to_radians() / 2.0).tan();
        let rotation = Rotation3::from_euler_angles(
            x_deg.to_radians(),
            y_deg.to_radians(),
            z_deg.to_radians(),
        );

        let src = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]];
        let mut dst = [[0.0f64; 2]; 4];
        for (corner, out) in src.iter().zip(dst.iter_mut()) {
            let centered = Vector3::new(corner[0] - w / 2.0, corner[1] - h / 2.0, 0.0);
            let rotated = rotation * centered;
            let denom = z_cam - rotated.z;
            if denom < f64::EPSILON {
                return Err(Error::DegenerateGeometry(
                    "canvas corner rotated behind the camera".into(),
                ));
            }
            let f = z_cam / denom * scale;
            *out = [rotated.x * f + w / 2.0, rotated.y * f + h / 2.0];
        }

        let matrix = homography_from_corners(&src, &dst)?;

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for [x, y] in dst {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let out_width = (max_x - min_x).ceil() as u32;
        let out_height = (max_y - min_y).ceil() as u32;
        if out_width == 0
            || out_height == 0
            || out_width > MAX_WARP_DIM
            || out_height > MAX_WARP_DIM
        {
            return Err(Error::DegenerateGeometry(format!(
                "warped canvas size {}x{} is out of range",
                out_width, out_height
            )));
        }

        let translation = Matrix3::new(1.0, 0.0, -min_x, 0.0, 1.0, -min_y, 0.0, 0.0, 1.0);
        let canvas_quad = Quad([
            [dst[0][0] - min_x, dst[0][1] - min_y],
            [dst[1][0] - min_x, dst[1][1] - min_y],
            [dst[2][0] - min_x, dst[2][1] - min_y],
            [dst[3][0] - min_x, dst[3][1] - min_y],
        ]);

        Ok(Self {
            matrix: translation * matrix,
            out_width,
            out_height,
            canvas_quad,
        })
    }

    /// Dimensions of the warped output raster.
    pub fn output_size(&self) -> (u32, u32) {
        (self.out_width, self.out_height)
    }

    /// The source canvas corners mapped into warped-output coordinates.
    pub fn canvas_quad(&self) -> Quad {
        self.canvas_quad
    }

    /// Apply the homography to a point set without resampling.
    pub fn transform_quad(&self, quad: &Quad) -> Result<Quad> {
        let mut out = [[0.0f64; 2]; 4];
        for (point, mapped) in quad.points().iter().zip(out.iter_mut()) {
            *mapped = transform_point(&self.matrix, *point)?;
        }
        Ok(Quad(out))
    }

    /// Resample the full image through the homography.
    pub fn warp_image(&self, image: &GrayImage, backend: WarpBackend) -> Result<GrayImage> {
        match backend {
            WarpBackend::Direct => self.warp_direct(image),
            WarpBackend::Parallel => self.warp_parallel(image),
        }
    }

    fn warp_direct(&self, image: &GrayImage) -> Result<GrayImage> {
        let m = &self.matrix;
        let coeffs = [
            m[(0, 0)] as f32,
            m[(0, 1)] as f32,
            m[(0, 2)] as f32,
            m[(1, 0)] as f32,
            m[(1, 1)] as f32,
            m[(1, 2)] as f32,
            m[(2, 0)] as f32,
            m[(2, 1)] as f32,
            m[(2, 2)] as f32,
        ];
        let projection = Projection::from_matrix(coeffs).ok_or_else(|| {
            Error::DegenerateGeometry("perspective matrix is not invertible".into())
        })?;
        let mut out = GrayImage::new(self.out_width, self.out_height);
        warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Luma([0u8]),
            &mut out,
        );
        Ok(out)
    }

    fn warp_parallel(&self, image: &GrayImage) -> Result<GrayImage> {
        let inv = self.matrix.try_inverse().ok_or_else(|| {
            Error::DegenerateGeometry("perspective matrix is not invertible".into())
        })?;
        let (src_w, src_h) = image.dimensions();
        let src = image.as_raw().as_slice();
        let mut out = vec![0u8; self.out_width as usize * self.out_height as usize];

        out.par_chunks_mut(self.out_width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                let dy = y as f64;
                for (x, pixel) in row.iter_mut().enumerate() {
                    let dx = x as f64;
                    let w = inv[(2, 0)] * dx + inv[(2, 1)] * dy + inv[(2, 2)];
                    if w.abs() < f64::EPSILON {
                        continue;
                    }
                    let sx = (inv[(0, 0)] * dx + inv[(0, 1)] * dy + inv[(0, 2)]) / w;
                    let sy = (inv[(1, 0)] * dx + inv[(1, 1)] * dy + inv[(1, 2)]) / w;
                    *pixel = sample_bilinear(src, src_w, src_h, sx, sy);
                }
            });

        GrayImage::from_raw(self.out_width, self.out_height, out)
            .ok_or_else(|| Error::DegenerateGeometry("warp buffer size mismatch".into()))
    }
}

/// Solve the 8x8 direct-linear-transform system mapping four source corners
/// onto four destination corners.
fn homography_from_corners(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Result<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let [x, y] = src[i];
        let [u, v] = dst[i];
        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;
        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }
    let h = a
        .lu()
        .solve(&b)
        .ok_or_else(|| Error::DegenerateGeometry("singular homography system".into()))?;
    Ok(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
    ))
}

fn transform_point(m: &Matrix3<f64>, p: [f64; 2]) -> Result<[f64; 2]> {
    let w = m[(2, 0)] * p[0] + m[(2, 1)] * p[1] + m[(2, 2)];
    if w.abs() < f64::EPSILON {
        return Err(Error::DegenerateGeometry(
            "point projected to infinity".into(),
        ));
    }
    Ok([
        (m[(0, 0)] * p[0] + m[(0, 1)] * p[1] + m[(0, 2)]) / w,
        (m[(1, 0)] * p[0] + m[(1, 1)] * p[1] + m[(1, 2)]) / w,
    ])
}

/// Bilinear sample with out-of-bounds reads returning the border fill,
/// matching the direct backend's interpolation.
fn sample_bilinear(src: &[u8], width: u32, height: u32, x: f64, y: f64) -> u8 {
    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return 0;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = (x0 as u32 + 1).min(width - 1);
    let y1 = (y0 as u32 + 1).min(height - 1);
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as u32;
    let y0 = y0 as u32;

    let at = |px: u32, py: u32| src[(py * width + px) as usize] as f64;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}
