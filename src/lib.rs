// this_file: src/lib.rs
//! Textsynth - synthetic text-image generation for recognition training
//!
//! This library provides functionality for:
//! - Background canvas synthesis (procedural noise or stock images)
//! - Word rasterization with skrifa/zeno font handling
//! - 3D-rotation perspective warping with tracked bounding quads
//! - Scale-preserving crop/rescale to a fixed output resolution
//! - A probabilistic post-effect chain (blur, prydown, noise, lines)

pub mod background;
pub mod corpus;
pub mod effects;
pub mod error;
pub mod font;
pub mod geometry;
pub mod liner;
pub mod logging;
pub mod noiser;
pub mod renderer;

// Re-export commonly used types
pub use background::BackgroundPool;
pub use corpus::{Corpus, WordList};
pub use effects::{BlurStyle, EffectProbs, EffectToggles};
pub use error::{Error, Result};
pub use font::{Font, FontFace, FontLibrary, FontPool, ScaledFont};
pub use geometry::{clipped_rand_norm, BoundingRect, PerspectiveTransform, Quad, WarpBackend};
pub use liner::{Liner, SimpleLiner};
pub use noiser::{AdditiveNoiser, Noiser};
pub use renderer::{CropPlan, OutputMode, Renderer, RendererBuilder, RendererConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
