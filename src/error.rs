// this_file: src/error.rs
//! Error types for the textsynth library

use thiserror::Error;

/// Main error type for textsynth operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete generator configuration (empty font pool,
    /// missing corpus, bad output dimensions)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Geometry collapsed during the transform chain: zero-area text box,
    /// crop window outside image bounds, non-invertible homography
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// External resource could not be loaded (font file, corpus file,
    /// background image)
    #[error("Resource error: {0}")]
    Resource(String),

    /// Font parsing, metrics or rasterization error
    #[error("Font error: {0}")]
    Font(String),

    /// IO operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for textsynth operations
pub type Result<T> = std::result::Result<T, Error>;
