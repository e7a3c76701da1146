//! Error type shared by every stage of the palette pipeline.

use thiserror::Error;

/// Palette extraction error
#[derive(Error, Debug)]
pub enum PaletteError {
    /// Caller supplied a bad request (URL, color count, missing source)
    #[error("{0}")]
    Validation(String),

    /// Remote image could not be retrieved
    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    /// Format was recognized but is not one we decode
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Bytes could not be decoded into raster samples
    #[error("Unable to decode image: {0}")]
    Decode(String),

    /// Pixel buffer had no samples
    #[error("image contains no pixels")]
    EmptyImage,

    /// Diversification accepted no colors, so there is nothing to pad from
    #[error("no colors could be extracted from the image")]
    InsufficientPalette,

    /// The worker running the pipeline died before producing a result
    #[error("palette worker failed: {0}")]
    Worker(String),
}

impl PaletteError {
    /// Whether the error was caused by the request rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PaletteError::Validation(_))
    }
}

impl From<image::ImageError> for PaletteError {
    fn from(e: image::ImageError) -> Self {
        PaletteError::Decode(e.to_string())
    }
}

/// Result alias for palette operations
pub type Result<T> = std::result::Result<T, PaletteError>;
