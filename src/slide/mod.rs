//! Whole-slide images on disk
//!
//! - `reader`: decoding seam (`SlideReader`) and the `image`-crate backend
//! - `deepzoom`: Deep Zoom level geometry and tile rendering
//! - `metadata`: vendor property extraction
//! - `storage`: media layout, image generation and integrity checks

mod deepzoom;
mod metadata;
mod reader;
mod storage;

pub use deepzoom::{DeepZoomGenerator, DeepZoomGeometry, TileRegion, DZI_NAMESPACE};
pub use metadata::extract_metadata;
pub use reader::{
    associated_image_extension, read_dimensions, ImageSlide, SlideReader, ASSOCIATED_MACRO,
};
pub use storage::{
    AssociatedUpload, SlideStore, SlideUpload, ASSOCIATED_IMAGE_FILE, DZI_FILE, THUMBNAIL_FILE,
    TILES_DIR,
};

/// Errors raised while decoding slides or writing derived images
#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    #[error("Cannot open slide '{path}': {message}")]
    Open { path: String, message: String },

    #[error("Associated image '{0}' not found")]
    AssociatedImageMissing(String),

    #[error("Associated image '{0}' must be a PNG or JPEG file")]
    InvalidAssociatedImage(String),

    #[error("Property '{0}' is missing")]
    PropertyMissing(String),

    #[error("Property '{key}' has invalid value '{value}'")]
    InvalidProperty { key: String, value: String },

    #[error("Invalid tile address: level {level}, col {col}, row {row}")]
    InvalidTile { level: usize, col: u32, row: u32 },

    #[error("Failed to generate images: {0}")]
    Generate(String),

    #[error("Failed to save metadata: {0}")]
    Metadata(String),

    #[error("Original slide file does not exist")]
    FileMissing,

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SlideResult<T> = Result<T, SlideError>;
