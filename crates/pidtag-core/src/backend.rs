use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{BoundingBox, Rotation};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("document is password protected")]
    Encrypted,
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("failed to render page: {0}")]
    RenderError(String),
    #[error("page {0} out of range")]
    PageOutOfRange(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine cannot run at all (binary missing, cannot spawn).
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    /// A single recognition call failed.
    #[error("OCR failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A word produced by a backend, before phrase grouping.
///
/// Coordinates are page space for native words and raster pixels for OCR
/// words. `line` groups words that the backend saw on the same text line.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub bbox: BoundingBox,
    pub rotation: Rotation,
    pub confidence: Option<f32>,
    pub line: u32,
}

/// The two OCR page-segmentation assumptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrPass {
    /// Pass A: scattered diagram annotations.
    Sparse,
    /// Pass B: denser text blocks.
    Dense,
}

impl fmt::Display for OcrPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrPass::Sparse => f.write_str("sparse"),
            OcrPass::Dense => f.write_str("dense"),
        }
    }
}

/// A rasterized page on disk.
///
/// When built with [`PageImage::temporary`], the backing file is removed
/// when the image is dropped.
#[derive(Debug)]
pub struct PageImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Pixels per page-space unit.
    pub scale: f32,
    /// Page-space coordinate of the raster's top-left corner.
    pub origin: (f32, f32),
    _temp: Option<tempfile::TempPath>,
}

impl PageImage {
    pub fn temporary(temp: tempfile::TempPath, width: u32, height: u32, scale: f32) -> Self {
        Self {
            path: temp.to_path_buf(),
            width,
            height,
            scale,
            origin: (0.0, 0.0),
            _temp: Some(temp),
        }
    }

    /// Wrap an existing file that the caller keeps ownership of.
    pub fn borrowed(path: impl Into<PathBuf>, width: u32, height: u32, scale: f32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            scale,
            origin: (0.0, 0.0),
            _temp: None,
        }
    }

    pub fn with_origin(mut self, origin: (f32, f32)) -> Self {
        self.origin = origin;
        self
    }
}

/// An open document.
///
/// Implementations are not required to be `Send`; each page worker opens
/// its own handle through [`DocumentBackend::open`].
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Page extent in page space.
    fn page_bounds(&self, page: usize) -> Result<BoundingBox, BackendError>;

    /// Embedded text of one page as words in reading order.
    fn native_words(&self, page: usize) -> Result<Vec<Word>, BackendError>;

    /// Render one page at `scale` pixels per page unit.
    fn rasterize(&self, page: usize, scale: f32) -> Result<PageImage, BackendError>;
}

/// Trait for PDF backends.
///
/// Implementors open documents; token grouping, OCR fallback and
/// classification live in the pipeline.
pub trait DocumentBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, BackendError>;
}

/// An OCR engine instance shared by page workers.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap check that the engine can run at all.
    fn is_available(&self) -> bool;

    /// Recognize words in `image`, in raster pixel coordinates.
    fn recognize(&self, image: &PageImage, pass: OcrPass) -> Result<Vec<Word>, OcrError>;
}
