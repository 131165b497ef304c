use std::path::Path;

use mupdf::pixmap::ImageFormat;
use mupdf::{Colorspace, Document, Matrix, TextPageFlags};

use pidtag_core::{
    BackendError, BoundingBox, DocumentBackend, PageImage, PageSource, Rotation, Word,
};

/// MuPDF-based implementation of [`DocumentBackend`].
///
/// This crate is the sole AGPL island. It isolates the mupdf dependency
/// (AGPL-3.0) so that non-PDF code paths do not transitively depend on it.
#[derive(Debug, Default)]
pub struct MupdfBackend;

/// Max gap between glyphs of one word, as a multiple of glyph height.
/// Drawings often place separate labels on one text line without a
/// space character between them.
const GLYPH_GAP: f32 = 0.8;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentBackend for MupdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
        if !path.exists() {
            return Err(BackendError::OpenError(format!(
                "{}: no such file",
                path.display()
            )));
        }

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;
        if document
            .needs_password()
            .map_err(|e| BackendError::OpenError(e.to_string()))?
        {
            return Err(BackendError::Encrypted);
        }
        let page_count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;

        Ok(Box::new(MupdfDocument {
            document,
            page_count: usize::try_from(page_count).unwrap_or(0),
        }))
    }
}

struct MupdfDocument {
    document: Document,
    page_count: usize,
}

impl MupdfDocument {
    fn load(&self, page: usize) -> Result<mupdf::Page, BackendError> {
        if page >= self.page_count {
            return Err(BackendError::PageOutOfRange(page));
        }
        let index = i32::try_from(page).map_err(|_| BackendError::PageOutOfRange(page))?;
        self.document
            .load_page(index)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))
    }
}

impl PageSource for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_bounds(&self, page: usize) -> Result<BoundingBox, BackendError> {
        let bounds = self
            .load(page)?
            .bounds()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        Ok(BoundingBox::new(bounds.x0, bounds.y0, bounds.x1, bounds.y1))
    }

    fn native_words(&self, page: usize) -> Result<Vec<Word>, BackendError> {
        let text_page = self
            .load(page)?
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut words = Vec::new();
        let mut line_no = 0u32;
        for block in text_page.blocks() {
            for line in block.lines() {
                let glyphs: Vec<Glyph> = line
                    .chars()
                    .map(|c| {
                        let q = c.quad();
                        Glyph {
                            ch: c.char().unwrap_or('\u{FFFD}'),
                            bbox: BoundingBox::new(
                                q.ul.x.min(q.ll.x).min(q.ur.x).min(q.lr.x),
                                q.ul.y.min(q.ll.y).min(q.ur.y).min(q.lr.y),
                                q.ul.x.max(q.ll.x).max(q.ur.x).max(q.lr.x),
                                q.ul.y.max(q.ll.y).max(q.ur.y).max(q.lr.y),
                            ),
                            rotation: Rotation::from_direction(q.lr.x - q.ll.x, q.lr.y - q.ll.y),
                        }
                    })
                    .collect();
                words.extend(group_words(&glyphs, line_no, GLYPH_GAP));
                line_no += 1;
            }
        }
        tracing::trace!(page, words = words.len(), "native words");
        Ok(words)
    }

    fn rasterize(&self, page: usize, scale: f32) -> Result<PageImage, BackendError> {
        let loaded = self.load(page)?;
        let bounds = loaded
            .bounds()
            .map_err(|e| BackendError::RenderError(e.to_string()))?;
        let pixmap = loaded
            .to_pixmap(
                &Matrix::new_scale(scale, scale),
                &Colorspace::device_rgb(),
                false,
                true,
            )
            .map_err(|e| BackendError::RenderError(e.to_string()))?;

        let temp = tempfile::Builder::new()
            .prefix("pidtag-page-")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();
        let temp_str = temp
            .to_str()
            .ok_or_else(|| BackendError::RenderError("invalid temp path encoding".into()))?;
        pixmap
            .save_as(temp_str, ImageFormat::PNG)
            .map_err(|e| BackendError::RenderError(e.to_string()))?;

        tracing::debug!(
            page,
            scale,
            width = pixmap.width(),
            height = pixmap.height(),
            "page rasterized"
        );
        Ok(
            PageImage::temporary(temp, pixmap.width(), pixmap.height(), scale)
                .with_origin((bounds.x0, bounds.y0)),
        )
    }
}

/// One character with its page-space box.
#[derive(Debug, Clone, Copy)]
struct Glyph {
    ch: char,
    bbox: BoundingBox,
    rotation: Rotation,
}

fn gap_between(prev: &BoundingBox, next: &BoundingBox, rotation: Rotation) -> f32 {
    match rotation {
        Rotation::Deg0 => next.x0 - prev.x1,
        Rotation::Deg90 => next.y0 - prev.y1,
        Rotation::Deg180 => prev.x0 - next.x1,
        Rotation::Deg270 => prev.y0 - next.y1,
    }
}

fn glyph_height(g: &Glyph) -> f32 {
    if g.rotation.is_vertical() {
        g.bbox.width()
    } else {
        g.bbox.height()
    }
}

/// Split one text line into words on whitespace, rotation changes, and
/// gaps wider than `max_gap` × glyph height.
fn group_words(glyphs: &[Glyph], line: u32, max_gap: f32) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Option<(String, BoundingBox, Rotation, Glyph)> = None;

    for g in glyphs {
        if g.ch.is_whitespace() {
            if let Some((text, bbox, rotation, _)) = current.take() {
                words.push(word(text, bbox, rotation, line));
            }
            continue;
        }
        let continues = current.as_ref().is_some_and(|(_, _, rotation, last)| {
            *rotation == g.rotation
                && gap_between(&last.bbox, &g.bbox, g.rotation)
                    <= max_gap * glyph_height(last).max(glyph_height(g))
        });
        if continues {
            if let Some((text, bbox, _, last)) = current.as_mut() {
                text.push(g.ch);
                *bbox = bbox.union(&g.bbox);
                *last = *g;
            }
        } else {
            if let Some((text, bbox, rotation, _)) = current.take() {
                words.push(word(text, bbox, rotation, line));
            }
            current = Some((g.ch.to_string(), g.bbox, g.rotation, *g));
        }
    }
    if let Some((text, bbox, rotation, _)) = current {
        words.push(word(text, bbox, rotation, line));
    }
    words
}

fn word(text: String, bbox: BoundingBox, rotation: Rotation, line: u32) -> Word {
    Word {
        text,
        bbox,
        rotation,
        confidence: None,
        line,
    }
}
