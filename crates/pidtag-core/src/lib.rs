use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;
pub mod backend;
pub mod config_file;
pub mod geometry;
pub mod merge;
pub mod pool;
pub mod progress;
pub mod tokenize;

// Re-export for convenience
pub use aggregate::Aggregator;
pub use backend::{BackendError, DocumentBackend, OcrEngine, OcrError, OcrPass, PageImage, PageSource, Word};
pub use geometry::{BoundingBox, Rotation, iou};
pub use merge::MergeSettings;
pub use progress::{ProgressStatus, StatusSnapshot};
pub use tokenize::normalize_text;

/// Where a token's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenOrigin {
    /// Embedded, selectable PDF text.
    Native,
    /// One of the two OCR passes.
    Ocr(OcrPass),
}

/// A unit of recognized text with position and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub bbox: BoundingBox,
    pub rotation: Rotation,
    pub origin: TokenOrigin,
    /// Engine confidence (0–100) for OCR tokens; `None` for native text.
    pub confidence: Option<f32>,
    /// 0-based page index.
    pub page: usize,
}

/// The kind of tag a candidate was classified as.
///
/// Declaration order is the canonical output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Equipment,
    Valve,
    Instrument,
    ActuatedValve,
}

impl TagType {
    pub const ALL: [TagType; 4] = [
        TagType::Equipment,
        TagType::Valve,
        TagType::Instrument,
        TagType::ActuatedValve,
    ];

    /// Identifier used in rule configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagType::Equipment => "equipment",
            TagType::Valve => "valve",
            TagType::Instrument => "instrument",
            TagType::ActuatedValve => "actuated_valve",
        }
    }

    /// Parse a rule-configuration identifier (case-insensitive, `-` or `_`).
    pub fn parse(s: &str) -> Option<TagType> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "equipment" => Some(TagType::Equipment),
            "valve" => Some(TagType::Valve),
            "instrument" => Some(TagType::Instrument),
            "actuated_valve" | "actuatedvalve" => Some(TagType::ActuatedValve),
            _ => None,
        }
    }

    /// Human-readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            TagType::Equipment => "Equipment",
            TagType::Valve => "Valves",
            TagType::Instrument => "Instruments",
            TagType::ActuatedValve => "Actuated valves",
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a token was not accepted as a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    TooLong,
    /// Matched the named exclusion rule.
    Excluded { rule: String },
    Stoplisted,
    NoPatternMatch,
    /// Matched `matcher` but failed its `check`.
    ValidationFailed { matcher: String, check: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Empty => write!(f, "empty"),
            RejectReason::TooLong => write!(f, "too long"),
            RejectReason::Excluded { rule } => write!(f, "excluded by {}", rule),
            RejectReason::Stoplisted => write!(f, "stoplisted"),
            RejectReason::NoPatternMatch => write!(f, "no pattern match"),
            RejectReason::ValidationFailed { matcher, check } => {
                write!(f, "{} failed {}", matcher, check)
            }
        }
    }
}

/// Outcome of classifying one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Tag(TagType),
    Rejected(RejectReason),
}

/// A token after the classification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCandidate {
    pub raw_text: String,
    /// Uppercased, whitespace-collapsed text.
    pub normalized: String,
    pub verdict: Verdict,
    /// Name of the matcher that accepted (or matched, then failed validation).
    pub matcher: Option<String>,
    pub origin: Token,
}

impl TagCandidate {
    pub fn tag_type(&self) -> Option<TagType> {
        match self.verdict {
            Verdict::Tag(t) => Some(t),
            Verdict::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.verdict, Verdict::Rejected(_))
    }
}

/// One place a tag was seen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagLocation {
    pub page: usize,
    pub bbox: BoundingBox,
}

/// A deduplicated tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Canonical (normalized) text; the uniqueness key.
    pub text: String,
    pub tag_type: TagType,
    pub occurrences: usize,
    /// Example locations, capped at `Config::max_example_locations`.
    pub locations: Vec<TagLocation>,
    /// Sorted, distinct 0-based page indices.
    pub pages: Vec<usize>,
}

/// Unique-tag and occurrence totals for one tag type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub tag_type: TagType,
    pub unique: usize,
    pub occurrences: usize,
}

/// Counts of rejected tokens, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectStats {
    pub total_tokens: usize,
    pub empty: usize,
    pub too_long: usize,
    pub excluded: usize,
    pub stoplisted: usize,
    pub no_match: usize,
    pub validation_failed: usize,
}

impl RejectStats {
    pub fn rejected(&self) -> usize {
        self.empty
            + self.too_long
            + self.excluded
            + self.stoplisted
            + self.no_match
            + self.validation_failed
    }

    pub fn record(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::Empty => self.empty += 1,
            RejectReason::TooLong => self.too_long += 1,
            RejectReason::Excluded { .. } => self.excluded += 1,
            RejectReason::Stoplisted => self.stoplisted += 1,
            RejectReason::NoPatternMatch => self.no_match += 1,
            RejectReason::ValidationFailed { .. } => self.validation_failed += 1,
        }
    }
}

/// How a page's token stream was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    Native,
    OcrFallback,
}

/// Why a page contributed no tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PageFailureReason {
    OcrFailed(String),
    OcrUnavailable,
    Backend(String),
}

impl fmt::Display for PageFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageFailureReason::OcrFailed(msg) => write!(f, "OCR failed: {}", msg),
            PageFailureReason::OcrUnavailable => write!(f, "OCR engine unavailable"),
            PageFailureReason::Backend(msg) => write!(f, "page could not be read: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub page: usize,
    pub reason: PageFailureReason,
}

/// Final token stream of one page.
#[derive(Debug, Clone)]
pub struct PageTokens {
    pub page: usize,
    pub bounds: BoundingBox,
    pub mode: AcquisitionMode,
    pub tokens: Vec<Token>,
}

/// Result of acquiring one page.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Ready(PageTokens),
    Failed(PageFailure),
}

impl PageOutcome {
    pub fn page(&self) -> usize {
        match self {
            PageOutcome::Ready(p) => p.page,
            PageOutcome::Failed(f) => f.page,
        }
    }
}

/// Run-level conditions surfaced alongside the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    DocumentEmpty,
    OcrFallback { pages: usize },
    OcrFailed { pages: usize },
    OcrUnavailable { pages: usize },
    PagesUnreadable { pages: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DocumentEmpty => write!(f, "document has no pages"),
            Warning::OcrFallback { pages } => {
                write!(f, "{} page(s) processed via OCR fallback", pages)
            }
            Warning::OcrFailed { pages } => {
                write!(f, "{} page(s) failed OCR and were skipped", pages)
            }
            Warning::OcrUnavailable { pages } => write!(
                f,
                "OCR engine unavailable; {} text-sparse page(s) were skipped",
                pages
            ),
            Warning::PagesUnreadable { pages } => {
                write!(f, "{} page(s) could not be read and were skipped", pages)
            }
        }
    }
}

/// The immutable outcome of one document run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// File name of the source document.
    pub document: String,
    /// Deduplicated tags in canonical order (type, then text).
    pub records: Vec<TagRecord>,
    /// One entry per tag type, in canonical type order.
    pub type_counts: Vec<TypeCount>,
    pub total_pages: usize,
    pub pages_processed: usize,
    /// 0-based indices of pages whose tokens came from OCR.
    pub ocr_pages: Vec<usize>,
    pub failed_pages: Vec<PageFailure>,
    pub reject_stats: RejectStats,
    pub warnings: Vec<Warning>,
}

impl ExtractionResult {
    pub fn total_unique(&self) -> usize {
        self.records.len()
    }

    pub fn total_occurrences(&self) -> usize {
        self.records.iter().map(|r| r.occurrences).sum()
    }

    pub fn count_for(&self, tag_type: TagType) -> TypeCount {
        self.type_counts
            .iter()
            .copied()
            .find(|c| c.tag_type == tag_type)
            .unwrap_or(TypeCount {
                tag_type,
                unique: 0,
                occurrences: 0,
            })
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.text.as_str())
    }
}

/// Progress events emitted during extraction.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    DocumentOpened {
        total_pages: usize,
    },
    PageStarted {
        page: usize,
        total: usize,
    },
    PageFinished {
        page: usize,
        total: usize,
        mode: AcquisitionMode,
        tokens: usize,
    },
    /// An OCR pass failed and is being re-run with the same parameters.
    OcrRetry {
        page: usize,
        pass: OcrPass,
        attempt: u32,
        error: String,
    },
    PageFailed {
        page: usize,
        total: usize,
        reason: PageFailureReason,
    },
    Classifying {
        tokens: usize,
    },
    Complete {
        unique_tags: usize,
        ocr_pages: usize,
        failed_pages: usize,
    },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),
    #[error("invalid rule configuration: {0}")]
    RuleConfigurationInvalid(String),
    #[error("extraction cancelled")]
    Cancelled,
    #[error("worker failure: {0}")]
    Worker(String),
}

impl From<BackendError> for ExtractError {
    fn from(e: BackendError) -> Self {
        ExtractError::DocumentUnreadable(e.to_string())
    }
}

/// Runtime configuration for token acquisition and aggregation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pages with fewer native (non-whitespace) characters than this go to OCR.
    pub sparse_text_threshold: usize,
    /// Raster upscale factor for OCR; values below 2.0 are raised to 2.0.
    pub ocr_scale: f32,
    /// When false, text-sparse pages are used as-is.
    pub ocr_enabled: bool,
    /// Re-runs of a failed OCR pass before the page is given up.
    pub ocr_retries: u32,
    /// OCR words below this confidence are dropped before merging.
    pub min_ocr_confidence: f32,
    pub merge: MergeSettings,
    /// Max gap between joined words, as a multiple of character height.
    pub phrase_gap: f32,
    pub num_workers: usize,
    pub max_example_locations: usize,
}

pub const DEFAULT_SPARSE_TEXT_THRESHOLD: usize = 200;
pub const MIN_OCR_SCALE: f32 = 2.0;

impl Default for Config {
    fn default() -> Self {
        Self {
            sparse_text_threshold: DEFAULT_SPARSE_TEXT_THRESHOLD,
            ocr_scale: MIN_OCR_SCALE,
            ocr_enabled: true,
            ocr_retries: 1,
            min_ocr_confidence: 0.0,
            merge: MergeSettings::default(),
            phrase_gap: 0.6,
            num_workers: default_workers(),
            max_example_locations: 8,
        }
    }
}

impl Config {
    /// Effective upscale factor.
    pub fn ocr_scale(&self) -> f32 {
        if self.ocr_scale.is_finite() && self.ocr_scale >= MIN_OCR_SCALE {
            self.ocr_scale
        } else {
            MIN_OCR_SCALE
        }
    }
}

/// One worker per available core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
