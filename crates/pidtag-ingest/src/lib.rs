//! Document-level tag extraction.
//!
//! [`Pipeline::run`] opens a document, acquires every page's token stream
//! on a [`PagePool`], then classifies and aggregates on the calling task
//! once all pages are final.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pidtag_core::aggregate::RunSummary;
use pidtag_core::pool::{PageContext, PageJob, PagePool, ProgressFn};
use pidtag_core::{AcquisitionMode, Aggregator, DocumentBackend, OcrEngine, PageOutcome};

// Re-export domain types for convenience
pub use pidtag_core::{
    Config, ExtractError, ExtractionResult, ProgressEvent, ProgressStatus, StatusSnapshot,
    TagRecord, TagType, Warning,
};
pub use pidtag_rules::RuleSet;

/// An extraction pipeline bound to one backend, rule set and configuration.
///
/// The same pipeline can run any number of documents; runs share no state.
pub struct Pipeline {
    backend: Arc<dyn DocumentBackend>,
    ocr: Option<Arc<dyn OcrEngine>>,
    rules: Arc<RuleSet>,
    config: Arc<Config>,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn DocumentBackend>, rules: RuleSet, config: Config) -> Self {
        Self {
            backend,
            ocr: None,
            rules: Arc::new(rules),
            config: Arc::new(config),
        }
    }

    /// Attach the OCR engine used for text-sparse pages.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// Extract tags from the document at `path`.
    ///
    /// Progress events go to `progress`; `status` is reset at the start and
    /// marked complete when the run ends, successfully or not. A cancelled
    /// run returns [`ExtractError::Cancelled`] and no partial result.
    pub async fn run(
        &self,
        path: &Path,
        progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
        cancel: CancellationToken,
        status: Arc<ProgressStatus>,
    ) -> Result<ExtractionResult, ExtractError> {
        let progress: ProgressFn = Arc::new(progress);
        let result = self.run_inner(path, progress, cancel, &status).await;
        status.mark_complete();
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "extraction ended without a result");
        }
        result
    }

    async fn run_inner(
        &self,
        path: &Path,
        progress: ProgressFn,
        cancel: CancellationToken,
        status: &Arc<ProgressStatus>,
    ) -> Result<ExtractionResult, ExtractError> {
        status.reset(0);
        let document = document_name(path);

        let backend = self.backend.clone();
        let open_path = path.to_path_buf();
        let total = tokio::task::spawn_blocking(move || {
            backend.open(&open_path).map(|doc| doc.page_count())
        })
        .await
        .map_err(|e| ExtractError::Worker(e.to_string()))??;

        status.reset(total);
        tracing::info!(document = %document, total_pages = total, "document opened");
        progress(ProgressEvent::DocumentOpened { total_pages: total });

        if total == 0 {
            let result = Aggregator::new(self.config.max_example_locations).finish(RunSummary {
                document,
                ..RunSummary::default()
            });
            progress(ProgressEvent::Complete {
                unique_tags: 0,
                ocr_pages: 0,
                failed_pages: 0,
            });
            return Ok(result);
        }

        let ocr = self.usable_ocr().await;
        let ctx = Arc::new(PageContext {
            path: path.to_path_buf(),
            backend: self.backend.clone(),
            ocr,
            config: self.config.clone(),
            progress: progress.clone(),
            status: status.clone(),
        });
        let num_workers = self.config.num_workers.clamp(1, total);
        let pool = PagePool::new(ctx, cancel.clone(), num_workers);

        let mut receivers = Vec::with_capacity(total);
        for page in 0..total {
            if cancel.is_cancelled() {
                break;
            }
            let (result_tx, result_rx) = tokio::sync::oneshot::channel();
            pool.submit(PageJob {
                page,
                total,
                result_tx,
            })
            .await;
            receivers.push(result_rx);
        }

        // Receivers are in page order, so outcomes are too.
        let mut outcomes = Vec::with_capacity(total);
        for rx in receivers {
            if let Ok(outcome) = rx.await {
                outcomes.push(outcome);
            }
        }
        pool.shutdown().await;

        if cancel.is_cancelled() {
            tracing::info!(document = %document, "extraction cancelled");
            return Err(ExtractError::Cancelled);
        }
        if outcomes.len() != total {
            return Err(ExtractError::Worker(format!(
                "{} of {} pages returned no outcome",
                total - outcomes.len(),
                total
            )));
        }

        Ok(self.classify_and_aggregate(document, total, outcomes, &progress))
    }

    /// Check the attached engine once per run. `None` when OCR is disabled,
    /// no engine is attached, or the engine cannot run.
    async fn usable_ocr(&self) -> Option<Arc<dyn OcrEngine>> {
        if !self.config.ocr_enabled {
            return None;
        }
        let engine = self.ocr.clone()?;
        let engine_check = engine.clone();
        let available = tokio::task::spawn_blocking(move || engine_check.is_available())
            .await
            .unwrap_or(false);
        if available {
            Some(engine)
        } else {
            tracing::warn!(
                engine = engine.name(),
                "OCR engine unavailable; text-sparse pages will be skipped"
            );
            None
        }
    }

    fn classify_and_aggregate(
        &self,
        document: String,
        total: usize,
        outcomes: Vec<PageOutcome>,
        progress: &ProgressFn,
    ) -> ExtractionResult {
        let tokens = outcomes
            .iter()
            .map(|o| match o {
                PageOutcome::Ready(p) => p.tokens.len(),
                PageOutcome::Failed(_) => 0,
            })
            .sum();
        progress(ProgressEvent::Classifying { tokens });

        let mut aggregator = Aggregator::new(self.config.max_example_locations);
        let mut summary = RunSummary {
            document,
            total_pages: total,
            ..RunSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                PageOutcome::Ready(page) => {
                    summary.pages_processed += 1;
                    if page.mode == AcquisitionMode::OcrFallback {
                        summary.ocr_pages.push(page.page);
                    }
                    let candidates = self.rules.classify_page(&page);
                    aggregator.extend(&candidates);
                }
                PageOutcome::Failed(failure) => summary.failed_pages.push(failure),
            }
        }

        let result = aggregator.finish(summary);
        tracing::info!(
            document = %result.document,
            tokens,
            unique_tags = result.total_unique(),
            occurrences = result.total_occurrences(),
            ocr_pages = result.ocr_pages.len(),
            failed_pages = result.failed_pages.len(),
            "extraction complete"
        );
        progress(ProgressEvent::Complete {
            unique_tags: result.total_unique(),
            ocr_pages: result.ocr_pages.len(),
            failed_pages: result.failed_pages.len(),
        });
        result
    }
}

#[cfg(feature = "pdf")]
impl Pipeline {
    /// Pipeline over the MuPDF backend, without an OCR engine.
    pub fn mupdf(rules: RuleSet, config: Config) -> Self {
        Self::new(
            Arc::new(pidtag_pdf_mupdf::MupdfBackend::new()),
            rules,
            config,
        )
    }
}

#[cfg(feature = "tesseract")]
impl Pipeline {
    pub fn with_tesseract(self, config: pidtag_ocr::TesseractConfig) -> Self {
        self.with_ocr(Arc::new(pidtag_ocr::TesseractEngine::new(config)))
    }
}

/// Extract tags from a PDF with the built-in rules and default settings.
#[cfg(all(feature = "pdf", feature = "tesseract"))]
pub async fn extract_tags(path: &Path) -> Result<ExtractionResult, ExtractError> {
    Pipeline::mupdf(RuleSet::default(), Config::default())
        .with_tesseract(pidtag_ocr::TesseractConfig::default())
        .run(
            path,
            |_| {},
            CancellationToken::new(),
            Arc::new(ProgressStatus::new()),
        )
        .await
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_name_is_file_name() {
        assert_eq!(
            document_name(Path::new("/drawings/ST0008 P&ID.pdf")),
            "ST0008 P&ID.pdf"
        );
        assert_eq!(document_name(Path::new("/")), "/");
    }
}
