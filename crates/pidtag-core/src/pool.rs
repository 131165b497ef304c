//! Page-parallel token acquisition.
//!
//! A fixed set of worker tasks pull page jobs from one queue. Each job runs
//! on a blocking thread (PDF parsing, rasterization and OCR are all
//! synchronous), opens its own document handle, and reports its outcome on
//! a per-page oneshot channel. Workers stop taking jobs once the
//! cancellation token fires; jobs left in the queue drop their senders.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{DocumentBackend, OcrEngine, OcrError, PageImage, Word};
use crate::merge::{absorb_native, merge_passes};
use crate::tokenize::{char_count, phrase_tokens};
use crate::{
    AcquisitionMode, Config, OcrPass, PageFailure, PageFailureReason, PageOutcome, PageTokens,
    ProgressEvent, ProgressStatus, Token, TokenOrigin,
};

pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Everything a page worker needs, shared read-only by all workers.
pub struct PageContext {
    pub path: PathBuf,
    pub backend: Arc<dyn DocumentBackend>,
    /// `None` when no engine is configured or the engine failed its
    /// availability check.
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub config: Arc<Config>,
    pub progress: ProgressFn,
    pub status: Arc<ProgressStatus>,
}

/// A page acquisition job submitted to the pool.
pub struct PageJob {
    pub page: usize,
    pub total: usize,
    pub result_tx: oneshot::Sender<PageOutcome>,
}

/// A pool of worker tasks that acquire page token streams.
///
/// Submit jobs via [`submit()`](PagePool::submit), receive results via the
/// oneshot receiver paired with each job.
pub struct PagePool {
    job_tx: async_channel::Sender<PageJob>,
    pool_handle: JoinHandle<()>,
}

impl PagePool {
    /// Create a new pool with `num_workers` worker tasks.
    pub fn new(ctx: Arc<PageContext>, cancel: CancellationToken, num_workers: usize) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<PageJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for worker in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    worker,
                    job_rx.clone(),
                    ctx.clone(),
                    cancel.clone(),
                )));
            }
            // Workers are the last holders; they exit when job_tx closes.
            drop(job_rx);
            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: PageJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the pool and wait for all workers to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    worker: usize,
    rx: async_channel::Receiver<PageJob>,
    ctx: Arc<PageContext>,
    cancel: CancellationToken,
) {
    while let Ok(job) = rx.recv().await {
        if cancel.is_cancelled() {
            tracing::debug!(worker, page = job.page, "skipping: cancelled");
            continue;
        }

        let PageJob {
            page,
            total,
            result_tx,
        } = job;
        (ctx.progress)(ProgressEvent::PageStarted { page, total });

        let blocking_ctx = ctx.clone();
        let outcome = tokio::task::spawn_blocking(move || acquire_page(&blocking_ctx, page))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(worker, page, error = %e, "page worker panicked");
                PageOutcome::Failed(PageFailure {
                    page,
                    reason: PageFailureReason::Backend(format!("worker panicked: {}", e)),
                })
            });

        match &outcome {
            PageOutcome::Ready(p) => {
                ctx.status
                    .page_done(p.mode == AcquisitionMode::OcrFallback, false);
                (ctx.progress)(ProgressEvent::PageFinished {
                    page,
                    total,
                    mode: p.mode,
                    tokens: p.tokens.len(),
                });
            }
            PageOutcome::Failed(f) => {
                let used_ocr = !matches!(f.reason, PageFailureReason::Backend(_));
                ctx.status.page_done(used_ocr, true);
                tracing::warn!(page, reason = %f.reason, "page skipped");
                (ctx.progress)(ProgressEvent::PageFailed {
                    page,
                    total,
                    reason: f.reason.clone(),
                });
            }
        }

        let _ = result_tx.send(outcome);
    }
}

fn failed(page: usize, reason: PageFailureReason) -> PageOutcome {
    PageOutcome::Failed(PageFailure { page, reason })
}

/// Acquire the final token stream of one page.
///
/// Native text first. A page with fewer than `sparse_text_threshold`
/// non-whitespace characters is rasterized and read by both OCR passes;
/// the merged OCR tokens are added to whatever native tokens it had.
pub fn acquire_page(ctx: &PageContext, page: usize) -> PageOutcome {
    let config = &ctx.config;
    let doc = match ctx.backend.open(&ctx.path) {
        Ok(d) => d,
        Err(e) => return failed(page, PageFailureReason::Backend(e.to_string())),
    };
    let bounds = match doc.page_bounds(page) {
        Ok(b) => b,
        Err(e) => return failed(page, PageFailureReason::Backend(e.to_string())),
    };
    let words = match doc.native_words(page) {
        Ok(w) => w,
        Err(e) => return failed(page, PageFailureReason::Backend(e.to_string())),
    };
    let native = phrase_tokens(words, page, TokenOrigin::Native, config.phrase_gap);
    let chars = char_count(&native);

    if chars >= config.sparse_text_threshold || !config.ocr_enabled {
        tracing::debug!(page, chars, tokens = native.len(), "native text");
        return PageOutcome::Ready(PageTokens {
            page,
            bounds,
            mode: AcquisitionMode::Native,
            tokens: native,
        });
    }

    let Some(engine) = ctx.ocr.as_deref() else {
        return failed(page, PageFailureReason::OcrUnavailable);
    };

    tracing::info!(
        page,
        chars,
        threshold = config.sparse_text_threshold,
        "text-sparse page, running OCR"
    );

    // The raster's temp file lives until `image` drops at the end of this scope.
    let image = match doc.rasterize(page, config.ocr_scale()) {
        Ok(img) => img,
        Err(e) => return failed(page, PageFailureReason::Backend(e.to_string())),
    };
    drop(doc);

    let sparse = match run_pass(ctx, engine, &image, page, OcrPass::Sparse) {
        Ok(t) => t,
        Err(reason) => return failed(page, reason),
    };
    let dense = match run_pass(ctx, engine, &image, page, OcrPass::Dense) {
        Ok(t) => t,
        Err(reason) => return failed(page, reason),
    };

    let ocr_tokens = merge_passes(sparse, dense, &config.merge);
    let tokens = absorb_native(native, ocr_tokens, &config.merge);
    tracing::debug!(page, tokens = tokens.len(), "OCR fallback complete");

    PageOutcome::Ready(PageTokens {
        page,
        bounds,
        mode: AcquisitionMode::OcrFallback,
        tokens,
    })
}

/// Run one OCR pass with retries, returning page-space tokens.
fn run_pass(
    ctx: &PageContext,
    engine: &dyn OcrEngine,
    image: &PageImage,
    page: usize,
    pass: OcrPass,
) -> Result<Vec<Token>, PageFailureReason> {
    let config = &ctx.config;
    let mut attempt = 0;
    let words = loop {
        match engine.recognize(image, pass) {
            Ok(words) => break words,
            Err(OcrError::Unavailable(msg)) => {
                tracing::warn!(page, %pass, error = %msg, "OCR engine unavailable");
                return Err(PageFailureReason::OcrUnavailable);
            }
            Err(e) if attempt < config.ocr_retries => {
                attempt += 1;
                tracing::warn!(page, %pass, attempt, error = %e, "OCR pass failed, retrying");
                (ctx.progress)(ProgressEvent::OcrRetry {
                    page,
                    pass,
                    attempt,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                return Err(PageFailureReason::OcrFailed(format!("{} pass: {}", pass, e)));
            }
        }
    };

    let words: Vec<Word> = words
        .into_iter()
        .filter(|w| w.confidence.is_none_or(|c| c >= config.min_ocr_confidence))
        .map(|w| Word {
            bbox: w.bbox.unscale(image.scale, image.origin),
            ..w
        })
        .collect();

    Ok(phrase_tokens(
        words,
        page,
        TokenOrigin::Ocr(pass),
        config.phrase_gap,
    ))
}
