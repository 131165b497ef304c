use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Pollable run status, shared between the pipeline and a UI.
///
/// Counters only grow during a run; `complete` is set once the result has
/// been built (or the run has ended with an error).
#[derive(Debug, Default)]
pub struct ProgressStatus {
    total_pages: AtomicUsize,
    pages_processed: AtomicUsize,
    ocr_pages: AtomicUsize,
    failed_pages: AtomicUsize,
    complete: AtomicBool,
}

/// A point-in-time copy of [`ProgressStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub total_pages: usize,
    pub pages_processed: usize,
    pub ocr_pages: usize,
    pub failed_pages: usize,
    pub complete: bool,
}

impl ProgressStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self, total_pages: usize) {
        self.total_pages.store(total_pages, Ordering::SeqCst);
        self.pages_processed.store(0, Ordering::SeqCst);
        self.ocr_pages.store(0, Ordering::SeqCst);
        self.failed_pages.store(0, Ordering::SeqCst);
        self.complete.store(false, Ordering::SeqCst);
    }

    pub fn page_done(&self, used_ocr: bool, failed: bool) {
        if used_ocr {
            self.ocr_pages.fetch_add(1, Ordering::SeqCst);
        }
        if failed {
            self.failed_pages.fetch_add(1, Ordering::SeqCst);
        }
        self.pages_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            total_pages: self.total_pages.load(Ordering::SeqCst),
            pages_processed: self.pages_processed.load(Ordering::SeqCst),
            ocr_pages: self.ocr_pages.load(Ordering::SeqCst),
            failed_pages: self.failed_pages.load(Ordering::SeqCst),
            complete: self.complete.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_pages_and_completion() {
        let status = ProgressStatus::new();
        status.reset(3);
        status.page_done(false, false);
        status.page_done(true, false);
        status.page_done(true, true);
        let snap = status.snapshot();
        assert_eq!(snap.total_pages, 3);
        assert_eq!(snap.pages_processed, 3);
        assert_eq!(snap.ocr_pages, 2);
        assert_eq!(snap.failed_pages, 1);
        assert!(!snap.complete);
        status.mark_complete();
        assert!(status.snapshot().complete);
    }
}
