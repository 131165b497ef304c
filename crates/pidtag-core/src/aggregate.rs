use std::collections::{BTreeMap, BTreeSet};

use crate::{
    ExtractionResult, PageFailure, PageFailureReason, RejectStats, TagCandidate, TagLocation,
    TagRecord, TagType, TypeCount, Verdict, Warning,
};

struct RecordBuilder {
    tag_type: TagType,
    occurrences: usize,
    locations: Vec<TagLocation>,
    pages: BTreeSet<usize>,
}

/// Page-level facts the aggregator reports but does not compute.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub document: String,
    pub total_pages: usize,
    pub pages_processed: usize,
    pub ocr_pages: Vec<usize>,
    pub failed_pages: Vec<PageFailure>,
}

/// Reduces classified candidates into unique [`TagRecord`]s.
///
/// Keyed by normalized text. The first accepted candidate for a key fixes
/// the record's type.
pub struct Aggregator {
    records: BTreeMap<String, RecordBuilder>,
    stats: RejectStats,
    max_locations: usize,
}

impl Aggregator {
    pub fn new(max_locations: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            stats: RejectStats::default(),
            max_locations,
        }
    }

    pub fn add(&mut self, candidate: &TagCandidate) {
        self.stats.total_tokens += 1;
        let tag_type = match &candidate.verdict {
            Verdict::Tag(t) => *t,
            Verdict::Rejected(reason) => {
                self.stats.record(reason);
                return;
            }
        };

        let entry = self
            .records
            .entry(candidate.normalized.clone())
            .or_insert_with(|| RecordBuilder {
                tag_type,
                occurrences: 0,
                locations: Vec::new(),
                pages: BTreeSet::new(),
            });
        entry.occurrences += 1;
        entry.pages.insert(candidate.origin.page);
        if entry.locations.len() < self.max_locations {
            entry.locations.push(TagLocation {
                page: candidate.origin.page,
                bbox: candidate.origin.bbox,
            });
        }
    }

    pub fn extend<'a>(&mut self, candidates: impl IntoIterator<Item = &'a TagCandidate>) {
        for c in candidates {
            self.add(c);
        }
    }

    /// Build the immutable result in canonical order (type, then text).
    pub fn finish(self, summary: RunSummary) -> ExtractionResult {
        let mut records: Vec<TagRecord> = self
            .records
            .into_iter()
            .map(|(text, b)| TagRecord {
                text,
                tag_type: b.tag_type,
                occurrences: b.occurrences,
                locations: b.locations,
                pages: b.pages.into_iter().collect(),
            })
            .collect();
        records.sort_by(|a, b| a.tag_type.cmp(&b.tag_type).then_with(|| a.text.cmp(&b.text)));

        let type_counts = TagType::ALL
            .iter()
            .map(|&tag_type| {
                let (unique, occurrences) = records
                    .iter()
                    .filter(|r| r.tag_type == tag_type)
                    .fold((0, 0), |(u, o), r| (u + 1, o + r.occurrences));
                TypeCount {
                    tag_type,
                    unique,
                    occurrences,
                }
            })
            .collect();

        let warnings = build_warnings(&summary);

        ExtractionResult {
            document: summary.document,
            records,
            type_counts,
            total_pages: summary.total_pages,
            pages_processed: summary.pages_processed,
            ocr_pages: summary.ocr_pages,
            failed_pages: summary.failed_pages,
            reject_stats: self.stats,
            warnings,
        }
    }
}

fn build_warnings(summary: &RunSummary) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if summary.total_pages == 0 {
        warnings.push(Warning::DocumentEmpty);
        return warnings;
    }
    if !summary.ocr_pages.is_empty() {
        warnings.push(Warning::OcrFallback {
            pages: summary.ocr_pages.len(),
        });
    }
    let (mut failed, mut unavailable, mut unreadable) = (0, 0, 0);
    for failure in &summary.failed_pages {
        match failure.reason {
            PageFailureReason::OcrFailed(_) => failed += 1,
            PageFailureReason::OcrUnavailable => unavailable += 1,
            PageFailureReason::Backend(_) => unreadable += 1,
        }
    }
    if failed > 0 {
        warnings.push(Warning::OcrFailed { pages: failed });
    }
    if unavailable > 0 {
        warnings.push(Warning::OcrUnavailable { pages: unavailable });
    }
    if unreadable > 0 {
        warnings.push(Warning::PagesUnreadable { pages: unreadable });
    }
    warnings
}
