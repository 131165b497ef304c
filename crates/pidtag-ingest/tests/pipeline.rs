//! End-to-end pipeline tests over an in-memory document and OCR engine.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use pidtag_core::{
    BackendError, BoundingBox, DocumentBackend, OcrEngine, OcrError, OcrPass, PageFailureReason,
    PageImage, PageSource, Rotation, Word,
};
use pidtag_ingest::{
    Config, ExtractError, ExtractionResult, Pipeline, ProgressEvent, ProgressStatus, RuleSet,
    TagType, Warning,
};
use pidtag_rules::RuleSetBuilder;
use pidtag_core::config_file::ExclusionSpec;
use tokio_util::sync::CancellationToken;

/// One word per line, placed well inside the page border.
fn words(texts: &[&str]) -> Vec<Word> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let y = 100.0 + i as f32 * 30.0;
            Word {
                text: text.to_string(),
                bbox: BoundingBox::new(200.0, y, 200.0 + text.len() as f32 * 6.0, y + 10.0),
                rotation: Rotation::Deg0,
                confidence: None,
                line: i as u32,
            }
        })
        .collect()
}

fn ocr_word(text: &str, x0: f32, y0: f32, confidence: f32) -> Word {
    Word {
        text: text.into(),
        bbox: BoundingBox::new(x0, y0, x0 + text.len() as f32 * 12.0, y0 + 20.0),
        rotation: Rotation::Deg0,
        confidence: Some(confidence),
        line: 0,
    }
}

#[derive(Clone)]
struct MockDoc {
    pages: Arc<Vec<Vec<Word>>>,
    unreadable: bool,
    corrupt_pages: HashSet<usize>,
}

impl MockDoc {
    fn new(pages: Vec<Vec<Word>>) -> Self {
        Self {
            pages: Arc::new(pages),
            unreadable: false,
            corrupt_pages: HashSet::new(),
        }
    }
}

impl PageSource for MockDoc {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_bounds(&self, _page: usize) -> Result<BoundingBox, BackendError> {
        Ok(BoundingBox::new(0.0, 0.0, 1000.0, 700.0))
    }

    fn native_words(&self, page: usize) -> Result<Vec<Word>, BackendError> {
        if self.corrupt_pages.contains(&page) {
            return Err(BackendError::ExtractionError("bad xref".into()));
        }
        self.pages
            .get(page)
            .cloned()
            .ok_or(BackendError::PageOutOfRange(page))
    }

    fn rasterize(&self, page: usize, scale: f32) -> Result<PageImage, BackendError> {
        Ok(PageImage::borrowed(
            format!("mock-page-{page}.png"),
            (1000.0 * scale) as u32,
            (700.0 * scale) as u32,
            scale,
        ))
    }
}

impl DocumentBackend for MockDoc {
    fn open(&self, _path: &Path) -> Result<Box<dyn PageSource>, BackendError> {
        if self.unreadable {
            return Err(BackendError::Encrypted);
        }
        Ok(Box::new(self.clone()))
    }
}

#[derive(Default)]
struct MockOcr {
    words: HashMap<(usize, OcrPass), Vec<Word>>,
    broken_pages: HashSet<usize>,
    unavailable: bool,
}

impl OcrEngine for MockOcr {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn recognize(&self, image: &PageImage, pass: OcrPass) -> Result<Vec<Word>, OcrError> {
        let page: usize = image
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("mock-page-"))
            .and_then(|s| s.parse().ok())
            .unwrap();
        if self.broken_pages.contains(&page) {
            return Err(OcrError::Failed("unreadable raster".into()));
        }
        Ok(self.words.get(&(page, pass)).cloned().unwrap_or_default())
    }
}

fn config() -> Config {
    Config {
        sparse_text_threshold: 10,
        num_workers: 3,
        ..Config::default()
    }
}

fn pipeline(doc: MockDoc, ocr: Option<MockOcr>) -> Pipeline {
    let pipeline = Pipeline::new(Arc::new(doc), RuleSet::default(), config());
    match ocr {
        Some(engine) => pipeline.with_ocr(Arc::new(engine)),
        None => pipeline,
    }
}

async fn run(pipeline: &Pipeline) -> Result<ExtractionResult, ExtractError> {
    pipeline
        .run(
            Path::new("/drawings/ST0008.pdf"),
            |_| {},
            CancellationToken::new(),
            Arc::new(ProgressStatus::new()),
        )
        .await
}

fn drawing() -> MockDoc {
    MockDoc::new(vec![
        words(&["STORM_P1001-1", "VLV1002", "ST0008", "EXISTING"]),
        words(&["STORM_P1001-1", "P1021", "NOTE 3"]),
        words(&["STORM_P1001-1", "VLV1001", "QD-1E-84-1101"]),
    ])
}

#[tokio::test]
async fn dedups_and_orders_tags() {
    let result = run(&pipeline(drawing(), None)).await.unwrap();

    assert_eq!(result.document, "ST0008.pdf");
    assert_eq!(
        result.tags().collect::<Vec<_>>(),
        vec![
            "P1021",
            "STORM_P1001-1",
            "VLV1001",
            "VLV1002",
            "QD-1E-84-1101"
        ]
    );
    let storm = &result.records[1];
    assert_eq!(storm.occurrences, 3);
    assert_eq!(storm.pages, vec![0, 1, 2]);
    assert_eq!(storm.tag_type, TagType::Equipment);

    let equipment = result.count_for(TagType::Equipment);
    assert_eq!((equipment.unique, equipment.occurrences), (2, 4));
    assert_eq!(result.count_for(TagType::Valve).unique, 2);
    assert_eq!(result.count_for(TagType::ActuatedValve).unique, 0);

    assert_eq!(result.total_pages, 3);
    assert_eq!(result.pages_processed, 3);
    assert!(result.ocr_pages.is_empty());
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn every_token_becomes_one_candidate() {
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();
    let result = pipeline(drawing(), None)
        .run(
            Path::new("drawing.pdf"),
            move |event| {
                if let ProgressEvent::Classifying { tokens } = event {
                    *seen_clone.lock().unwrap() = Some(tokens);
                }
            },
            CancellationToken::new(),
            Arc::new(ProgressStatus::new()),
        )
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(10));
    assert_eq!(result.reject_stats.total_tokens, 10);
    assert_eq!(result.reject_stats.excluded, 2);
    assert_eq!(result.reject_stats.stoplisted, 1);
    assert_eq!(
        result.reject_stats.rejected() + result.total_occurrences(),
        result.reject_stats.total_tokens
    );
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let pipeline = pipeline(drawing(), None);
    let first = run(&pipeline).await.unwrap();
    let second = run(&pipeline).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn sparse_page_is_read_by_ocr() {
    let mut ocr = MockOcr::default();
    // Raster pixels at scale 2.0.
    ocr.words
        .insert((1, OcrPass::Sparse), vec![ocr_word("VLVX061", 400.0, 400.0, 38.0)]);
    ocr.words.insert(
        (1, OcrPass::Dense),
        vec![
            ocr_word("VLV1061", 400.0, 400.0, 91.0),
            ocr_word("P1033", 900.0, 400.0, 88.0),
        ],
    );
    let doc = MockDoc::new(vec![
        words(&["STORM_P1001-1", "VLV1002"]),
        words(&["KD1"]),
    ]);

    let result = run(&pipeline(doc, Some(ocr))).await.unwrap();

    assert_eq!(result.ocr_pages, vec![1]);
    assert!(result.warnings.contains(&Warning::OcrFallback { pages: 1 }));
    let tags: Vec<&str> = result.tags().collect();
    assert!(tags.contains(&"VLV1061"));
    assert!(tags.contains(&"P1033"));
    assert!(tags.contains(&"KD1"));
    assert!(!tags.contains(&"VLVX061"));

    let valve = result.records.iter().find(|r| r.text == "VLV1061").unwrap();
    assert_eq!(valve.locations[0].page, 1);
    assert_eq!(valve.locations[0].bbox.x0, 200.0);
}

#[tokio::test]
async fn page_failing_ocr_twice_is_skipped() {
    let ocr = MockOcr {
        broken_pages: HashSet::from([2]),
        ..MockOcr::default()
    };
    let doc = MockDoc::new(vec![
        words(&["STORM_P1001-1", "VLV1001"]),
        words(&["VLV1002", "P1021"]),
        words(&["KD1"]),
        words(&["QD-1E-84-1101"]),
    ]);

    let result = run(&pipeline(doc, Some(ocr))).await.unwrap();

    assert_eq!(result.failed_pages.len(), 1);
    assert_eq!(result.failed_pages[0].page, 2);
    assert!(matches!(
        result.failed_pages[0].reason,
        PageFailureReason::OcrFailed(_)
    ));
    assert_eq!(result.pages_processed, 3);
    assert!(result.warnings.contains(&Warning::OcrFailed { pages: 1 }));

    let tags: Vec<&str> = result.tags().collect();
    assert_eq!(tags.len(), 5);
    assert!(!tags.contains(&"KD1"));
}

#[tokio::test]
async fn unreadable_page_is_not_reported_as_ocr_failure() {
    let doc = MockDoc {
        corrupt_pages: HashSet::from([1]),
        ..MockDoc::new(vec![
            words(&["STORM_P1001-1", "VLV1001"]),
            words(&["VLV1002", "P1021"]),
        ])
    };

    let result = run(&pipeline(doc, Some(MockOcr::default()))).await.unwrap();

    assert_eq!(result.failed_pages.len(), 1);
    assert_eq!(result.failed_pages[0].page, 1);
    assert!(matches!(
        result.failed_pages[0].reason,
        PageFailureReason::Backend(_)
    ));
    assert_eq!(result.warnings, vec![Warning::PagesUnreadable { pages: 1 }]);
    assert_eq!(result.tags().collect::<Vec<_>>(), vec!["STORM_P1001-1", "VLV1001"]);
}

#[tokio::test]
async fn unavailable_engine_skips_only_sparse_pages() {
    let ocr = MockOcr {
        unavailable: true,
        ..MockOcr::default()
    };
    let doc = MockDoc::new(vec![words(&["STORM_P1001-1", "VLV1001"]), words(&["KD1"])]);

    let result = run(&pipeline(doc, Some(ocr))).await.unwrap();

    assert_eq!(result.tags().collect::<Vec<_>>(), vec!["STORM_P1001-1", "VLV1001"]);
    assert_eq!(result.failed_pages.len(), 1);
    assert_eq!(result.failed_pages[0].reason, PageFailureReason::OcrUnavailable);
    assert!(result.warnings.contains(&Warning::OcrUnavailable { pages: 1 }));
}

#[tokio::test]
async fn ocr_disabled_uses_sparse_text_as_is() {
    let doc = MockDoc::new(vec![words(&["KD1"])]);
    let pipeline = Pipeline::new(
        Arc::new(doc),
        RuleSet::default(),
        Config {
            ocr_enabled: false,
            ..config()
        },
    )
    .with_ocr(Arc::new(MockOcr::default()));

    let result = run(&pipeline).await.unwrap();
    assert_eq!(result.tags().collect::<Vec<_>>(), vec!["KD1"]);
    assert!(result.ocr_pages.is_empty());
    assert!(result.failed_pages.is_empty());
}

#[tokio::test]
async fn empty_document_warns() {
    let result = run(&pipeline(MockDoc::new(vec![]), None)).await.unwrap();
    assert!(result.records.is_empty());
    assert_eq!(result.total_pages, 0);
    assert_eq!(result.warnings, vec![Warning::DocumentEmpty]);
    assert_eq!(result.type_counts.len(), TagType::ALL.len());
}

#[tokio::test]
async fn unreadable_document_fails_fast() {
    let doc = MockDoc {
        unreadable: true,
        ..MockDoc::new(vec![words(&["VLV1001"])])
    };
    let status = Arc::new(ProgressStatus::new());
    let err = pipeline(doc, None)
        .run(
            Path::new("locked.pdf"),
            |_| {},
            CancellationToken::new(),
            status.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::DocumentUnreadable(_)));
    assert!(status.snapshot().complete);
}

#[tokio::test]
async fn cancelled_run_publishes_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let ocr = MockOcr::default();
    let pipeline = pipeline(drawing(), Some(ocr));
    let err = pipeline
        .run(
            Path::new("drawing.pdf"),
            |_| {},
            cancel,
            Arc::new(ProgressStatus::new()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Cancelled));
}

#[tokio::test]
async fn status_and_events_track_the_run() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    let status = Arc::new(ProgressStatus::new());
    pipeline(drawing(), None)
        .run(
            Path::new("drawing.pdf"),
            move |e| events_clone.lock().unwrap().push(e),
            CancellationToken::new(),
            status.clone(),
        )
        .await
        .unwrap();

    let snap = status.snapshot();
    assert_eq!(snap.total_pages, 3);
    assert_eq!(snap.pages_processed, 3);
    assert_eq!(snap.ocr_pages, 0);
    assert!(snap.complete);

    let events = events.lock().unwrap();
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::DocumentOpened { total_pages: 3 })
    ));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Complete {
            unique_tags: 5,
            ocr_pages: 0,
            failed_pages: 0
        })
    ));
    let finished = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::PageFinished { .. }))
        .count();
    assert_eq!(finished, 3);
}

#[test]
fn invalid_rule_is_a_configuration_error() {
    let err = RuleSetBuilder::new()
        .add_exclusion(ExclusionSpec {
            name: "broken".into(),
            pattern: "^(ST".into(),
            near_border: false,
        })
        .build()
        .unwrap_err();
    let err: ExtractError = err.into();
    match err {
        ExtractError::RuleConfigurationInvalid(msg) => assert!(msg.contains("broken")),
        other => panic!("expected RuleConfigurationInvalid, got {other:?}"),
    }
}
