//! Union of token sets from independent readings of the same page.
//!
//! Two tokens are the same reading when their boxes overlap (IoU at or above
//! `iou`) and their normalized texts are equal or close (`rapidfuzz` ratio at
//! or above `similarity`). Same readings collapse to the higher-confidence
//! one. Overlapping tokens whose texts differ materially are both kept.

use crate::Token;
use crate::geometry::iou;
use crate::tokenize::normalize_text;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeSettings {
    /// Minimum IoU for two boxes to count as the same location.
    pub iou: f32,
    /// Minimum normalized similarity (0.0–1.0) for two texts to count as one reading.
    pub similarity: f64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            iou: 0.5,
            similarity: 0.75,
        }
    }
}

fn same_reading(a: &Token, b: &Token, settings: &MergeSettings) -> bool {
    if iou(&a.bbox, &b.bbox) < settings.iou {
        return false;
    }
    let na = normalize_text(&a.text);
    let nb = normalize_text(&b.text);
    if na == nb {
        return true;
    }
    rapidfuzz::fuzz::ratio(na.chars(), nb.chars()) >= settings.similarity
}

fn confidence(t: &Token) -> f32 {
    t.confidence.unwrap_or(-1.0)
}

/// Merge the tokens of OCR pass A (`first`) and pass B (`second`).
///
/// Output keeps pass A order, with unmatched pass B tokens appended in their
/// own order. Ties on confidence keep the pass A reading.
pub fn merge_passes(first: Vec<Token>, second: Vec<Token>, settings: &MergeSettings) -> Vec<Token> {
    let mut merged = first;
    let base_len = merged.len();

    for token in second {
        let existing = merged[..base_len]
            .iter()
            .position(|m| same_reading(m, &token, settings));
        match existing {
            Some(idx) => {
                if confidence(&token) > confidence(&merged[idx]) {
                    tracing::trace!(
                        kept = %token.text,
                        dropped = %merged[idx].text,
                        "OCR merge preferred second pass"
                    );
                    merged[idx] = token;
                }
            }
            None => merged.push(token),
        }
    }

    merged
}

/// Combine a text-sparse page's native tokens with its OCR tokens.
///
/// OCR tokens that repeat a native token at the same place are dropped;
/// native text is exact where it exists.
pub fn absorb_native(native: Vec<Token>, ocr: Vec<Token>, settings: &MergeSettings) -> Vec<Token> {
    let mut combined = native;
    let native_len = combined.len();
    for token in ocr {
        let duplicate = combined[..native_len]
            .iter()
            .any(|n| same_reading(n, &token, settings));
        if !duplicate {
            combined.push(token);
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, Rotation};
    use crate::{OcrPass, TokenOrigin};

    fn ocr(text: &str, x0: f32, conf: f32, pass: OcrPass) -> Token {
        Token {
            text: text.into(),
            bbox: BoundingBox::new(x0, 50.0, x0 + 42.0, 60.0),
            rotation: Rotation::Deg0,
            origin: TokenOrigin::Ocr(pass),
            confidence: Some(conf),
            page: 0,
        }
    }

    #[test]
    fn overlapping_similar_readings_keep_higher_confidence() {
        let a = vec![ocr("VLVX061", 100.0, 41.0, OcrPass::Sparse)];
        let b = vec![ocr("VLV1061", 101.0, 93.0, OcrPass::Dense)];
        let merged = merge_passes(a, b, &MergeSettings::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "VLV1061");
        assert_eq!(merged[0].origin, TokenOrigin::Ocr(OcrPass::Dense));
    }

    #[test]
    fn lower_confidence_second_pass_is_dropped() {
        let a = vec![ocr("VLV1061", 100.0, 90.0, OcrPass::Sparse)];
        let b = vec![ocr("VLV1O61", 100.0, 50.0, OcrPass::Dense)];
        let merged = merge_passes(a, b, &MergeSettings::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "VLV1061");
    }

    #[test]
    fn materially_different_readings_are_both_kept() {
        let a = vec![ocr("VLV1061", 100.0, 90.0, OcrPass::Sparse)];
        let b = vec![ocr("NOTE 4", 100.0, 95.0, OcrPass::Dense)];
        let merged = merge_passes(a, b, &MergeSettings::default());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn non_overlapping_tokens_are_unioned() {
        let a = vec![ocr("VLV1001", 100.0, 90.0, OcrPass::Sparse)];
        let b = vec![
            ocr("VLV1001", 100.0, 80.0, OcrPass::Dense),
            ocr("P1021", 400.0, 80.0, OcrPass::Dense),
        ];
        let merged = merge_passes(a, b, &MergeSettings::default());
        let texts: Vec<_> = merged.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["VLV1001", "P1021"]);
    }

    #[test]
    fn native_tokens_win_over_ocr_duplicates() {
        let mut native = ocr("VLV1001", 100.0, 0.0, OcrPass::Sparse);
        native.origin = TokenOrigin::Native;
        native.confidence = None;
        let combined = absorb_native(
            vec![native],
            vec![
                ocr("VLV1001", 100.0, 99.0, OcrPass::Sparse),
                ocr("VLV2041", 300.0, 99.0, OcrPass::Sparse),
            ],
            &MergeSettings::default(),
        );
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].origin, TokenOrigin::Native);
        assert_eq!(combined[1].text, "VLV2041");
    }
}
