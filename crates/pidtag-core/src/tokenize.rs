//! Word-to-token grouping shared by native and OCR text.
//!
//! Backends hand over whitespace-separated words. Adjacent words on one line
//! are joined into a single token only when they read as a phrase: an
//! alphabetic word followed, at normal spacing, by another alphabetic word or
//! a short number (`NOTE 3`, `ROCK TRAP 1`, `DRAWING STATUS`). Alphanumeric
//! labels stay separate even when they share a line.

use crate::backend::Word;
use crate::geometry::{BoundingBox, Rotation};
use crate::{Token, TokenOrigin};

/// Uppercase and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-whitespace characters across all tokens.
pub fn char_count(tokens: &[Token]) -> usize {
    tokens
        .iter()
        .map(|t| t.text.chars().filter(|c| !c.is_whitespace()).count())
        .sum()
}

fn is_alpha_word(s: &str) -> bool {
    s.chars().any(|c| c.is_alphabetic()) && s.chars().all(|c| c.is_alphabetic() || c == '.')
}

fn is_short_number(s: &str) -> bool {
    !s.is_empty() && s.len() <= 3 && s.chars().all(|c| c.is_ascii_digit())
}

/// Distance along the reading direction from the end of `left` to the start of `right`.
fn reading_gap(left: &BoundingBox, right: &BoundingBox, rotation: Rotation) -> f32 {
    match rotation {
        Rotation::Deg0 => right.x0 - left.x1,
        Rotation::Deg90 => right.y0 - left.y1,
        Rotation::Deg180 => left.x0 - right.x1,
        Rotation::Deg270 => left.y0 - right.y1,
    }
}

/// Character height across the reading direction.
fn glyph_height(b: &BoundingBox, rotation: Rotation) -> f32 {
    if rotation.is_vertical() {
        b.width()
    } else {
        b.height()
    }
}

fn joins(prev: &Word, next: &Word, phrase_gap: f32) -> bool {
    if prev.line != next.line || prev.rotation != next.rotation {
        return false;
    }
    if !is_alpha_word(&prev.text) {
        return false;
    }
    if !(is_alpha_word(&next.text) || is_short_number(&next.text)) {
        return false;
    }
    let height = glyph_height(&prev.bbox, prev.rotation).min(glyph_height(&next.bbox, next.rotation));
    if height <= 0.0 {
        return false;
    }
    let gap = reading_gap(&prev.bbox, &next.bbox, prev.rotation);
    gap >= -height * 0.2 && gap <= height * phrase_gap
}

struct Phrase {
    words: Vec<String>,
    bbox: BoundingBox,
    rotation: Rotation,
    confidence: Option<f32>,
    last: Word,
}

impl Phrase {
    fn start(word: Word) -> Self {
        Self {
            words: vec![word.text.clone()],
            bbox: word.bbox,
            rotation: word.rotation,
            confidence: word.confidence,
            last: word,
        }
    }

    fn push(&mut self, word: Word) {
        self.words.push(word.text.clone());
        self.bbox = self.bbox.union(&word.bbox);
        self.confidence = match (self.confidence, word.confidence) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last = word;
    }

    fn into_token(self, page: usize, origin: TokenOrigin) -> Token {
        Token {
            text: self.words.join(" "),
            bbox: self.bbox,
            rotation: self.rotation,
            origin,
            confidence: self.confidence,
            page,
        }
    }
}

/// Group words into tokens. Words must be in backend reading order.
pub fn phrase_tokens(
    words: Vec<Word>,
    page: usize,
    origin: TokenOrigin,
    phrase_gap: f32,
) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<Phrase> = None;

    for word in words {
        if word.text.trim().is_empty() {
            continue;
        }
        let joined = current
            .as_ref()
            .is_some_and(|phrase| joins(&phrase.last, &word, phrase_gap));
        if joined {
            if let Some(phrase) = current.as_mut() {
                phrase.push(word);
            }
        } else {
            if let Some(done) = current.take() {
                tokens.push(done.into_token(page, origin));
            }
            current = Some(Phrase::start(word));
        }
    }
    if let Some(done) = current {
        tokens.push(done.into_token(page, origin));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x0: f32, line: u32) -> Word {
        let width = text.len() as f32 * 6.0;
        Word {
            text: text.into(),
            bbox: BoundingBox::new(x0, 100.0, x0 + width, 110.0),
            rotation: Rotation::Deg0,
            confidence: None,
            line,
        }
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn normalize_uppercases_and_collapses() {
        assert_eq!(normalize_text("  note \t 3 "), "NOTE 3");
        assert_eq!(normalize_text("storm_p1001-1"), "STORM_P1001-1");
    }

    #[test]
    fn note_reference_is_one_token() {
        // "NOTE" is 24 wide at x=10; a 3pt gap is a normal space.
        let tokens = phrase_tokens(
            vec![word("NOTE", 10.0, 0), word("3", 37.0, 0)],
            0,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(texts(&tokens), vec!["NOTE 3"]);
        assert_eq!(tokens[0].bbox.x0, 10.0);
        assert_eq!(tokens[0].bbox.x1, 43.0);
    }

    #[test]
    fn multi_word_equipment_name() {
        let tokens = phrase_tokens(
            vec![
                word("ROCK", 10.0, 0),
                word("TRAP", 37.0, 0),
                word("1", 64.0, 0),
            ],
            0,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(texts(&tokens), vec!["ROCK TRAP 1"]);
    }

    #[test]
    fn adjacent_tags_stay_separate() {
        let tokens = phrase_tokens(
            vec![word("VLV1001", 10.0, 0), word("VLV1002", 55.0, 0)],
            0,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(texts(&tokens), vec!["VLV1001", "VLV1002"]);
    }

    #[test]
    fn distant_words_stay_separate() {
        let tokens = phrase_tokens(
            vec![word("A", 10.0, 0), word("B", 200.0, 0)],
            0,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(texts(&tokens), vec!["A", "B"]);
    }

    #[test]
    fn different_lines_never_join() {
        let tokens = phrase_tokens(
            vec![word("NOTE", 10.0, 0), word("3", 37.0, 1)],
            0,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(texts(&tokens), vec!["NOTE", "3"]);
    }

    #[test]
    fn number_does_not_start_a_phrase() {
        let tokens = phrase_tokens(
            vec![word("P1021", 10.0, 0), word("2", 43.0, 0)],
            0,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(texts(&tokens), vec!["P1021", "2"]);
    }

    #[test]
    fn vertical_phrase_uses_vertical_gap() {
        let make = |text: &str, y0: f32| Word {
            text: text.into(),
            bbox: BoundingBox::new(50.0, y0, 60.0, y0 + text.len() as f32 * 6.0),
            rotation: Rotation::Deg90,
            confidence: None,
            line: 4,
        };
        let tokens = phrase_tokens(
            vec![make("NOTE", 10.0), make("3", 37.0)],
            2,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(texts(&tokens), vec!["NOTE 3"]);
        assert_eq!(tokens[0].rotation, Rotation::Deg90);
        assert_eq!(tokens[0].page, 2);
    }

    #[test]
    fn char_count_ignores_whitespace() {
        let tokens = phrase_tokens(
            vec![word("NOTE", 10.0, 0), word("3", 37.0, 0), word("VLV1001", 200.0, 0)],
            0,
            TokenOrigin::Native,
            0.6,
        );
        assert_eq!(char_count(&tokens), 12);
    }

    #[test]
    fn phrase_confidence_is_minimum() {
        let mut a = word("ROCK", 10.0, 0);
        a.confidence = Some(90.0);
        let mut b = word("TRAP", 37.0, 0);
        b.confidence = Some(60.0);
        let tokens = phrase_tokens(vec![a, b], 0, TokenOrigin::Native, 0.6);
        assert_eq!(tokens[0].confidence, Some(60.0));
    }
}
