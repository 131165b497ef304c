//! Parser for Tesseract's `tsv` output format.
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num, left,
//! top, width, height, conf, text. Only level-5 (word) rows carry text.

use std::collections::HashMap;

use pidtag_core::{BoundingBox, Rotation, Word};

const WORD_LEVEL: u32 = 5;
const COLUMNS: usize = 12;

/// Parse TSV into words in raster pixel coordinates.
///
/// Words keep Tesseract's output order. Rows with negative confidence or
/// blank text are skipped, as are malformed rows. Each distinct
/// (block, paragraph, line) triple gets its own line number.
pub fn parse_words(tsv: &str) -> Vec<Word> {
    let mut lines: HashMap<(u32, u32, u32), u32> = HashMap::new();
    let mut words = Vec::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < COLUMNS {
            continue;
        }
        // Header row fails this parse.
        let Ok(level) = cols[0].parse::<u32>() else {
            continue;
        };
        if level != WORD_LEVEL {
            continue;
        }
        let text = cols[11].trim();
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let (left, top, width, height) = (num(6), num(7), num(8), num(9));

        let next_line = lines.len() as u32;
        let line = *lines.entry((num(2), num(3), num(4))).or_insert(next_line);

        words.push(Word {
            text: text.to_string(),
            bbox: BoundingBox::new(
                left as f32,
                top as f32,
                (left + width) as f32,
                (top + height) as f32,
            ),
            rotation: Rotation::Deg0,
            confidence: Some(conf),
            line,
        });
    }
    words
}
