use std::path::{Path, PathBuf};

use pidtag_core::{ExtractionResult, TagType};

use crate::{ExportError, ExportFormat};

/// Render `result` in `format`.
///
/// `raw` repeats each tag once per occurrence in the single-column CSV;
/// the other formats already carry counts and ignore it.
pub fn render(result: &ExtractionResult, format: ExportFormat, raw: bool) -> Result<String, ExportError> {
    Ok(match format {
        ExportFormat::Csv => export_csv(result, raw),
        ExportFormat::CsvCounts => export_csv_counts(result),
        ExportFormat::Json => export_json(result)?,
    })
}

/// Write `result` to `path`, creating parent directories.
pub fn write_export(
    result: &ExtractionResult,
    format: ExportFormat,
    raw: bool,
    path: &Path,
) -> Result<(), ExportError> {
    let content = render(result, format, raw)?;
    let write_err = |source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, content).map_err(write_err)?;
    Ok(())
}

/// `<dir>/<pdf stem>_tags.<ext>`.
pub fn default_output_path(dir: &Path, pdf: &Path, format: ExportFormat) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "drawing".to_string());
    dir.join(format!("{}_tags.{}", stem, format.extension()))
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn export_csv(result: &ExtractionResult, raw: bool) -> String {
    let mut out = String::from("Tag\n");
    for record in &result.records {
        let repeats = if raw { record.occurrences.max(1) } else { 1 };
        let cell = csv_escape(&record.text);
        for _ in 0..repeats {
            out.push_str(&cell);
            out.push('\n');
        }
    }
    out
}

pub fn export_csv_counts(result: &ExtractionResult) -> String {
    let mut out = String::from("Tag,Type,Count\n");
    for record in &result.records {
        out.push_str(&format!(
            "{},{},{}\n",
            csv_escape(&record.text),
            record.tag_type.as_str(),
            record.occurrences
        ));
    }
    out
}

pub fn export_json(result: &ExtractionResult) -> Result<String, ExportError> {
    let mut out = serde_json::to_string_pretty(result)?;
    out.push('\n');
    Ok(out)
}

fn page_list(pages: impl Iterator<Item = usize>) -> String {
    pages
        .map(|p| (p + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Plain-text run summary. Page numbers are 1-based.
pub fn summary_text(result: &ExtractionResult) -> String {
    let mut out = format!("{}\n", result.document);
    out.push_str(&"-".repeat(result.document.chars().count().max(1)));
    out.push('\n');
    out.push_str(&format!(
        "  {} page(s) | {} processed | {} via OCR | {} failed\n",
        result.total_pages,
        result.pages_processed,
        result.ocr_pages.len(),
        result.failed_pages.len(),
    ));
    out.push_str(&format!(
        "  {} unique tag(s), {} occurrence(s)\n",
        result.total_unique(),
        result.total_occurrences(),
    ));
    for tag_type in TagType::ALL {
        let count = result.count_for(tag_type);
        out.push_str(&format!(
            "    {:<16} {:>5} unique {:>6} total\n",
            tag_type.label(),
            count.unique,
            count.occurrences,
        ));
    }

    let stats = &result.reject_stats;
    out.push_str(&format!(
        "  {} token(s) read, {} rejected (excluded {}, stoplisted {}, no match {}, failed validation {}, empty {}, too long {})\n",
        stats.total_tokens,
        stats.rejected(),
        stats.excluded,
        stats.stoplisted,
        stats.no_match,
        stats.validation_failed,
        stats.empty,
        stats.too_long,
    ));

    if !result.ocr_pages.is_empty() {
        out.push_str(&format!(
            "  OCR pages: {}\n",
            page_list(result.ocr_pages.iter().copied())
        ));
    }
    for failure in &result.failed_pages {
        out.push_str(&format!("  page {} skipped: {}\n", failure.page + 1, failure.reason));
    }
    for warning in &result.warnings {
        out.push_str(&format!("  warning: {}\n", warning));
    }
    out
}
