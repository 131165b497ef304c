use std::io::Write;

use owo_colors::OwoColorize;
use pidtag_core::{ExtractionResult, ProgressEvent, TagType, Verdict};
use pidtag_reporting::summary_text;
use pidtag_rules::RuleSet;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// One line for progress events worth showing above the progress bar.
pub fn progress_line(event: &ProgressEvent, color: ColorMode) -> Option<String> {
    match event {
        ProgressEvent::OcrRetry {
            page,
            pass,
            attempt,
            error,
        } => {
            let msg = format!(
                "page {}: {} OCR pass failed ({}), retry {}",
                page + 1,
                pass,
                error,
                attempt
            );
            Some(if color.enabled() {
                msg.yellow().to_string()
            } else {
                msg
            })
        }
        ProgressEvent::PageFailed {
            page,
            total,
            reason,
        } => {
            let msg = format!("[{}/{}] page skipped: {}", page + 1, total, reason);
            Some(if color.enabled() {
                msg.red().to_string()
            } else {
                msg
            })
        }
        _ => None,
    }
}

fn type_label(tag_type: TagType, color: ColorMode) -> String {
    let label = format!("{:<15}", tag_type.as_str());
    if !color.enabled() {
        return label;
    }
    match tag_type {
        TagType::Equipment => label.cyan().to_string(),
        TagType::Valve => label.green().to_string(),
        TagType::Instrument => label.magenta().to_string(),
        TagType::ActuatedValve => label.blue().to_string(),
    }
}

/// Print the run summary: page counts, per-type counts, skipped pages, warnings.
///
/// Without color this is the same text the reporting crate produces.
pub fn print_summary(
    w: &mut dyn Write,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if !color.enabled() {
        writeln!(w, "{}", summary_text(result))?;
        return Ok(());
    }

    writeln!(w, "{}", "═".repeat(60).bold())?;
    writeln!(w, "{}", format!("  {}", result.document).bold())?;
    writeln!(w, "{}", "═".repeat(60).bold())?;
    writeln!(
        w,
        "  Pages:        {} ({} processed, {} via OCR, {} skipped)",
        result.total_pages,
        result.pages_processed,
        result.ocr_pages.len(),
        result.failed_pages.len()
    )?;
    writeln!(
        w,
        "  Tokens:       {} ({} rejected)",
        result.reject_stats.total_tokens,
        result.reject_stats.rejected()
    )?;
    writeln!(
        w,
        "  Unique tags:  {}",
        result.total_unique().to_string().green().bold()
    )?;
    for tag_type in TagType::ALL {
        let count = result.count_for(tag_type);
        writeln!(
            w,
            "    {:<16}{:>5} unique, {} occurrences",
            tag_type.label(),
            count.unique,
            count.occurrences
        )?;
    }

    for failure in &result.failed_pages {
        let msg = format!("page {} skipped: {}", failure.page + 1, failure.reason);
        writeln!(w, "  {}", msg.red())?;
    }
    for warning in &result.warnings {
        writeln!(w, "  {} {}", "WARNING:".yellow().bold(), warning)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print every tag with its type, count and 1-based pages.
pub fn print_tags(
    w: &mut dyn Write,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    if result.records.is_empty() {
        writeln!(w, "No tags found.")?;
        return Ok(());
    }
    for record in &result.records {
        let pages = record
            .pages
            .iter()
            .map(|p| (p + 1).to_string())
            .collect::<Vec<_>>()
            .join(",");
        let text = if color.enabled() {
            format!("{:<30}", record.text).bold().to_string()
        } else {
            format!("{:<30}", record.text)
        };
        writeln!(
            w,
            "  {} {} x{:<4} p.{}",
            type_label(record.tag_type, color),
            text,
            record.occurrences,
            pages
        )?;
    }
    Ok(())
}

/// Print one `check-rules` verdict.
pub fn print_verdict(
    w: &mut dyn Write,
    text: &str,
    verdict: &Verdict,
    matcher: Option<&str>,
    color: ColorMode,
) -> std::io::Result<()> {
    match verdict {
        Verdict::Tag(tag_type) => {
            let via = matcher.unwrap_or("-");
            if color.enabled() {
                writeln!(
                    w,
                    "{:<30} {} {}",
                    text,
                    tag_type.as_str().green(),
                    format!("({})", via).dimmed()
                )?;
            } else {
                writeln!(w, "{:<30} {} ({})", text, tag_type.as_str(), via)?;
            }
        }
        Verdict::Rejected(reason) => {
            if color.enabled() {
                writeln!(w, "{:<30} {} {}", text, "rejected".red(), reason.dimmed())?;
            } else {
                writeln!(w, "{:<30} rejected {}", text, reason)?;
            }
        }
    }
    Ok(())
}

/// Print the compiled rule table in evaluation order.
pub fn print_rule_table(w: &mut dyn Write, rules: &RuleSet, color: ColorMode) -> std::io::Result<()> {
    let heading = |s: &str| {
        if color.enabled() {
            s.bold().to_string()
        } else {
            s.to_string()
        }
    };

    writeln!(
        w,
        "max tag length {}, border margin {:.0}%",
        rules.max_tag_len(),
        rules.border_margin() * 100.0
    )?;
    writeln!(w)?;
    writeln!(w, "{}", heading("Exclusions"))?;
    for ex in rules.exclusions() {
        let scope = if ex.near_border { " (near border)" } else { "" };
        writeln!(w, "  {:<16} {}{}", ex.name, ex.regex.as_str(), scope)?;
    }
    writeln!(w)?;
    writeln!(w, "{}", heading("Stoplist"))?;
    writeln!(w, "  {}", rules.stoplist().join(", "))?;
    writeln!(w)?;
    writeln!(w, "{}", heading("Matchers"))?;
    for (i, m) in rules.matchers().iter().enumerate() {
        let patterns = m
            .patterns
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(
            w,
            "  {}. {:<20} {} {}",
            i + 1,
            m.name,
            type_label(m.tag_type, color),
            patterns
        )?;
    }
    Ok(())
}
