use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use pidtag_core::config_file::{self, ConfigFile};
use pidtag_core::{Config, ExtractError, ProgressEvent, ProgressStatus};
use pidtag_ingest::Pipeline;
use pidtag_ocr::TesseractConfig;
use pidtag_reporting::ExportFormat;
use pidtag_rules::{RuleSet, RuleSetBuilder};

mod output;
mod settings;

use output::ColorMode;
use settings::FlagOverrides;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// P&ID tag extractor - Pull equipment, valve and instrument tags out of drawing PDFs
#[derive(Parser, Debug)]
#[command(name = "pidtag", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract tags from a P&ID PDF and export them
    Extract(ExtractArgs),

    /// Write the default configuration, including the full rule table
    InitConfig {
        /// Destination (default: platform config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Classify strings against the rule table, or print the table
    CheckRules {
        /// Extra config file layered over the usual cascade
        #[arg(long)]
        config: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Strings to classify; prints the rule table when empty
        text: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Path to the PDF drawing
    pdf: PathBuf,

    /// Output directory (default: the PDF's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export format: csv, csv-counts or json
    #[arg(long, default_value = "csv")]
    format: ExportFormat,

    /// Repeat each tag once per occurrence instead of deduplicating
    #[arg(long)]
    raw: bool,

    /// Extra config file layered over the usual cascade
    #[arg(long)]
    config: Option<PathBuf>,

    /// Native character count below which a page goes to OCR
    #[arg(long)]
    threshold: Option<usize>,

    /// Raster upscale factor for OCR (minimum 2.0)
    #[arg(long)]
    scale: Option<f32>,

    /// Number of page workers
    #[arg(long)]
    workers: Option<usize>,

    /// Never run OCR; text-sparse pages are used as-is
    #[arg(long)]
    no_ocr: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Print the tags without writing an export file
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Command::Extract(args) => extract(args).await,
        Command::InitConfig { path, force } => init_config(path.as_deref(), force),
        Command::CheckRules {
            config,
            no_color,
            text,
        } => check_rules(config.as_deref(), no_color, &text),
    }
}

fn init_logging(
    verbose: u8,
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("invalid log file path: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// File cascade, `--config`, then `PIDTAG_*` environment overrides.
fn load_settings(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let file = settings::load_file_config(explicit)?;
    Ok(config_file::merge(
        file,
        settings::env_overrides(|key| std::env::var(key).ok()),
    ))
}

fn build_rules(file: &ConfigFile) -> Result<RuleSet, ExtractError> {
    match &file.rules {
        Some(rules) => Ok(RuleSetBuilder::from_config(rules).build()?),
        None => Ok(RuleSet::default()),
    }
}

async fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    if !args.pdf.exists() {
        anyhow::bail!("File not found: {}", args.pdf.display());
    }

    let color = ColorMode(!args.no_color);
    let file = load_settings(args.config.as_deref())?;
    let rules = build_rules(&file)?;
    let config = settings::resolve(
        &file,
        &FlagOverrides {
            threshold: args.threshold,
            scale: args.scale,
            workers: args.workers,
            no_ocr: args.no_ocr,
        },
    );
    tracing::info!(
        threshold = config.sparse_text_threshold,
        scale = config.ocr_scale(),
        workers = config.num_workers,
        ocr = config.ocr_enabled,
        "configuration resolved"
    );

    let pipeline = Pipeline::mupdf(rules, config)
        .with_tesseract(TesseractConfig::from_file(file.ocr.as_ref()));

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len} pages")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message(format!("Reading {}", args.pdf.display()));

    let progress_bar = bar.clone();
    let progress_cb = move |event: ProgressEvent| {
        if let Some(line) = output::progress_line(&event, color) {
            progress_bar.suspend(|| eprintln!("{}", line));
        }
        match event {
            ProgressEvent::DocumentOpened { total_pages } => {
                progress_bar.set_length(total_pages as u64);
            }
            ProgressEvent::PageFinished { .. } | ProgressEvent::PageFailed { .. } => {
                progress_bar.inc(1);
            }
            ProgressEvent::Classifying { tokens } => {
                progress_bar.set_message(format!("Classifying {} tokens", tokens));
            }
            _ => {}
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let status = Arc::new(ProgressStatus::new());
    let outcome = pipeline
        .run(&args.pdf, progress_cb, cancel, status.clone())
        .await;
    bar.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(ExtractError::Cancelled) => {
            let snap = status.snapshot();
            anyhow::bail!(
                "Cancelled after {}/{} pages; nothing was written",
                snap.pages_processed,
                snap.total_pages
            );
        }
        Err(e) => return Err(e.into()),
    };

    let mut stdout = std::io::stdout();
    output::print_summary(&mut stdout, &result, color)?;

    if args.dry_run {
        output::print_tags(&mut stdout, &result, color)?;
        return Ok(());
    }

    let dir = match args.output {
        Some(dir) => dir,
        None => args
            .pdf
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let path = pidtag_reporting::default_output_path(&dir, &args.pdf, args.format);
    pidtag_reporting::write_export(&result, args.format, args.raw, &path)?;

    let rows = if args.raw {
        result.total_occurrences()
    } else {
        result.total_unique()
    };
    if color.enabled() {
        writeln!(stdout, "Wrote {} rows to {}", rows, path.display().bold())?;
    } else {
        writeln!(stdout, "Wrote {} rows to {}", rows, path.display())?;
    }
    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config_file::config_path().context("could not determine config directory")?,
    };
    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            target.display()
        );
    }

    let mut file = ConfigFile::from_config(&Config::default());
    file.rules = Some(pidtag_rules::defaults::rules_config());
    let written = config_file::save_config(&file, Some(&target))?;
    println!("Wrote default configuration to {}", written.display());
    Ok(())
}

fn check_rules(config: Option<&Path>, no_color: bool, text: &[String]) -> anyhow::Result<()> {
    let color = ColorMode(!no_color);
    let file = load_settings(config)?;
    let rules = build_rules(&file)?;
    let mut stdout = std::io::stdout();

    if text.is_empty() {
        output::print_rule_table(&mut stdout, &rules, color)?;
        return Ok(());
    }
    for t in text {
        let (verdict, matcher) = rules.classify_text(t, false);
        output::print_verdict(&mut stdout, t, &verdict, matcher.as_deref(), color)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_flags_parse() {
        let cli = Cli::try_parse_from([
            "pidtag",
            "-vv",
            "extract",
            "drawing.pdf",
            "--format",
            "csv-counts",
            "--raw",
            "--threshold",
            "150",
            "--no-ocr",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.pdf, PathBuf::from("drawing.pdf"));
        assert_eq!(args.format, ExportFormat::CsvCounts);
        assert!(args.raw);
        assert_eq!(args.threshold, Some(150));
        assert!(args.no_ocr);
        assert!(!args.dry_run);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = Cli::try_parse_from(["pidtag", "extract", "a.pdf", "--format", "xlsx"]);
        assert!(err.is_err());
    }

    #[test]
    fn check_rules_takes_free_text() {
        let cli = Cli::try_parse_from(["pidtag", "check-rules", "VLV1001", "NOTE 3"]).unwrap();
        let Command::CheckRules { text, .. } = cli.command else {
            panic!("expected check-rules");
        };
        assert_eq!(text, vec!["VLV1001", "NOTE 3"]);
    }

    #[test]
    fn invalid_rules_in_config_fail_before_extraction() {
        let file: ConfigFile = toml::from_str(
            r#"
[rules.exclusions]
items = [{ name = "bad", pattern = "^(ST" }]
"#,
        )
        .unwrap();
        let err = build_rules(&file).unwrap_err();
        assert!(matches!(err, ExtractError::RuleConfigurationInvalid(_)));
    }

    #[test]
    fn init_config_writes_rule_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pidtag.toml");
        init_config(Some(&path), false).unwrap();
        assert!(init_config(Some(&path), false).is_err());
        init_config(Some(&path), true).unwrap();

        let parsed = config_file::load_from_path(&path).unwrap().unwrap();
        let rules = RuleSetBuilder::from_config(parsed.rules.as_ref().unwrap())
            .build()
            .unwrap();
        assert_eq!(rules.matchers().len(), RuleSet::default().matchers().len());
        assert_eq!(parsed.extraction.unwrap().sparse_text_threshold, Some(200));
    }
}
