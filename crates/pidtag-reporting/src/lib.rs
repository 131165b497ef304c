use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub mod export;

pub use export::{
    default_output_path, export_csv, export_csv_counts, export_json, render, summary_text,
    write_export,
};

/// Output file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Single `Tag` column, one row per unique tag.
    #[default]
    Csv,
    /// `Tag,Type,Count` columns.
    CsvCounts,
    Json,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Csv, ExportFormat::CsvCounts, ExportFormat::Json]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::CsvCounts => "csv-counts",
            Self::Json => "json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv | Self::CsvCounts => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "csv" => Ok(Self::Csv),
            "csv-counts" | "counts" => Ok(Self::CsvCounts),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown format '{}' (expected one of: csv, csv-counts, json)",
                other
            )),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize result: {0}")]
    Json(#[from] serde_json::Error),
}
