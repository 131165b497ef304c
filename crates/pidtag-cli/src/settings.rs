//! Configuration resolution: CLI flags > environment > config files > defaults.

use std::path::Path;

use anyhow::Context;
use pidtag_core::Config;
use pidtag_core::config_file::{self, ConcurrencyConfig, ConfigFile, ExtractionConfig, OcrConfig};

pub const ENV_THRESHOLD: &str = "PIDTAG_THRESHOLD";
pub const ENV_OCR_SCALE: &str = "PIDTAG_OCR_SCALE";
pub const ENV_OCR_ENABLED: &str = "PIDTAG_OCR";
pub const ENV_WORKERS: &str = "PIDTAG_WORKERS";
pub const ENV_TESSERACT: &str = "PIDTAG_TESSERACT";
pub const ENV_OCR_LANG: &str = "PIDTAG_OCR_LANG";

/// Flag values that override everything else.
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub threshold: Option<usize>,
    pub scale: Option<f32>,
    pub workers: Option<usize>,
    pub no_ocr: bool,
}

/// Platform and CWD config files, then `explicit` on top when given.
pub fn load_file_config(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let file = config_file::load_config()?;
    let Some(path) = explicit else {
        return Ok(file);
    };
    let overlay = config_file::load_from_path(path)?
        .with_context(|| format!("config file not found: {}", path.display()))?;
    Ok(config_file::merge(file, overlay))
}

fn parse_env<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `PIDTAG_*` variables as a config overlay.
pub fn env_overrides(lookup: impl Fn(&str) -> Option<String>) -> ConfigFile {
    ConfigFile {
        extraction: Some(ExtractionConfig {
            sparse_text_threshold: parse_env(&lookup, ENV_THRESHOLD),
            ..ExtractionConfig::default()
        }),
        ocr: Some(OcrConfig {
            enabled: lookup(ENV_OCR_ENABLED).and_then(|v| parse_bool(&v)),
            scale: parse_env(&lookup, ENV_OCR_SCALE),
            tesseract_path: lookup(ENV_TESSERACT).filter(|v| !v.trim().is_empty()),
            language: lookup(ENV_OCR_LANG).filter(|v| !v.trim().is_empty()),
            ..OcrConfig::default()
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: parse_env(&lookup, ENV_WORKERS),
        }),
        rules: None,
    }
}

/// Build the runtime config from a merged file config and flag overrides.
pub fn resolve(file: &ConfigFile, flags: &FlagOverrides) -> Config {
    let mut config = Config::default();
    file.apply_to(&mut config);
    if let Some(v) = flags.threshold {
        config.sparse_text_threshold = v;
    }
    if let Some(v) = flags.scale {
        config.ocr_scale = v;
    }
    if let Some(v) = flags.workers {
        config.num_workers = v.max(1);
    }
    if flags.no_ocr {
        config.ocr_enabled = false;
    }
    config
}
