use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub extraction: Option<ExtractionConfig>,
    pub ocr: Option<OcrConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub rules: Option<RulesConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub sparse_text_threshold: Option<usize>,
    pub phrase_gap: Option<f32>,
    pub max_example_locations: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    pub enabled: Option<bool>,
    pub scale: Option<f32>,
    pub retries: Option<u32>,
    pub min_confidence: Option<f32>,
    pub merge_iou: Option<f32>,
    pub merge_similarity: Option<f64>,
    pub tesseract_path: Option<String>,
    pub language: Option<String>,
    pub dpi: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
}

/// The `[rules]` table. Each list either extends or replaces the built-in one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    pub max_tag_len: Option<usize>,
    /// Fraction of the page extent treated as border for grid-label exclusions.
    pub border_margin: Option<f32>,
    pub exclusions: Option<ListSpec<ExclusionSpec>>,
    pub stoplist: Option<ListSpec<String>>,
    pub matchers: Option<ListSpec<MatcherSpec>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    #[default]
    Extend,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSpec<T> {
    #[serde(default)]
    pub mode: ListMode,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> ListSpec<T> {
    pub fn replace(items: Vec<T>) -> Self {
        Self {
            mode: ListMode::Replace,
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionSpec {
    pub name: String,
    pub pattern: String,
    /// Only reject when the token lies within the page border margin.
    #[serde(default)]
    pub near_border: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherSpec {
    pub name: String,
    pub tag_type: String,
    pub patterns: Vec<String>,
    /// Insert ahead of the named matcher instead of at the end (extend mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default)]
    pub validation: ValidationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyphen_groups: Option<usize>,
    /// Literal prefix that must be followed by digits only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_then_digits: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub require_digit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mostly_uppercase: bool,
}

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(#[from] std::io::Error),
}

pub const LOCAL_CONFIG_NAME: &str = ".pidtag.toml";

/// Platform config directory path: `<config_dir>/pidtag/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pidtag").join("config.toml"))
}

/// Load config by cascading CWD `.pidtag.toml` over platform config.
/// CWD values override platform values. Missing files are skipped; files
/// that exist but do not parse are errors.
pub fn load_config() -> Result<ConfigFile, ConfigFileError> {
    let platform = match config_path() {
        Some(p) => load_from_path(&p)?,
        None => None,
    };
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_NAME))?;

    Ok(match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    })
}

/// Load a config from a specific path. Returns `Ok(None)` if the file
/// doesn't exist.
pub fn load_from_path(path: &Path) -> Result<Option<ConfigFile>, ConfigFileError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigFileError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
///
/// Rule lists are not concatenated across files; an overlay list replaces
/// the base list of the same name.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (b, o) = (&base, &overlay);
    ConfigFile {
        extraction: Some(ExtractionConfig {
            sparse_text_threshold: pick(&o.extraction, &b.extraction, |e| e.sparse_text_threshold),
            phrase_gap: pick(&o.extraction, &b.extraction, |e| e.phrase_gap),
            max_example_locations: pick(&o.extraction, &b.extraction, |e| e.max_example_locations),
        }),
        ocr: Some(OcrConfig {
            enabled: pick(&o.ocr, &b.ocr, |c| c.enabled),
            scale: pick(&o.ocr, &b.ocr, |c| c.scale),
            retries: pick(&o.ocr, &b.ocr, |c| c.retries),
            min_confidence: pick(&o.ocr, &b.ocr, |c| c.min_confidence),
            merge_iou: pick(&o.ocr, &b.ocr, |c| c.merge_iou),
            merge_similarity: pick(&o.ocr, &b.ocr, |c| c.merge_similarity),
            tesseract_path: pick(&o.ocr, &b.ocr, |c| c.tesseract_path.clone()),
            language: pick(&o.ocr, &b.ocr, |c| c.language.clone()),
            dpi: pick(&o.ocr, &b.ocr, |c| c.dpi),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(&o.concurrency, &b.concurrency, |c| c.num_workers),
        }),
        rules: Some(RulesConfig {
            max_tag_len: pick(&o.rules, &b.rules, |r| r.max_tag_len),
            border_margin: pick(&o.rules, &b.rules, |r| r.border_margin),
            exclusions: pick(&o.rules, &b.rules, |r| r.exclusions.clone()),
            stoplist: pick(&o.rules, &b.rules, |r| r.stoplist.clone()),
            matchers: pick(&o.rules, &b.rules, |r| r.matchers.clone()),
        }),
    }
}

impl ConfigFile {
    /// Apply the extraction, OCR and concurrency sections onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(e) = &self.extraction {
            if let Some(v) = e.sparse_text_threshold {
                config.sparse_text_threshold = v;
            }
            if let Some(v) = e.phrase_gap {
                config.phrase_gap = v;
            }
            if let Some(v) = e.max_example_locations {
                config.max_example_locations = v;
            }
        }
        if let Some(o) = &self.ocr {
            if let Some(v) = o.enabled {
                config.ocr_enabled = v;
            }
            if let Some(v) = o.scale {
                config.ocr_scale = v;
            }
            if let Some(v) = o.retries {
                config.ocr_retries = v;
            }
            if let Some(v) = o.min_confidence {
                config.min_ocr_confidence = v;
            }
            if let Some(v) = o.merge_iou {
                config.merge.iou = v;
            }
            if let Some(v) = o.merge_similarity {
                config.merge.similarity = v;
            }
        }
        if let Some(c) = &self.concurrency
            && let Some(n) = c.num_workers
        {
            config.num_workers = n.max(1);
        }
    }

    /// The defaults written by `init-config`, minus the rule table, which
    /// the rules crate fills in.
    pub fn from_config(config: &Config) -> Self {
        ConfigFile {
            extraction: Some(ExtractionConfig {
                sparse_text_threshold: Some(config.sparse_text_threshold),
                phrase_gap: Some(config.phrase_gap),
                max_example_locations: Some(config.max_example_locations),
            }),
            ocr: Some(OcrConfig {
                enabled: Some(config.ocr_enabled),
                scale: Some(config.ocr_scale),
                retries: Some(config.ocr_retries),
                min_confidence: Some(config.min_ocr_confidence),
                merge_iou: Some(config.merge.iou),
                merge_similarity: Some(config.merge.similarity),
                tesseract_path: None,
                language: None,
                dpi: None,
            }),
            concurrency: Some(ConcurrencyConfig { num_workers: None }),
            rules: None,
        }
    }
}

/// Save the config to `path`, or to the platform config directory.
pub fn save_config(config: &ConfigFile, path: Option<&Path>) -> Result<PathBuf, ConfigFileError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().ok_or(ConfigFileError::NoConfigDir)?,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_parses() {
        let toml_str = "[extraction]\nsparse_text_threshold = 150\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.extraction.unwrap().sparse_text_threshold, Some(150));
        assert!(parsed.ocr.is_none());
    }

    #[test]
    fn rules_section_parses_with_default_mode() {
        let toml_str = r#"
[rules.stoplist]
items = ["LEGEND"]

[rules.matchers]
mode = "replace"

[[rules.matchers.items]]
name = "valve"
tag_type = "valve"
patterns = ['^VLV\d{4}$']
validation = { require_digit = true }
"#;
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let rules = parsed.rules.unwrap();
        let stoplist = rules.stoplist.unwrap();
        assert_eq!(stoplist.mode, ListMode::Extend);
        assert_eq!(stoplist.items, vec!["LEGEND".to_string()]);
        let matchers = rules.matchers.unwrap();
        assert_eq!(matchers.mode, ListMode::Replace);
        assert_eq!(matchers.items[0].patterns, vec![r"^VLV\d{4}$".to_string()]);
        assert!(matchers.items[0].validation.require_digit);
        assert!(matchers.items[0].before.is_none());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            ocr: Some(OcrConfig {
                scale: Some(3.0),
                language: Some("eng".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            ocr: Some(OcrConfig {
                scale: Some(4.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let ocr = merged.ocr.unwrap();
        assert_eq!(ocr.scale, Some(4.0));
        assert_eq!(ocr.language.as_deref(), Some("eng"));
    }

    #[test]
    fn apply_overrides_only_present_fields() {
        let file = ConfigFile {
            extraction: Some(ExtractionConfig {
                sparse_text_threshold: Some(50),
                ..Default::default()
            }),
            concurrency: Some(ConcurrencyConfig {
                num_workers: Some(0),
            }),
            ..Default::default()
        };
        let mut config = Config::default();
        file.apply_to(&mut config);
        assert_eq!(config.sparse_text_threshold, 50);
        assert_eq!(config.ocr_scale, 2.0);
        assert_eq!(config.num_workers, 1);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[extraction\nsparse_text_threshold = ").unwrap();
        assert!(matches!(
            load_from_path(&path),
            Err(ConfigFileError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let file = ConfigFile::from_config(&Config::default());
        let written = save_config(&file, Some(&path)).unwrap();
        let loaded = load_from_path(&written).unwrap().unwrap();
        assert_eq!(
            loaded.extraction.unwrap().sparse_text_threshold,
            Some(crate::DEFAULT_SPARSE_TEXT_THRESHOLD)
        );
    }
}
