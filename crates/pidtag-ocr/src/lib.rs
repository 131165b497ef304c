//! Tesseract-backed [`OcrEngine`].
//!
//! Each recognition call spawns the `tesseract` binary on the page raster
//! and reads word boxes from its TSV output on stdout.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;

use pidtag_core::config_file::OcrConfig;
use pidtag_core::{OcrEngine, OcrError, OcrPass, PageImage, Word};

pub mod tsv;

pub use tsv::parse_words;

/// Page segmentation mode for scattered text.
pub const SPARSE_PSM: u32 = 11;
/// Page segmentation mode for a uniform block of text.
pub const DENSE_PSM: u32 = 6;

#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Binary name or path.
    pub binary: PathBuf,
    /// Languages passed to `-l`, e.g. `eng` or `eng+deu`.
    pub language: String,
    pub sparse_psm: u32,
    pub dense_psm: u32,
    pub oem: u32,
    /// Fixed `--dpi`. When unset, the raster's own resolution is passed.
    pub dpi: Option<u32>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".into(),
            sparse_psm: SPARSE_PSM,
            dense_psm: DENSE_PSM,
            oem: 3,
            dpi: None,
        }
    }
}

impl TesseractConfig {
    /// Defaults overlaid with the `[ocr]` table's engine settings.
    pub fn from_file(ocr: Option<&OcrConfig>) -> Self {
        let mut config = Self::default();
        let Some(ocr) = ocr else {
            return config;
        };
        if let Some(path) = &ocr.tesseract_path {
            config.binary = PathBuf::from(path);
        }
        if let Some(language) = &ocr.language {
            config.language = language.clone();
        }
        if let Some(dpi) = ocr.dpi {
            config.dpi = Some(dpi);
        }
        config
    }
}

pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn psm(&self, pass: OcrPass) -> u32 {
        match pass {
            OcrPass::Sparse => self.config.sparse_psm,
            OcrPass::Dense => self.config.dense_psm,
        }
    }

    /// PDF user space is 72 units per inch, so a raster at `scale` is `72 * scale` dpi.
    fn dpi(&self, image: &PageImage) -> u32 {
        self.config
            .dpi
            .unwrap_or_else(|| (72.0 * image.scale).round() as u32)
    }

    fn command(&self, image: &PageImage, pass: OcrPass) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(&image.path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--oem")
            .arg(self.config.oem.to_string())
            .arg("--psm")
            .arg(self.psm(pass).to_string())
            .arg("--dpi")
            .arg(self.dpi(image).to_string())
            .arg("tsv");
        cmd
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new(TesseractConfig::default())
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        match Command::new(&self.config.binary).arg("--version").output() {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!(binary = %self.config.binary.display(), error = %e, "tesseract not runnable");
                false
            }
        }
    }

    fn recognize(&self, image: &PageImage, pass: OcrPass) -> Result<Vec<Word>, OcrError> {
        let output = self.command(image, pass).output().map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => OcrError::Unavailable(format!(
                "{}: {}",
                self.config.binary.display(),
                e
            )),
            _ => OcrError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let words = parse_words(&stdout);
        tracing::debug!(
            path = %image.path.display(),
            %pass,
            psm = self.psm(pass),
            words = words.len(),
            "tesseract pass complete"
        );
        Ok(words)
    }
}
