use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub library: LibraryConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub action: ActionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Frame source selection: "command" (external camera CLI) or "http"
    /// (single-frame fetch from an IP camera endpoint).
    #[serde(default = "default_capture_mode")]
    pub mode: String,
    #[serde(default = "default_camera_command")]
    pub command: String,
    #[serde(default = "default_camera_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Directory where the command camera writes its temporary frame files.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// Directory holding the reference photos to match against.
    pub dir: String,
}

/// Normalization steps applied before OCR, composed in a fixed order:
/// orientation, grayscale, contrast, threshold, denoise.
#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default = "default_true")]
    pub correct_orientation: bool,
    #[serde(default)]
    pub grayscale: bool,
    /// Multiplicative contrast scale about the mean luminance; 1.0 = no-op.
    #[serde(default = "default_contrast_factor")]
    pub contrast_factor: f32,
    /// When set, pixels below the threshold map to 0 and the rest to 255.
    #[serde(default)]
    pub binarize_threshold: Option<u8>,
    /// Median filter radius; 0 disables.
    #[serde(default)]
    pub denoise_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            correct_orientation: true,
            grayscale: false,
            contrast_factor: default_contrast_factor(),
            binarize_threshold: None,
            denoise_radius: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_command")]
    pub command: String,
    #[serde(default = "default_ocr_lang")]
    pub lang: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            lang: default_ocr_lang(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// What to do with matches: "report", "display" or "delete".
    #[serde(default = "default_action_policy")]
    pub policy: String,
    /// Minimum count of non-whitespace characters the extracted text must
    /// have before any corpus scan happens. Guards the degenerate case where
    /// empty text is a substring of every photo's text.
    #[serde(default = "default_min_match_len")]
    pub min_match_len: usize,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            policy: default_action_policy(),
            min_match_len: default_min_match_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.interval_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "capture.interval_secs must be positive, got {}",
                self.capture.interval_secs
            )));
        }
        if self.preprocess.contrast_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "preprocess.contrast_factor must be >= 1.0, got {}",
                self.preprocess.contrast_factor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_capture_mode() -> String {
    "command".into()
}
fn default_camera_command() -> String {
    "termux-camera-photo".into()
}
fn default_camera_args() -> Vec<String> {
    vec!["-c".into(), "0".into()]
}
fn default_interval_secs() -> f64 {
    1.0
}
fn default_staging_dir() -> String {
    "captured_frames".into()
}
fn default_true() -> bool {
    true
}
fn default_contrast_factor() -> f32 {
    1.0
}
fn default_ocr_command() -> String {
    "tesseract".into()
}
fn default_ocr_lang() -> String {
    "eng".into()
}
fn default_action_policy() -> String {
    "report".into()
}
fn default_min_match_len() -> usize {
    1
}
fn default_log_level() -> String {
    "info".into()
}
