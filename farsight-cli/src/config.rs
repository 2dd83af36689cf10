//! farsight configuration: file, environment, then command line

use farsight_core::{AlertConfig, CalibrationTarget, DEFAULT_POSITION_MARGIN_PX};
use farsight_eye::models::manager::YOLO_V8N_NAME;
use farsight_eye::{OutputConfig, VisionConfig};
use farsight_spk::SpeechConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Whole-program configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FarsightConfig {
    /// Image / video file or directory, webcam index, stream URL or `.txt` list
    pub source: String,
    pub vision: VisionConfig,
    pub output: OutputConfig,
    pub ranging: RangingConfig,
    pub alert: AlertConfig,
    pub speech: SpeechConfig,
    pub logging: LoggingConfig,
}

/// Distance estimation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingConfig {
    /// Half-width of the "ahead of you" band around the frame center
    pub position_margin_px: f32,
    /// Reference photographs used to calibrate each class
    pub targets: Vec<CalibrationTarget>,
    /// Saved calibration; used instead of the reference photographs when present
    pub calibration_file: Option<PathBuf>,
    /// Model used to measure the reference photographs (the run model when `None`)
    pub calibration_weights: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for FarsightConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            vision: VisionConfig::default(),
            output: OutputConfig::default(),
            ranging: RangingConfig::default(),
            alert: AlertConfig::default(),
            speech: SpeechConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            position_margin_px: DEFAULT_POSITION_MARGIN_PX,
            targets: CalibrationTarget::defaults(),
            calibration_file: None,
            calibration_weights: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RangingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.position_margin_px.is_finite() && self.position_margin_px >= 0.0) {
            return Err("Position margin must be a non-negative number of pixels".to_string());
        }
        for target in &self.targets {
            target.validate()?;
        }
        if self
            .calibration_weights
            .as_ref()
            .is_some_and(|w| w.as_os_str().is_empty())
        {
            return Err("Calibration weights path cannot be empty".to_string());
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(format!("Unknown log level '{}'", other)),
        }
    }
}

impl FarsightConfig {
    /// Load from a JSON, TOML or YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Parse JSON, then TOML, then YAML
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<FarsightConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<FarsightConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<FarsightConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::Parse("Unknown format".to_string()))
    }

    /// Apply `FARSIGHT_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(source) = lookup("FARSIGHT_SOURCE") {
            self.source = source;
        }

        if let Some(weights) = lookup("FARSIGHT_WEIGHTS") {
            self.vision.weights = PathBuf::from(weights);
        }

        if let Some(device) = lookup("FARSIGHT_DEVICE") {
            self.vision.device = device;
        }

        if let Some(conf) = lookup("FARSIGHT_CONF_THRES").and_then(|v| v.parse().ok()) {
            self.vision.conf_thres = conf;
        }

        if let Some(dir) = lookup("FARSIGHT_MODEL_DIR") {
            let dir = PathBuf::from(dir);
            // Weights still at the downloaded default follow the model dir
            if self.vision.weights == self.vision.model_dir.join(YOLO_V8N_NAME) {
                self.vision.weights = dir.join(YOLO_V8N_NAME);
            }
            self.vision.model_dir = dir;
        }

        if let Some(file) = lookup("FARSIGHT_CALIBRATION") {
            self.ranging.calibration_file = Some(PathBuf::from(file));
        }

        if let Some(weights) = lookup("FARSIGHT_CALIBRATION_WEIGHTS") {
            self.ranging.calibration_weights = Some(PathBuf::from(weights));
        }

        if let Some(enabled) = lookup("FARSIGHT_SPEECH").and_then(|v| parse_bool(&v)) {
            self.speech.enabled = enabled;
        }

        if let Some(level) = lookup("FARSIGHT_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Validation("Source cannot be empty".to_string()));
        }
        self.vision.validate().map_err(ConfigError::Validation)?;
        self.output.validate().map_err(ConfigError::Validation)?;
        self.ranging.validate().map_err(ConfigError::Validation)?;
        self.alert.validate().map_err(ConfigError::Validation)?;
        self.speech.validate().map_err(ConfigError::Validation)?;
        self.logging.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
