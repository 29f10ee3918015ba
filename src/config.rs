use crate::engine::DEFAULT_IOU_THRESHOLD;
use crate::error::{Result, VoteError};
use crate::taxonomy::Label;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "BOXVOTE_CONFIG";

static MODEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid model name regex"));

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VoteConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    pub iou_threshold: f64,
    pub allowed_classes: BTreeSet<u32>,
}

/// Participating models; the order decides clustering scan order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// `<detections>/<model>/<video>/<stem>.txt`
    pub detections: PathBuf,
    /// `<output>/<video>/<stem>.txt`
    pub output: PathBuf,
    pub frames: PathBuf,
    pub golden_set: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for per-image fusion, 0 = one per core
    pub jobs: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            allowed_classes: Label::ALL.iter().map(|l| l.id()).collect(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            names: vec!["yolov5s".to_string(), "yolov8n".to_string()],
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            detections: PathBuf::from("external_data/raw_detections"),
            output: PathBuf::from("external_data/ensemble_output"),
            frames: PathBuf::from("external_data/frames"),
            golden_set: PathBuf::from("external_data/golden_set"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("iou_threshold must be in (0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("allowed_classes is empty")]
    EmptyClassSet,
    #[error("class id {0} is not part of the label taxonomy (0-4)")]
    UnknownClass(u32),
    #[error("no models configured")]
    NoModels,
    #[error("model '{0}' is listed more than once")]
    DuplicateModel(String),
    #[error("model name '{0}' is not a valid directory name")]
    InvalidModelName(String),
}

impl VoteConfig {
    /// Load the effective configuration.
    ///
    /// `$BOXVOTE_CONFIG` wins over the per-user config file; a missing
    /// per-user file falls back to defaults, a missing explicit file is an
    /// error.
    pub fn load() -> Result<Self> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from(Path::new(&explicit));
        }
        if let Some(config_path) = Self::config_file_path()
            && config_path.is_file()
        {
            return Self::load_from(&config_path);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VoteError::io(path, e))?;
        toml::from_str(&content).map_err(|source| VoteError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| VoteError::io(parent, e))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| VoteError::io(path, e))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn config_file_path() -> Option<PathBuf> {
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("boxvote");
            path
        })
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let threshold = self.fusion.iou_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }

        if self.fusion.allowed_classes.is_empty() {
            return Err(ConfigError::EmptyClassSet);
        }
        if let Some(&unknown) = self
            .fusion
            .allowed_classes
            .iter()
            .find(|id| Label::from_id(**id).is_none())
        {
            return Err(ConfigError::UnknownClass(unknown));
        }

        if self.models.names.is_empty() {
            return Err(ConfigError::NoModels);
        }
        let mut seen = HashSet::new();
        for name in &self.models.names {
            if !MODEL_NAME.is_match(name) {
                return Err(ConfigError::InvalidModelName(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateModel(name.clone()));
            }
        }

        Ok(())
    }
}
