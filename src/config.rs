use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::ModelProfile;

const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_OUTPUT_DIR: &str = ".";
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AppConfigFile {
    model_dir: Option<PathBuf>,
    profile: Option<ModelProfile>,
    export: Option<ExportConfigFile>,
    detector: Option<DetectorConfigFile>,
    presentation: Option<PresentationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ExportConfigFile {
    output_dir: Option<PathBuf>,
    video: Option<bool>,
    log: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    confidence: Option<f32>,
    iou: Option<f32>,
    persist_tracks: Option<bool>,
    label_font: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PresentationConfigFile {
    channel_capacity: Option<usize>,
}

/// Application settings shared by the terminal and GUI front-ends.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Directory holding `yolov8{n,m,x}.onnx`, or a `stub://` location.
    pub model_dir: PathBuf,
    /// Model loaded at startup, if any.
    pub profile: Option<ModelProfile>,
    pub output_dir: PathBuf,
    pub export_video: bool,
    pub export_log: bool,
    pub confidence: f32,
    pub iou: f32,
    pub persist_tracks: bool,
    /// TrueType font for box labels. Without one only boxes are drawn.
    pub label_font: Option<PathBuf>,
    /// Capacity of the frame channel between the worker and the renderer.
    pub channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            profile: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            export_video: true,
            export_log: true,
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
            persist_tracks: true,
            label_font: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Defaults, then the file named by `TRACKVIEW_CONFIG`, then `TRACKVIEW_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRACKVIEW_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`AppConfig::load`] with an explicit config file.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => read_config_file(path)?,
            None => AppConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let defaults = Self::default();
        let export = file.export.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let presentation = file.presentation.unwrap_or_default();
        Self {
            model_dir: file.model_dir.unwrap_or(defaults.model_dir),
            profile: file.profile,
            output_dir: export.output_dir.unwrap_or(defaults.output_dir),
            export_video: export.video.unwrap_or(defaults.export_video),
            export_log: export.log.unwrap_or(defaults.export_log),
            confidence: detector.confidence.unwrap_or(defaults.confidence),
            iou: detector.iou.unwrap_or(defaults.iou),
            persist_tracks: detector.persist_tracks.unwrap_or(defaults.persist_tracks),
            label_font: detector.label_font,
            channel_capacity: presentation
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_value("TRACKVIEW_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("TRACKVIEW_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(value) = env_value("TRACKVIEW_EXPORT_VIDEO") {
            self.export_video = parse_bool("TRACKVIEW_EXPORT_VIDEO", &value)?;
        }
        if let Some(value) = env_value("TRACKVIEW_EXPORT_LOG") {
            self.export_log = parse_bool("TRACKVIEW_EXPORT_LOG", &value)?;
        }
        if let Some(value) = env_value("TRACKVIEW_CONFIDENCE") {
            self.confidence = value
                .parse()
                .map_err(|_| anyhow!("TRACKVIEW_CONFIDENCE must be a number"))?;
        }
        if let Some(font) = env_value("TRACKVIEW_LABEL_FONT") {
            self.label_font = Some(PathBuf::from(font));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            return Err(anyhow!("confidence must be within (0, 1]"));
        }
        if !(self.iou > 0.0 && self.iou <= 1.0) {
            return Err(anyhow!("iou must be within (0, 1]"));
        }
        if self.channel_capacity == 0 {
            return Err(anyhow!("channel_capacity must be at least 1"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (true/false)", key)),
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
