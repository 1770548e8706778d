use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Hardware tier a model is chosen for. Selection is explicit; hardware detection only
/// informs the user.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ModelProfile {
    #[default]
    #[value(name = "low-end", alias = "low")]
    LowEnd,
    #[value(name = "medium-end", alias = "medium")]
    MediumEnd,
    #[value(name = "high-end", alias = "high")]
    HighEnd,
}

impl ModelProfile {
    pub const ALL: [ModelProfile; 3] = [
        ModelProfile::LowEnd,
        ModelProfile::MediumEnd,
        ModelProfile::HighEnd,
    ];

    /// Weight file name for this tier.
    pub fn file_name(self) -> &'static str {
        match self {
            ModelProfile::LowEnd => "yolov8n.onnx",
            ModelProfile::MediumEnd => "yolov8m.onnx",
            ModelProfile::HighEnd => "yolov8x.onnx",
        }
    }

    /// Button text.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelProfile::LowEnd => "Low-End",
            ModelProfile::MediumEnd => "Medium-End",
            ModelProfile::HighEnd => "High-End",
        }
    }

    /// Weight location under `model_dir`.
    pub fn weights_path(self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.file_name())
    }
}

impl std::fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for ModelProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "low-end" | "lowend" => Ok(ModelProfile::LowEnd),
            "medium" | "medium-end" | "mediumend" => Ok(ModelProfile::MediumEnd),
            "high" | "high-end" | "highend" => Ok(ModelProfile::HighEnd),
            other => Err(anyhow!(
                "unknown model profile '{}' (expected low-end, medium-end or high-end)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_map_to_yolov8_weights() {
        let dir = Path::new("models");
        assert_eq!(
            ModelProfile::LowEnd.weights_path(dir),
            PathBuf::from("models/yolov8n.onnx")
        );
        assert_eq!(ModelProfile::MediumEnd.file_name(), "yolov8m.onnx");
        assert_eq!(ModelProfile::HighEnd.file_name(), "yolov8x.onnx");
    }

    #[test]
    fn parse_accepts_short_and_long_names() -> Result<()> {
        assert_eq!("Low".parse::<ModelProfile>()?, ModelProfile::LowEnd);
        assert_eq!("medium-end".parse::<ModelProfile>()?, ModelProfile::MediumEnd);
        assert!("ultra".parse::<ModelProfile>().is_err());
        Ok(())
    }
}
