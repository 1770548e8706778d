use anyhow::Result;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::PipelineError;

/// Container extensions accepted for file input.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// What a session reads frames from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSelector {
    /// A video container on the local filesystem.
    File(PathBuf),
    /// A live camera; index 0 is the default device.
    Device(u32),
    /// A synthetic `stub://` source.
    Synthetic(Url),
}

impl SourceSelector {
    /// The default camera.
    pub fn webcam() -> Self {
        SourceSelector::Device(0)
    }

    /// Interpret user input: `stub://...` is synthetic, a bare integer is a device
    /// index, anything else is a file path.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PipelineError::SourceUnavailable("no source given".to_string()).into());
        }
        if input.starts_with("stub://") {
            let url = Url::parse(input).map_err(|e| {
                PipelineError::SourceUnavailable(format!("invalid stub url '{}': {}", input, e))
            })?;
            return Ok(SourceSelector::Synthetic(url));
        }
        if let Ok(index) = input.parse::<u32>() {
            return Ok(SourceSelector::Device(index));
        }
        Ok(SourceSelector::File(PathBuf::from(input)))
    }

    /// Check the preconditions that can be checked before opening.
    ///
    /// Files must exist and carry one of [`VIDEO_EXTENSIONS`].
    pub fn validate(&self) -> Result<()> {
        match self {
            SourceSelector::File(path) => validate_video_path(path),
            SourceSelector::Device(_) | SourceSelector::Synthetic(_) => Ok(()),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SourceSelector::Device(_))
    }
}

impl std::fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSelector::File(path) => write!(f, "{}", path.display()),
            SourceSelector::Device(index) => write!(f, "camera #{}", index),
            SourceSelector::Synthetic(url) => write!(f, "{}", url),
        }
    }
}

fn validate_video_path(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(PipelineError::SourceUnavailable(format!(
            "file not found: {}",
            path.display()
        ))
        .into());
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(PipelineError::SourceUnavailable(format!(
            "unsupported video container '{}' (expected one of: {})",
            path.display(),
            VIDEO_EXTENSIONS.join(", ")
        ))
        .into());
    }
    Ok(())
}
