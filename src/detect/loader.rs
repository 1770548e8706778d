use std::path::Path;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
#[cfg(feature = "backend-tract")]
use crate::detect::backends::{TractBackend, TractConfig};

/// Builds a detector backend from a weight location.
pub trait ModelLoader: Send + Sync {
    fn load(&self, weights: &Path) -> Result<Box<dyn DetectorBackend>>;
}

/// True for `stub://` weight locations.
pub fn is_stub_location(weights: &Path) -> bool {
    weights
        .to_str()
        .is_some_and(|location| location.starts_with("stub://"))
}

/// Loads `stub://` weights into a [`StubBackend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StubLoader;

impl ModelLoader for StubLoader {
    fn load(&self, weights: &Path) -> Result<Box<dyn DetectorBackend>> {
        let location = weights
            .to_str()
            .ok_or_else(|| anyhow!("stub weight location is not UTF-8"))?;
        let url = Url::parse(location)
            .with_context(|| format!("invalid stub weight location '{}'", location))?;
        Ok(Box::new(StubBackend::from_url(&url)?))
    }
}

/// Loads YOLOv8 ONNX exports with tract.
#[cfg(feature = "backend-tract")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TractLoader {
    pub config: TractConfig,
}

#[cfg(feature = "backend-tract")]
impl ModelLoader for TractLoader {
    fn load(&self, weights: &Path) -> Result<Box<dyn DetectorBackend>> {
        if !weights.is_file() {
            return Err(anyhow!("weight file not found: {}", weights.display()));
        }
        Ok(Box::new(TractBackend::new(weights, self.config)?))
    }
}

/// Dispatches `stub://` locations to [`StubLoader`] and everything else to the
/// compiled-in ONNX loader.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultLoader {
    #[cfg(feature = "backend-tract")]
    pub tract: TractLoader,
}

impl DefaultLoader {
    pub fn with_thresholds(confidence: f32, iou: f32) -> Self {
        #[cfg(not(feature = "backend-tract"))]
        let _ = (confidence, iou);
        Self {
            #[cfg(feature = "backend-tract")]
            tract: TractLoader {
                config: TractConfig {
                    confidence_threshold: confidence,
                    iou_threshold: iou,
                    ..TractConfig::default()
                },
            },
        }
    }
}

impl ModelLoader for DefaultLoader {
    fn load(&self, weights: &Path) -> Result<Box<dyn DetectorBackend>> {
        if is_stub_location(weights) {
            return StubLoader.load(weights);
        }
        #[cfg(feature = "backend-tract")]
        {
            self.tract.load(weights)
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            Err(anyhow!(
                "loading {} requires the backend-tract feature",
                weights.display()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_locations_are_recognized() {
        assert!(is_stub_location(Path::new("stub://models/yolov8n.onnx")));
        assert!(!is_stub_location(Path::new("models/yolov8n.onnx")));
    }

    #[test]
    fn default_loader_builds_stub_backend() -> Result<()> {
        let backend = DefaultLoader::default().load(Path::new("stub://models/yolov8m.onnx"))?;
        assert_eq!(backend.name(), "stub:yolov8m.onnx");
        Ok(())
    }

    #[test]
    fn missing_weight_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("yolov8n.onnx");
        assert!(DefaultLoader::default().load(&missing).is_err());
    }
}
