use std::time::Duration;

use anyhow::{anyhow, Result};
use url::Url;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Stub backend for tests and demos.
///
/// Reports the bounding box of all pure-white pixels as a single detection, which
/// matches the moving square drawn by synthetic `stub://` sources. Frames without
/// white pixels produce no detections.
///
/// Weight locations look like `stub://<host>/<file>?label=L&confidence=C&fail_at=K&delay_ms=D`;
/// every parameter is optional.
pub struct StubBackend {
    name: String,
    label: String,
    confidence: f32,
    fail_at: Option<u64>,
    delay: Duration,
}

impl StubBackend {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let label = label.into();
        Self {
            name: format!("stub:{}", label),
            label,
            confidence,
            fail_at: None,
            delay: Duration::ZERO,
        }
    }

    /// Fail inference on the frame with this index.
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Sleep this long inside every inference.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        if url.scheme() != "stub" {
            return Err(anyhow!("stub weights use the stub:// scheme"));
        }
        let mut backend = Self::new("person", 0.9);
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "label" => backend.label = value.to_string(),
                "confidence" => backend.confidence = parse_param(&key, &value)?,
                "fail_at" => backend.fail_at = Some(parse_param(&key, &value)?),
                "delay_ms" => backend.delay = Duration::from_millis(parse_param(&key, &value)?),
                other => log::warn!("Detector: ignoring unknown stub parameter '{}'", other),
            }
        }
        if !(0.0..=1.0).contains(&backend.confidence) {
            return Err(anyhow!("stub confidence must be within [0, 1]"));
        }
        let file = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
        backend.name = match file {
            Some(file) => format!("stub:{}", file),
            None => format!("stub:{}", backend.label),
        };
        Ok(backend)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid value '{}' for stub parameter '{}'", value, key))
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_at == Some(frame.index) {
            return Err(anyhow!("stub inference failure at frame {}", frame.index));
        }

        let (width, height) = frame.size();
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0u32, 0u32);
        let mut found = false;
        for (x, y, pixel) in frame.image.enumerate_pixels() {
            if pixel.0 == [255, 255, 255] {
                found = true;
                min = (min.0.min(x), min.1.min(y));
                max = (max.0.max(x), max.1.max(y));
            }
        }
        if !found {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min.0 as f32 / width as f32,
            min.1 as f32 / height as f32,
            (max.0 - min.0 + 1) as f32 / width as f32,
            (max.1 - min.1 + 1) as f32 / height as f32,
        );
        Ok(vec![Detection::new(self.label.clone(), self.confidence, bbox)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with_square(index: u64) -> Frame {
        let mut image = RgbImage::from_pixel(20, 10, Rgb([10, 10, 10]));
        for y in 2..6 {
            for x in 4..8 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        Frame::new(image, index)
    }

    #[test]
    fn finds_white_square() -> Result<()> {
        let mut backend = StubBackend::new("car", 0.75);
        let detections = backend.infer(&frame_with_square(0))?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "car");
        assert_eq!(detections[0].bbox, BoundingBox::new(0.2, 0.2, 0.2, 0.4));
        Ok(())
    }

    #[test]
    fn dark_frame_has_no_detections() -> Result<()> {
        let mut backend = StubBackend::new("car", 0.75);
        let frame = Frame::new(RgbImage::new(8, 8), 0);
        assert!(backend.infer(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn url_parameters_configure_backend() -> Result<()> {
        let url = Url::parse("stub://models/yolov8n.onnx?label=dog&confidence=0.5&fail_at=1")?;
        let mut backend = StubBackend::from_url(&url)?;
        assert_eq!(backend.name(), "stub:yolov8n.onnx");
        assert_eq!(backend.infer(&frame_with_square(0))?[0].summary_label(), "dog (0.50)");
        assert!(backend.infer(&frame_with_square(1)).is_err());
        Ok(())
    }
}
