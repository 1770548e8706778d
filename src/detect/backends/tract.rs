#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Side length of the square YOLOv8 export input.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Thresholds applied while decoding model output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TractConfig {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for TractConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Frames are resized (without letterboxing) to the square model input. The output
/// tensor is `[1, 4 + C, N]`: centre/size boxes in input pixels followed by one score
/// per class. Boxes below the confidence threshold are dropped and the rest go through
/// class-wise non-maximum suppression.
pub struct TractBackend {
    name: String,
    model: TypedRunnableModel<TypedModel>,
    config: TractConfig,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, config: TractConfig) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = config.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let name = model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        Ok(Self {
            name,
            model,
            config,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.config.input_size;
        let resized = image::imageops::resize(&frame.image, side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not [1, 4 + C, N]")?;
        let (rows, anchors) = (view.shape()[1], view.shape()[2]);
        if rows <= 4 {
            return Err(anyhow!("model output has no class scores"));
        }

        let side = self.config.input_size as f32;
        let mut candidates = Vec::new();
        for n in 0..anchors {
            let (class_id, score) = (4..rows)
                .map(|row| (row - 4, view[[0, row, n]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if score < self.config.confidence_threshold {
                continue;
            }
            let (cx, cy) = (view[[0, 0, n]], view[[0, 1, n]]);
            let (w, h) = (view[[0, 2, n]], view[[0, 3, n]]);
            let bbox = BoundingBox::new((cx - w / 2.0) / side, (cy - h / 2.0) / side, w / side, h / side);
            candidates.push((class_id, Detection::new(class_label(class_id), score, bbox)));
        }

        Ok(non_max_suppression(candidates, self.config.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.config.input_size as usize;
        let input = Tensor::zero::<f32>(&[1, 3, side, side]).context("allocate warm-up input")?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}

/// Class-wise greedy NMS, highest confidence first.
fn non_max_suppression(mut candidates: Vec<(usize, Detection)>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));
    let mut kept: Vec<(usize, Detection)> = Vec::new();
    for (class_id, det) in candidates {
        let suppressed = kept
            .iter()
            .any(|(kept_class, kept_det)| *kept_class == class_id && kept_det.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push((class_id, det));
        }
    }
    kept.into_iter().map(|(_, det)| det).collect()
}

fn class_label(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|label| label.to_string())
        .unwrap_or_else(|| format!("class{}", class_id))
}

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(class_id: usize, confidence: f32, x: f32) -> (usize, Detection) {
        (
            class_id,
            Detection::new(class_label(class_id), confidence, BoundingBox::new(x, 0.1, 0.2, 0.2)),
        )
    }

    #[test]
    fn nms_keeps_best_overlapping_box_per_class() {
        let kept = non_max_suppression(
            vec![
                candidate(0, 0.6, 0.11),
                candidate(0, 0.9, 0.10),
                candidate(2, 0.5, 0.10),
                candidate(0, 0.4, 0.70),
            ],
            0.45,
        );
        let labels: Vec<String> = kept.iter().map(Detection::summary_label).collect();
        assert_eq!(labels, vec!["person (0.90)", "car (0.50)", "person (0.40)"]);
    }

    #[test]
    fn unknown_class_ids_get_generic_labels() {
        assert_eq!(class_label(0), "person");
        assert_eq!(class_label(80), "class80");
    }
}
