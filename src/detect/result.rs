/// Axis-aligned box in normalized 0..1 image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection over union; 0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.w).min(other.x + other.w);
        let bottom = (self.y + self.h).min(other.y + other.h);
        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Pixel rectangle `(x, y, w, h)` clipped to a `width` x `height` image.
    /// `None` when nothing of the box is visible.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
        let (fw, fh) = (width as f32, height as f32);
        let left = (self.x * fw).clamp(0.0, fw);
        let top = (self.y * fh).clamp(0.0, fh);
        let right = ((self.x + self.w) * fw).clamp(0.0, fw);
        let bottom = ((self.y + self.h) * fh).clamp(0.0, fh);
        let w = (right - left).round() as u32;
        let h = (bottom - top).round() as u32;
        if w == 0 || h == 0 {
            return None;
        }
        Some((left.round() as i32, top.round() as i32, w, h))
    }
}

/// One object reported by a detector for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Stable identity across frames, when tracking is enabled.
    pub track_id: Option<u64>,
    /// Used only for annotation.
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            track_id: None,
            bbox,
        }
    }

    /// `label (0.92)`, the form used in logs and the status line.
    pub fn summary_label(&self) -> String {
        format!("{} ({:.2})", self.label, self.confidence)
    }

    /// `label #7 0.92`, the form drawn next to the box.
    pub fn annotation_label(&self) -> String {
        match self.track_id {
            Some(id) => format!("{} #{} {:.2}", self.label, id, self.confidence),
            None => format!("{} {:.2}", self.label, self.confidence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.1, 0.1, 0.2, 0.2);
        let b = BoundingBox::new(0.6, 0.6, 0.2, 0.2);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn labels_render_two_decimals() {
        let mut det = Detection::new("person", 0.916, BoundingBox::default());
        assert_eq!(det.summary_label(), "person (0.92)");
        assert_eq!(det.annotation_label(), "person 0.92");
        det.track_id = Some(4);
        assert_eq!(det.annotation_label(), "person #4 0.92");
    }

    #[test]
    fn to_pixels_clips_to_image() {
        let bbox = BoundingBox::new(0.5, 0.5, 1.0, 1.0);
        assert_eq!(bbox.to_pixels(100, 50), Some((50, 25, 50, 25)));
        assert_eq!(BoundingBox::new(1.2, 0.0, 0.1, 0.1).to_pixels(100, 50), None);
    }
}
