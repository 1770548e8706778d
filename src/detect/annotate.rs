use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::result::Detection;

const LABEL_HEIGHT: f32 = 16.0;

/// Draws detection boxes and, when a font is configured, their labels.
#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Annotator {
    /// Boxes only.
    pub fn new() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_HEIGHT),
        }
    }

    /// Boxes plus labels rendered with the TrueType font at `path`.
    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read label font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("parse label font {}", path.display()))?;
        Ok(Self {
            font: Some(font),
            scale: PxScale::from(LABEL_HEIGHT),
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Copy of `image` with every detection drawn on it.
    pub fn draw(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        let (width, height) = canvas.dimensions();
        for detection in detections {
            let Some((x, y, w, h)) = detection.bbox.to_pixels(width, height) else {
                continue;
            };
            let color = class_color(&detection.label);
            draw_hollow_rect_mut(&mut canvas, Rect::at(x, y).of_size(w, h), color);
            if w > 2 && h > 2 {
                let inner = Rect::at(x + 1, y + 1).of_size(w - 2, h - 2);
                draw_hollow_rect_mut(&mut canvas, inner, color);
            }

            if let Some(font) = &self.font {
                let text_y = (y - LABEL_HEIGHT as i32 - 2).max(0);
                draw_text_mut(
                    &mut canvas,
                    color,
                    x,
                    text_y,
                    self.scale,
                    font,
                    &detection.annotation_label(),
                );
            }
        }
        canvas
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable per-label colour, spread around the hue wheel.
pub fn class_color(label: &str) -> Rgb<u8> {
    let hash = label
        .bytes()
        .fold(2166136261u32, |acc, b| (acc ^ b as u32).wrapping_mul(16777619));
    let hue = (hash % 360) as f32;
    hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    Rgb([
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn draws_box_outline_without_touching_input() {
        let image = RgbImage::new(20, 20);
        let det = Detection::new("person", 0.9, BoundingBox::new(0.25, 0.25, 0.5, 0.5));
        let annotated = Annotator::new().draw(&image, &[det]);
        let color = class_color("person");
        assert_eq!(*annotated.get_pixel(5, 5), color);
        assert_eq!(*annotated.get_pixel(10, 10), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn colors_are_stable_per_label() {
        assert_eq!(class_color("car"), class_color("car"));
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(Annotator::with_font_file(Path::new("no/such/font.ttf")).is_err());
    }
}
