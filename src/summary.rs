//! Per-frame summaries.
//!
//! One `FrameSummary` is produced for every processed frame. It renders the status
//! line shown while running and the line appended to the text log.

use std::time::Instant;

use chrono::{DateTime, Local};

use crate::detect::Detection;

/// Instantaneous frame rate from the wall-clock delta between two consecutive frame
/// completions. The first delta is measured from the moment the meter was created.
#[derive(Clone, Debug)]
pub struct FpsMeter {
    previous: Instant,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self { previous: start }
    }

    /// Record a frame completion at `now` and return the instantaneous rate.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.previous).as_secs_f64();
        self.previous = now;
        if elapsed > 0.0 {
            1.0 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub timestamp: DateTime<Local>,
    pub fps: f64,
    /// `label (0.92)` strings, in detector order.
    pub detections: Vec<String>,
    /// Model that processed the frame.
    pub model: String,
}

impl FrameSummary {
    pub fn new(
        frame_index: u64,
        timestamp: DateTime<Local>,
        fps: f64,
        detections: &[Detection],
        model: impl Into<String>,
    ) -> Self {
        Self {
            frame_index,
            timestamp,
            fps,
            detections: detections.iter().map(Detection::summary_label).collect(),
            model: model.into(),
        }
    }

    /// `FPS: 12.34 | Detected: person (0.91), car (0.55)` or `... | Detected: None`.
    pub fn status_text(&self) -> String {
        let detected = if self.detections.is_empty() {
            "None".to_string()
        } else {
            self.detections.join(", ")
        };
        format!("FPS: {:.2} | Detected: {}", self.fps, detected)
    }

    /// `[HH:MM:SS] ` followed by the status text.
    pub fn log_line(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.status_text())
    }
}
