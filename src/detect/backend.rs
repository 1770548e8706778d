use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend owns a loaded model and turns one frame into a list of detections.
/// It is driven by [`DetectorAdapter`](crate::detect::DetectorAdapter), which
/// serializes calls and handles swapping, tracking and annotation.
pub trait DetectorBackend: Send {
    /// Backend identifier, shown in status messages and logs.
    fn name(&self) -> &str;

    /// Run detection on a frame.
    ///
    /// Boxes are normalized to the frame's dimensions. The frame is read-only.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// True when the backend assigns its own track identities.
    fn assigns_track_ids(&self) -> bool {
        false
    }

    /// Optional warm-up hook, run once after loading and before installation.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
