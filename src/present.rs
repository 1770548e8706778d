//! Handoff from the session worker to whatever displays results.
//!
//! The worker never touches UI state directly. It reports through a [`Presenter`]:
//! - [`ChannelPresenter`] passes messages to a render loop on another thread. Frames
//!   go through a bounded channel and are dropped when the renderer lags; status and
//!   finish events go through a separate queue and are never dropped.
//! - [`LogPresenter`] writes status to the log, for the terminal front-end.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::RgbImage;

use crate::controller::SessionReport;

/// Receives per-frame results and lifecycle notices from a running session.
pub trait Presenter: Send {
    /// An annotated frame and its status line. May be dropped by the implementation.
    fn frame(&mut self, frame_index: u64, image: &RgbImage, status: &str);

    /// A status message that must reach the user.
    fn status(&mut self, message: &str);

    /// The session ended and all of its resources were released.
    fn finished(&mut self, report: &SessionReport);
}

/// Latest rendered frame.
#[derive(Clone, Debug)]
pub struct FrameUpdate {
    pub frame_index: u64,
    pub image: RgbImage,
    pub status: String,
}

#[derive(Clone, Debug)]
pub enum PresentationEvent {
    Status(String),
    Finished(SessionReport),
}

/// Render-loop side of a [`ChannelPresenter`].
#[derive(Clone, Debug)]
pub struct PresentationReceiver {
    pub frames: Receiver<FrameUpdate>,
    pub events: Receiver<PresentationEvent>,
}

impl PresentationReceiver {
    /// Most recent frame waiting in the channel, discarding older ones.
    pub fn latest_frame(&self) -> Option<FrameUpdate> {
        self.frames.try_iter().last()
    }

    /// All pending status and finish events, oldest first.
    pub fn pending_events(&self) -> Vec<PresentationEvent> {
        self.events.try_iter().collect()
    }
}

pub struct ChannelPresenter {
    frames: Sender<FrameUpdate>,
    events: Sender<PresentationEvent>,
    dropped_frames: u64,
}

impl ChannelPresenter {
    /// A presenter whose frame channel holds at most `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, PresentationReceiver) {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(capacity.max(1));
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        (
            Self {
                frames: frame_tx,
                events: event_tx,
                dropped_frames: 0,
            },
            PresentationReceiver {
                frames: frame_rx,
                events: event_rx,
            },
        )
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    fn send_event(&self, event: PresentationEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Presenter: receiver gone, dropping event");
        }
    }
}

impl Presenter for ChannelPresenter {
    fn frame(&mut self, frame_index: u64, image: &RgbImage, status: &str) {
        if self.frames.is_full() {
            self.dropped_frames += 1;
            return;
        }
        let update = FrameUpdate {
            frame_index,
            image: image.clone(),
            status: status.to_string(),
        };
        match self.frames.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped_frames += 1,
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn status(&mut self, message: &str) {
        self.send_event(PresentationEvent::Status(message.to_string()));
    }

    fn finished(&mut self, report: &SessionReport) {
        if self.dropped_frames > 0 {
            log::debug!(
                "Presenter: renderer skipped {} frames",
                self.dropped_frames
            );
        }
        self.send_event(PresentationEvent::Finished(report.clone()));
    }
}

/// Presenter for headless runs: status goes to the log, frames are not shown.
#[derive(Debug, Default)]
pub struct LogPresenter {
    frames_seen: u64,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Presenter for LogPresenter {
    fn frame(&mut self, frame_index: u64, _image: &RgbImage, status: &str) {
        self.frames_seen += 1;
        log::debug!("frame {}: {}", frame_index, status);
    }

    fn status(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn finished(&mut self, report: &SessionReport) {
        log::info!(
            "{} ({} frames processed)",
            report.status_text(),
            report.frames_processed
        );
    }
}
