//! Frame sources.
//!
//! This module provides the sources a session can pull frames from:
//! - Local video files (feature: ingest-ffmpeg)
//! - Live camera devices by index (feature: ingest-v4l2)
//! - Synthetic `stub://` sources (always available, used by tests and demos)
//!
//! All sources produce RGB24 `Frame`s in order. A source signals end-of-stream with
//! `Ok(None)`; errors are reserved for frames that could not be decoded.

#[cfg(feature = "ingest-ffmpeg")]
mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod selector;
mod source;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use selector::{SourceSelector, VIDEO_EXTENSIONS};
pub use source::{FrameSource, SourceInfo, DEFAULT_FRAME_RATE};
pub use synthetic::SyntheticConfig;
