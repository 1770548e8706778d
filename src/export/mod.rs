//! Export sinks.
//!
//! - `VideoSink`: annotated frames to `.y4m` (built in) or `.mp4` (feature: export-ffmpeg)
//! - `LogSink`: per-frame summary lines, written in one batch on close
//!
//! File names are stamped once per session: `{prefix}_{YYYYMMDD_HHMMSS}{ext}`.

mod log;
mod naming;
mod video;
#[cfg(feature = "export-ffmpeg")]
mod video_ffmpeg;

pub use self::log::LogSink;
pub use naming::{
    timestamped_filename, ExportPaths, DEFAULT_VIDEO_EXTENSION, LOG_EXTENSION, LOG_PREFIX,
    VIDEO_PREFIX,
};
pub use video::VideoSink;
