use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Prefix of exported video files.
pub const VIDEO_PREFIX: &str = "video";
/// Prefix of exported log files.
pub const LOG_PREFIX: &str = "log";
/// Extension of exported log files.
pub const LOG_EXTENSION: &str = ".txt";

/// Extension of exported video files: MP4 when the FFmpeg encoder is compiled in,
/// uncompressed Y4M otherwise.
pub const DEFAULT_VIDEO_EXTENSION: &str = if cfg!(feature = "export-ffmpeg") {
    ".mp4"
} else {
    ".y4m"
};

/// `{prefix}_{YYYYMMDD_HHMMSS}{ext}`.
pub fn timestamped_filename(prefix: &str, extension: &str, at: &DateTime<Local>) -> String {
    format!("{}_{}{}", prefix, at.format("%Y%m%d_%H%M%S"), extension)
}

/// Output paths for one session, stamped once when the session starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportPaths {
    pub video: PathBuf,
    pub log: PathBuf,
}

impl ExportPaths {
    pub fn new(output_dir: &Path, started_at: &DateTime<Local>) -> Self {
        Self {
            video: output_dir.join(timestamped_filename(
                VIDEO_PREFIX,
                DEFAULT_VIDEO_EXTENSION,
                started_at,
            )),
            log: output_dir.join(timestamped_filename(LOG_PREFIX, LOG_EXTENSION, started_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filenames_embed_second_resolution_timestamp() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .expect("unambiguous local time");
        assert_eq!(
            timestamped_filename(LOG_PREFIX, LOG_EXTENSION, &at),
            "log_20240309_070501.txt"
        );
        let paths = ExportPaths::new(Path::new("out"), &at);
        assert_eq!(paths.log, PathBuf::from("out/log_20240309_070501.txt"));
        assert!(paths
            .video
            .to_string_lossy()
            .starts_with("out/video_20240309_070501."));
    }
}
