use anyhow::Result;

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::selector::SourceSelector;
use super::synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2DeviceSource;
use crate::error::PipelineError;
use crate::frame::Frame;

/// Frame rate assumed when a container does not report one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Playback characteristics copied to the video sink.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

/// An open frame source.
///
/// `close` releases the underlying handle and is idempotent; after it, `next_frame`
/// reports end-of-stream.
pub struct FrameSource {
    selector: SourceSelector,
    backend: Option<SourceBackend>,
    info: SourceInfo,
    frames_read: u64,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2DeviceSource),
}

impl FrameSource {
    /// Open the selected source. Every failure is reported as `SourceUnavailable`.
    pub fn open(selector: &SourceSelector) -> Result<Self> {
        selector.validate()?;
        let backend = open_backend(selector).map_err(|err| {
            let message = format!("{}: {:#}", selector, err);
            anyhow::Error::from(PipelineError::SourceUnavailable(message))
        })?;
        let info = backend_info(&backend);
        log::info!(
            "FrameSource: opened {} ({}x{} @ {:.2} fps)",
            selector,
            info.width,
            info.height,
            info.frame_rate
        );
        Ok(Self {
            selector: selector.clone(),
            backend: Some(backend),
            info,
            frames_read: 0,
        })
    }

    /// Pull the next frame. `Ok(None)` is end-of-stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(None);
        };
        let frame = match backend {
            SourceBackend::Synthetic(source) => source.next_frame()?,
            #[cfg(feature = "ingest-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.next_frame()?,
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::Device(source) => source.next_frame()?,
        };
        if frame.is_some() {
            self.frames_read += 1;
        } else {
            log::info!(
                "FrameSource: end of stream on {} after {} frames",
                self.selector,
                self.frames_read
            );
        }
        Ok(frame)
    }

    /// Release the underlying handle.
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            log::info!("FrameSource: released {}", self.selector);
        }
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn info(&self) -> SourceInfo {
        self.info
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    pub fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn selector(&self) -> &SourceSelector {
        &self.selector
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_backend(selector: &SourceSelector) -> Result<SourceBackend> {
    match selector {
        SourceSelector::Synthetic(url) => Ok(SourceBackend::Synthetic(SyntheticSource::new(
            SyntheticConfig::from_url(url)?,
        ))),
        #[cfg(feature = "ingest-ffmpeg")]
        SourceSelector::File(path) => Ok(SourceBackend::Ffmpeg(FfmpegFileSource::open(path)?)),
        #[cfg(not(feature = "ingest-ffmpeg"))]
        SourceSelector::File(_) => {
            anyhow::bail!("decoding video files requires the ingest-ffmpeg feature")
        }
        #[cfg(feature = "ingest-v4l2")]
        SourceSelector::Device(index) => {
            Ok(SourceBackend::Device(V4l2DeviceSource::open(*index)?))
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        SourceSelector::Device(_) => {
            anyhow::bail!("camera capture requires the ingest-v4l2 feature")
        }
    }
}

fn backend_info(backend: &SourceBackend) -> SourceInfo {
    let ((width, height), frame_rate) = match backend {
        SourceBackend::Synthetic(source) => (source.size(), source.frame_rate()),
        #[cfg(feature = "ingest-ffmpeg")]
        SourceBackend::Ffmpeg(source) => (source.size(), source.frame_rate()),
        #[cfg(feature = "ingest-v4l2")]
        SourceBackend::Device(source) => (source.size(), source.frame_rate()),
    };
    let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
        frame_rate
    } else {
        DEFAULT_FRAME_RATE
    };
    SourceInfo {
        width,
        height,
        frame_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(input: &str) -> SourceSelector {
        SourceSelector::parse(input).expect("stub selector")
    }

    #[test]
    fn open_reports_stub_geometry() -> Result<()> {
        let source = FrameSource::open(&stub("stub://cam?width=64&height=32&fps=15"))?;
        assert_eq!(source.frame_size(), (64, 32));
        assert_eq!(source.frame_rate(), 15.0);
        Ok(())
    }

    #[test]
    fn close_is_idempotent_and_ends_stream() -> Result<()> {
        let mut source = FrameSource::open(&stub("stub://cam?width=16&height=16"))?;
        assert!(source.next_frame()?.is_some());
        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.frames_read(), 1);
        Ok(())
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = FrameSource::open(&SourceSelector::File("does/not/exist.mp4".into()))
            .err()
            .expect("open must fail");
        let typed = err.downcast_ref::<PipelineError>().expect("typed error");
        assert_eq!(typed.code(), "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn invalid_stub_parameters_are_source_unavailable() {
        let err = FrameSource::open(&stub("stub://cam?width=abc"))
            .err()
            .expect("open must fail");
        let typed = err.downcast_ref::<PipelineError>().expect("typed error");
        assert_eq!(typed.code(), "SOURCE_UNAVAILABLE");
    }
}
