use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;

#[cfg(feature = "export-ffmpeg")]
use super::video_ffmpeg::FfmpegVideoWriter;
use crate::error::PipelineError;

/// Annotated video output.
///
/// The container follows the file extension: `.y4m` is written directly as
/// uncompressed YUV 4:4:4; anything else goes through the FFmpeg encoder
/// (feature: export-ffmpeg). Every frame must match the size given to `open`.
pub struct VideoSink {
    path: PathBuf,
    frame_size: (u32, u32),
    backend: Option<VideoBackend>,
    frames_written: u64,
}

enum VideoBackend {
    Y4m(Y4mWriter),
    #[cfg(feature = "export-ffmpeg")]
    Ffmpeg(FfmpegVideoWriter),
}

impl VideoSink {
    /// Create (or truncate) `path` for frames of `frame_size` at `frame_rate`.
    pub fn open(path: &Path, frame_size: (u32, u32), frame_rate: f64) -> Result<Self> {
        let backend = open_backend(path, frame_size, frame_rate).map_err(|err| {
            anyhow::Error::from(PipelineError::SinkFailure(format!(
                "{}: {:#}",
                path.display(),
                err
            )))
        })?;
        log::info!(
            "VideoSink: writing {} ({}x{} @ {:.2} fps)",
            path.display(),
            frame_size.0,
            frame_size.1,
            frame_rate
        );
        Ok(Self {
            path: path.to_path_buf(),
            frame_size,
            backend: Some(backend),
            frames_written: 0,
        })
    }

    /// Append one frame. Fails with `FrameSizeMismatch` when its dimensions differ
    /// from the size the sink was opened with.
    pub fn write(&mut self, image: &RgbImage) -> Result<()> {
        let actual = image.dimensions();
        if actual != self.frame_size {
            return Err(PipelineError::FrameSizeMismatch {
                expected: self.frame_size,
                actual,
            }
            .into());
        }
        let Some(backend) = self.backend.as_mut() else {
            return Err(PipelineError::SinkFailure(format!(
                "{}: video sink is closed",
                self.path.display()
            ))
            .into());
        };
        let written = match backend {
            VideoBackend::Y4m(writer) => writer.write_frame(image),
            #[cfg(feature = "export-ffmpeg")]
            VideoBackend::Ffmpeg(writer) => writer.write_frame(image),
        };
        written.map_err(|err| {
            PipelineError::SinkFailure(format!("{}: {:#}", self.path.display(), err))
        })?;
        self.frames_written += 1;
        Ok(())
    }

    /// Finalize the container. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        let finished = match backend {
            VideoBackend::Y4m(writer) => writer.finish(),
            #[cfg(feature = "export-ffmpeg")]
            VideoBackend::Ffmpeg(writer) => writer.finish(),
        };
        finished.map_err(|err| {
            PipelineError::SinkFailure(format!("{}: {:#}", self.path.display(), err))
        })?;
        log::info!(
            "VideoSink: closed {} after {} frames",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("VideoSink: close on drop failed: {:#}", err);
        }
    }
}

fn open_backend(path: &Path, frame_size: (u32, u32), frame_rate: f64) -> Result<VideoBackend> {
    let (width, height) = frame_size;
    if width == 0 || height == 0 {
        anyhow::bail!("frame size {}x{} is empty", width, height);
    }
    let is_y4m = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("y4m"));
    if is_y4m {
        return Ok(VideoBackend::Y4m(Y4mWriter::create(path, frame_size, frame_rate)?));
    }
    #[cfg(feature = "export-ffmpeg")]
    {
        Ok(VideoBackend::Ffmpeg(FfmpegVideoWriter::open(
            path, frame_size, frame_rate,
        )?))
    }
    #[cfg(not(feature = "export-ffmpeg"))]
    {
        anyhow::bail!("encoding this container requires the export-ffmpeg feature; use .y4m")
    }
}

/// Frame rate as the `num:den` pair used in stream headers.
pub(crate) fn frame_rate_ratio(frame_rate: f64) -> (u32, u32) {
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return (30, 1);
    }
    if (frame_rate - frame_rate.round()).abs() < 1e-3 {
        return (frame_rate.round() as u32, 1);
    }
    ((frame_rate * 1000.0).round() as u32, 1000)
}

// ----------------------------------------------------------------------------
// YUV4MPEG2 writer
// ----------------------------------------------------------------------------

struct Y4mWriter {
    out: BufWriter<File>,
    plane: Vec<u8>,
}

impl Y4mWriter {
    fn create(path: &Path, (width, height): (u32, u32), frame_rate: f64) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let (num, den) = frame_rate_ratio(frame_rate);
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C444",
            width, height, num, den
        )
        .context("write y4m header")?;
        Ok(Self {
            out,
            plane: Vec::with_capacity(width as usize * height as usize * 3),
        })
    }

    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        let pixels = image.width() as usize * image.height() as usize;
        self.plane.clear();
        self.plane.resize(pixels * 3, 0);
        let (y_plane, chroma) = self.plane.split_at_mut(pixels);
        let (u_plane, v_plane) = chroma.split_at_mut(pixels);
        for (i, pixel) in image.pixels().enumerate() {
            let [r, g, b] = pixel.0.map(f32::from);
            y_plane[i] = to_u8(16.0 + 0.257 * r + 0.504 * g + 0.098 * b);
            u_plane[i] = to_u8(128.0 - 0.148 * r - 0.291 * g + 0.439 * b);
            v_plane[i] = to_u8(128.0 + 0.439 * r - 0.368 * g - 0.071 * b);
        }
        self.out.write_all(b"FRAME\n").context("write y4m frame")?;
        self.out.write_all(&self.plane).context("write y4m frame")?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.out.flush().context("flush y4m output")
    }
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn y4m_frames_follow_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.y4m");
        let mut sink = VideoSink::open(&path, (4, 2), 25.0)?;
        sink.write(&RgbImage::from_pixel(4, 2, Rgb([255, 255, 255])))?;
        sink.write(&RgbImage::new(4, 2))?;
        sink.close()?;
        sink.close()?;

        let bytes = std::fs::read(&path)?;
        let header = b"YUV4MPEG2 W4 H2 F25:1 Ip A1:1 C444\n";
        assert!(bytes.starts_with(header));
        assert_eq!(bytes.len(), header.len() + 2 * (6 + 4 * 2 * 3));
        assert_eq!(bytes[header.len() + 6], 235);
        assert_eq!(sink.frames_written(), 2);
        Ok(())
    }

    #[test]
    fn mismatched_frame_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = VideoSink::open(&dir.path().join("out.y4m"), (4, 2), 30.0)?;
        let err = sink.write(&RgbImage::new(2, 2)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::FrameSizeMismatch {
                expected: (4, 2),
                actual: (2, 2),
            })
        );
        assert_eq!(sink.frames_written(), 0);
        Ok(())
    }

    #[test]
    fn write_after_close_is_sink_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = VideoSink::open(&dir.path().join("out.y4m"), (4, 2), 30.0)?;
        sink.close()?;
        let err = sink.write(&RgbImage::new(4, 2)).unwrap_err();
        let typed = err.downcast_ref::<PipelineError>().expect("typed error");
        assert_eq!(typed.code(), "SINK_FAILURE");
        Ok(())
    }

    #[test]
    fn fractional_rates_keep_three_decimals() {
        assert_eq!(frame_rate_ratio(30.0), (30, 1));
        assert_eq!(frame_rate_ratio(29.97), (29970, 1000));
        assert_eq!(frame_rate_ratio(f64::NAN), (30, 1));
    }
}
