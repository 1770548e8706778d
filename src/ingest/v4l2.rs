//! V4L2 camera source.
//!
//! Opens `/dev/video{index}`, asks for RGB3 at the driver's current resolution and
//! falls back to whatever packed format the driver insists on, converting it to RGB24.
//! A live camera never reports end-of-stream; the session ends when a stop is requested.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::error::PipelineError;
use crate::frame::Frame;

const CAPTURE_BUFFERS: u32 = 4;

pub(crate) struct V4l2DeviceSource {
    device_path: String,
    state: DeviceState,
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_rate: f64,
    frame_count: u64,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2DeviceSource {
    pub(crate) fn open(index: u32) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device_path = format!("/dev/video{}", index);
        let device = v4l::Device::with_path(&device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;

        let mut requested = device.format().context("read v4l2 format")?;
        requested.fourcc = v4l::FourCC::new(b"RGB3");
        let format = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "FrameSource: failed to set RGB3 on {}: {}",
                    device_path,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = pixel_format_for(&format.fourcc.repr)
            .ok_or_else(|| anyhow!("unsupported camera pixel format {}", format.fourcc))?;

        let frame_rate = device
            .params()
            .ok()
            .map(|params| params.interval)
            .filter(|interval| interval.numerator > 0)
            .map(|interval| interval.denominator as f64 / interval.numerator as f64)
            .unwrap_or(0.0);

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, CAPTURE_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "FrameSource: connected to {} ({}x{}, {:?})",
            device_path,
            format.width,
            format.height,
            pixel_format
        );

        Ok(Self {
            device_path,
            state,
            width: format.width,
            height: format.height,
            format: pixel_format,
            frame_rate,
            frame_count: 0,
        })
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let pixels = self
            .state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
                    .and_then(|(buf, meta)| {
                        let used = (meta.bytesused as usize).min(buf.len());
                        let data = if used > 0 { &buf[..used] } else { buf };
                        normalize_to_rgb(data, width, height, format)
                    })
            })
            .map_err(|err| {
                PipelineError::FrameDecodeFailure(format!("{}: {:#}", self.device_path, err))
            })?;

        let index = self.frame_count;
        self.frame_count += 1;
        Frame::from_rgb(pixels, width, height, index).map(Some)
    }
}

fn pixel_format_for(fourcc: &[u8; 4]) -> Option<PixelFormat> {
    match fourcc {
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"NV12" => Some(PixelFormat::Nv12),
        b"YUYV" => Some(PixelFormat::Yuyv),
        _ => None,
    }
}
