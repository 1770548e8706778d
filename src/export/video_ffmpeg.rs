//! MP4 (and other container) output through FFmpeg.
//!
//! Prefers H.264 and falls back to MPEG-4 Part 2 when libx264 is not available.
//! RGB24 frames are converted to YUV420P before encoding.

use std::path::Path;

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{codec, Rational};
use image::RgbImage;

use super::video::frame_rate_ratio;

pub(crate) struct FfmpegVideoWriter {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ScalingContext,
    rgb_frame: Video,
    yuv_frame: Video,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    frame_index: i64,
}

impl FfmpegVideoWriter {
    pub(crate) fn open(path: &Path, (width, height): (u32, u32), frame_rate: f64) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("create output file {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(codec::Id::H264)
            .or_else(|| ffmpeg::encoder::find(codec::Id::MPEG4))
            .context("no H.264 or MPEG-4 encoder available")?;

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();

        let (num, den) = frame_rate_ratio(frame_rate);
        let rate = Rational::new(num as i32, den as i32);
        let encoder_time_base = rate.invert();

        let mut builder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        builder.set_width(width);
        builder.set_height(height);
        builder.set_format(Pixel::YUV420P);
        builder.set_frame_rate(Some(rate));
        builder.set_time_base(encoder_time_base);
        if global_header {
            builder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = builder.open().context("open video encoder")?;
        stream.set_parameters(&encoder);

        output.write_header().context("write container header")?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(encoder_time_base);

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            Flags::BILINEAR,
        )
        .context("create RGB to YUV scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            rgb_frame: Video::new(Pixel::RGB24, width, height),
            yuv_frame: Video::empty(),
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            frame_index: 0,
        })
    }

    pub(crate) fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        let row_bytes = self.width as usize * 3;
        let stride = self.rgb_frame.stride(0);
        let src = image.as_raw();
        let dst = self.rgb_frame.data_mut(0);
        for row in 0..self.height as usize {
            let src_start = row * row_bytes;
            let dst_start = row * stride;
            dst[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src[src_start..src_start + row_bytes]);
        }

        self.scaler
            .run(&self.rgb_frame, &mut self.yuv_frame)
            .context("convert frame to YUV")?;
        self.yuv_frame.set_pts(Some(self.frame_index));
        self.frame_index += 1;

        self.encoder
            .send_frame(&self.yuv_frame)
            .context("send frame to encoder")?;
        self.drain_packets()
    }

    pub(crate) fn finish(mut self) -> Result<()> {
        self.encoder.send_eof().context("flush encoder")?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .context("write container trailer")?;
        Ok(())
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write video packet")?;
        }
        Ok(())
    }
}
