// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

use anyhow::{anyhow, Result};
use url::Url;

use crate::error::PipelineError;
use crate::frame::{rgb_len, Frame};

/// Parameters of a `stub://<name>?frames=N&width=W&height=H&fps=F&fail_at=K` source.
///
/// `frames` omitted means an endless stream, like a live device. `fail_at` makes the
/// K-th frame (zero-based) fail to decode.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub name: String,
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub fail_at: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            frames: None,
            width: 320,
            height: 240,
            fps: 30.0,
            fail_at: None,
        }
    }
}

impl SyntheticConfig {
    pub fn from_url(url: &Url) -> Result<Self> {
        if url.scheme() != "stub" {
            return Err(anyhow!("synthetic sources use the stub:// scheme"));
        }
        let mut config = Self {
            name: url.host_str().unwrap_or("synthetic").to_string(),
            ..Self::default()
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => config.frames = Some(parse_param(&key, &value)?),
                "width" => config.width = parse_param(&key, &value)?,
                "height" => config.height = parse_param(&key, &value)?,
                "fps" => config.fps = parse_param(&key, &value)?,
                "fail_at" => config.fail_at = Some(parse_param(&key, &value)?),
                other => log::warn!("FrameSource: ignoring unknown stub parameter '{}'", other),
            }
        }
        if config.width < 8 || config.height < 8 {
            return Err(anyhow!("synthetic frames must be at least 8x8"));
        }
        if config.fps.is_nan() || config.fps <= 0.0 {
            return Err(anyhow!("synthetic fps must be positive"));
        }
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid value '{}' for stub parameter '{}'", value, key))
}

pub(crate) struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub(crate) fn new(config: SyntheticConfig) -> Self {
        log::info!("FrameSource: connected to stub://{} (synthetic)", config.name);
        Self {
            config,
            frame_count: 0,
        }
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub(crate) fn frame_rate(&self) -> f64 {
        self.config.fps
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        let index = self.frame_count;
        self.frame_count += 1;

        if self.config.fail_at == Some(index) {
            return Err(PipelineError::FrameDecodeFailure(format!(
                "synthetic decode failure at frame {}",
                index
            ))
            .into());
        }

        let pixels = self.generate_synthetic_pixels(index)?;
        Frame::from_rgb(pixels, self.config.width, self.config.height, index).map(Some)
    }

    /// Background gradient that never reaches full white, plus one white square that
    /// slides right by a few pixels per frame. The square is what the stub detector
    /// picks up.
    fn generate_synthetic_pixels(&self, index: u64) -> Result<Vec<u8>> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; rgb_len(self.config.width, self.config.height)?];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + index) % 200) as u8;
        }

        let side = (width.min(height) / 5).max(2);
        let travel = width.saturating_sub(side).max(1);
        let left = (index as usize * 4) % travel;
        let top = (height - side) / 2;
        for y in top..top + side {
            for x in left..left + side {
                let offset = (y * width + x) * 3;
                pixels[offset..offset + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reads_query_parameters() -> Result<()> {
        let url = Url::parse("stub://lobby?frames=5&width=64&height=48&fps=12.5&fail_at=3")?;
        let config = SyntheticConfig::from_url(&url)?;
        assert_eq!(config.name, "lobby");
        assert_eq!(config.frames, Some(5));
        assert_eq!((config.width, config.height), (64, 48));
        assert_eq!(config.fps, 12.5);
        assert_eq!(config.fail_at, Some(3));
        Ok(())
    }

    #[test]
    fn finite_source_ends_after_n_frames() -> Result<()> {
        let url = Url::parse("stub://clip?frames=2&width=16&height=16")?;
        let mut source = SyntheticSource::new(SyntheticConfig::from_url(&url)?);
        assert_eq!(source.next_frame()?.map(|f| f.index), Some(0));
        assert_eq!(source.next_frame()?.map(|f| f.index), Some(1));
        assert!(source.next_frame()?.is_none());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn fail_at_yields_decode_failure() -> Result<()> {
        let url = Url::parse("stub://clip?frames=4&width=16&height=16&fail_at=1")?;
        let mut source = SyntheticSource::new(SyntheticConfig::from_url(&url)?);
        source.next_frame()?;
        let err = source.next_frame().unwrap_err();
        let typed = err.downcast_ref::<PipelineError>().expect("typed error");
        assert_eq!(typed.code(), "FRAME_DECODE_FAILURE");
        Ok(())
    }

    #[test]
    fn frames_contain_a_white_square() -> Result<()> {
        let url = Url::parse("stub://clip?width=40&height=20")?;
        let mut source = SyntheticSource::new(SyntheticConfig::from_url(&url)?);
        let frame = source.next_frame()?.expect("frame");
        let white = frame
            .image
            .pixels()
            .filter(|p| p.0 == [255, 255, 255])
            .count();
        assert_eq!(white, 4 * 4);
        Ok(())
    }
}
