use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::encode::ffmpeg::ensure_parent_dir;
use crate::encode::sink::{FrameSink, SinkConfig, SinkFrame, check_video_frame};
use crate::foundation::core::PixelFormat;
use crate::foundation::error::{StitchError, StitchResult};

/// Writes every video frame as `frame_NNNNNN.png` into a directory. Audio is dropped.
#[derive(Debug)]
pub struct PngSequenceSink {
    dir: PathBuf,
    cfg: Option<SinkConfig>,
    written: u64,
    audio_dropped: u64,
}

impl PngSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cfg: None,
            written: 0,
            audio_dropped: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

fn color_type(format: PixelFormat) -> image::ColorType {
    match format {
        PixelFormat::Gray8 => image::ColorType::L8,
        PixelFormat::Rgb8 => image::ColorType::Rgb8,
        PixelFormat::Rgba8 => image::ColorType::Rgba8,
    }
}

impl FrameSink for PngSequenceSink {
    fn begin(&mut self, cfg: &SinkConfig) -> StitchResult<()> {
        ensure_parent_dir(&self.frame_path(0))?;
        self.cfg = Some(*cfg);
        self.written = 0;
        Ok(())
    }

    fn push(&mut self, frame: SinkFrame<'_>) -> StitchResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| StitchError::pipeline("png sink pushed before begin"))?;
        match frame {
            SinkFrame::Video { image, .. } => {
                check_video_frame(&cfg, image)?;
                let path = self.frame_path(self.written);
                image::save_buffer_with_format(
                    &path,
                    &image.data,
                    image.width,
                    image.height,
                    color_type(image.format),
                    image::ImageFormat::Png,
                )
                .with_context(|| format!("write png '{}'", path.display()))?;
                self.written += 1;
            }
            SinkFrame::Audio(_) => self.audio_dropped += 1,
        }
        Ok(())
    }

    fn end(&mut self) -> StitchResult<()> {
        if self.audio_dropped > 0 {
            tracing::debug!(packets = self.audio_dropped, "png sink dropped audio");
        }
        tracing::info!(frames = self.written, dir = %self.dir.display(), "png sequence written");
        Ok(())
    }
}
