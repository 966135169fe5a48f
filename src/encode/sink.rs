use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::foundation::core::{AudioPacket, Fps, ImageBuf, PixelFormat};
use crate::foundation::error::{StitchError, StitchResult};

/// Output stream description handed to [`FrameSink::begin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: Fps,
    pub has_audio: bool,
}

/// One unit written to a sink, in presentation order.
#[derive(Clone, Copy, Debug)]
pub enum SinkFrame<'a> {
    Video {
        image: &'a ImageBuf,
        timestamp_us: i64,
    },
    Audio(&'a AudioPacket),
}

/// Muxer/encoder consuming the stitched stream.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: &SinkConfig) -> StitchResult<()>;

    fn push(&mut self, frame: SinkFrame<'_>) -> StitchResult<()>;

    /// Flush and finalize. Called once, after the last `push`, on normal completion and on
    /// cancellation alike.
    fn end(&mut self) -> StitchResult<()>;
}

pub(crate) fn check_video_frame(cfg: &SinkConfig, image: &ImageBuf) -> StitchResult<()> {
    if image.width != cfg.width || image.height != cfg.height || image.format != cfg.format {
        return Err(StitchError::validation(format!(
            "frame is {}x{} {:?}, sink expects {}x{} {:?}",
            image.width, image.height, image.format, cfg.width, cfg.height, cfg.format
        )));
    }
    Ok(())
}

/// Everything an [`InMemorySink`] has received.
#[derive(Clone, Debug, Default)]
pub struct Recording {
    pub config: Option<SinkConfig>,
    pub video: Vec<(i64, ImageBuf)>,
    pub audio: Vec<AudioPacket>,
    /// `true` for video, `false` for audio, in arrival order.
    pub order: Vec<bool>,
    pub ended: bool,
}

/// Sink that records frames in memory. Clones share the same recording.
#[derive(Clone, Debug, Default)]
pub struct InMemorySink {
    rec: Arc<Mutex<Recording>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.rec.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of what was recorded so far.
    pub fn recording(&self) -> Recording {
        self.lock().clone()
    }

    pub fn video_frames(&self) -> usize {
        self.lock().video.len()
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: &SinkConfig) -> StitchResult<()> {
        let mut rec = self.lock();
        *rec = Recording {
            config: Some(*cfg),
            ..Recording::default()
        };
        Ok(())
    }

    fn push(&mut self, frame: SinkFrame<'_>) -> StitchResult<()> {
        let mut rec = self.lock();
        let cfg = rec
            .config
            .ok_or_else(|| StitchError::pipeline("in-memory sink pushed before begin"))?;
        match frame {
            SinkFrame::Video {
                image,
                timestamp_us,
            } => {
                check_video_frame(&cfg, image)?;
                rec.video.push((timestamp_us, image.clone()));
                rec.order.push(true);
            }
            SinkFrame::Audio(p) => {
                rec.audio.push(p.clone());
                rec.order.push(false);
            }
        }
        Ok(())
    }

    fn end(&mut self) -> StitchResult<()> {
        self.lock().ended = true;
        Ok(())
    }
}
