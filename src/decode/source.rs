use std::collections::VecDeque;

use crate::foundation::core::{AudioPacket, Fps, FrameView, ImageBuf, PixelFormat};
use crate::foundation::error::{StitchError, StitchResult};

/// Stream properties reported by a source before decoding starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: Fps,
    /// Number of video frames, when the container knows it.
    pub frame_count: Option<u64>,
    pub has_audio: bool,
}

/// One decoded unit, borrowed from the source until the next `read`.
#[derive(Clone, Copy, Debug)]
pub enum MediaFrame<'a> {
    Video(FrameView<'a>),
    Audio { timestamp_us: i64, data: &'a [u8] },
}

impl MediaFrame<'_> {
    pub fn timestamp_us(&self) -> i64 {
        match self {
            Self::Video(v) => v.timestamp_us,
            Self::Audio { timestamp_us, .. } => *timestamp_us,
        }
    }
}

/// Demuxed and decoded camera stream.
pub trait FrameSource: Send {
    fn info(&self) -> SourceInfo;

    /// Next frame in presentation order; `Ok(None)` at end of stream.
    fn read(&mut self) -> StitchResult<Option<MediaFrame<'_>>>;

    fn close(&mut self) {}
}

enum Queued {
    Video(ImageBuf, i64),
    Audio(AudioPacket),
}

/// Source backed by frames held in memory. Video timestamps follow the frame rate.
pub struct InMemorySource {
    fps: Fps,
    queued: VecDeque<Queued>,
    current: Option<Queued>,
    next_video: u64,
    video_total: u64,
    has_audio: bool,
    shape: Option<(u32, u32, PixelFormat)>,
}

impl InMemorySource {
    pub fn new(fps: Fps) -> Self {
        Self {
            fps,
            queued: VecDeque::new(),
            current: None,
            next_video: 0,
            video_total: 0,
            has_audio: false,
            shape: None,
        }
    }

    pub fn from_frames(fps: Fps, frames: impl IntoIterator<Item = ImageBuf>) -> StitchResult<Self> {
        let mut s = Self::new(fps);
        for f in frames {
            s.push_video(f)?;
        }
        Ok(s)
    }

    /// Queue a video frame; every frame must share the first frame's size and format.
    pub fn push_video(&mut self, frame: ImageBuf) -> StitchResult<()> {
        let shape = (frame.width, frame.height, frame.format);
        match self.shape {
            None => self.shape = Some(shape),
            Some(s) if s != shape => {
                return Err(StitchError::validation(format!(
                    "in-memory source frame is {}x{} {:?}, expected {}x{} {:?}",
                    shape.0, shape.1, shape.2, s.0, s.1, s.2
                )));
            }
            Some(_) => {}
        }
        let ts = self.fps.frame_timestamp_us(self.video_total);
        self.video_total += 1;
        self.queued.push_back(Queued::Video(frame, ts));
        Ok(())
    }

    pub fn push_audio(&mut self, packet: AudioPacket) {
        self.has_audio = true;
        self.queued.push_back(Queued::Audio(packet));
    }

    /// Video frames handed out so far.
    pub fn frames_read(&self) -> u64 {
        self.next_video
    }
}

impl FrameSource for InMemorySource {
    fn info(&self) -> SourceInfo {
        let (width, height, format) = self.shape.unwrap_or((0, 0, PixelFormat::Rgb8));
        SourceInfo {
            width,
            height,
            format,
            fps: self.fps,
            frame_count: Some(self.video_total),
            has_audio: self.has_audio,
        }
    }

    fn read(&mut self) -> StitchResult<Option<MediaFrame<'_>>> {
        self.current = self.queued.pop_front();
        Ok(self.current.as_ref().map(|q| match q {
            Queued::Video(img, ts) => {
                self.next_video += 1;
                MediaFrame::Video(FrameView {
                    width: img.width,
                    height: img.height,
                    stride: img.row_bytes(),
                    format: img.format,
                    timestamp_us: *ts,
                    data: &img.data,
                })
            }
            Queued::Audio(p) => MediaFrame::Audio {
                timestamp_us: p.timestamp_us,
                data: &p.data,
            },
        }))
    }

    fn close(&mut self) {
        self.queued.clear();
        self.current = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/source.rs"]
mod tests;
