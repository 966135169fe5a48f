use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::decode::source::{FrameSource, MediaFrame, SourceInfo};
use crate::foundation::core::{Fps, FrameView, ImageBuf, PixelFormat};
use crate::foundation::error::{StitchError, StitchResult};

/// Camera stream read from a directory of still images (sorted by file name), decoded to RGB8.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    fps: Fps,
    width: u32,
    height: u32,
    current: ImageBuf,
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
}

fn decode_rgb(path: &Path) -> StitchResult<ImageBuf> {
    let img = image::open(path)
        .with_context(|| format!("decode image '{}'", path.display()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    ImageBuf::from_raw(w, h, PixelFormat::Rgb8, img.into_raw())
}

impl ImageSequenceSource {
    #[tracing::instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>, fps: Fps) -> StitchResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_context(|| format!("read image directory '{}'", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        files.sort();
        let first = files.first().ok_or_else(|| {
            StitchError::io(format!("no images found in '{}'", dir.display()))
        })?;
        let probe = decode_rgb(first)?;
        tracing::debug!(
            frames = files.len(),
            width = probe.width,
            height = probe.height,
            "image sequence opened"
        );
        Ok(Self {
            dir,
            width: probe.width,
            height: probe.height,
            files,
            next: 0,
            fps,
            current: probe,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb8,
            fps: self.fps,
            frame_count: Some(self.files.len() as u64),
            has_audio: false,
        }
    }

    fn read(&mut self) -> StitchResult<Option<MediaFrame<'_>>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let img = decode_rgb(path)?;
        if img.width != self.width || img.height != self.height {
            return Err(StitchError::validation(format!(
                "'{}' is {}x{}, sequence is {}x{}",
                path.display(),
                img.width,
                img.height,
                self.width,
                self.height
            )));
        }
        self.current = img;
        let ts = self.fps.frame_timestamp_us(self.next as u64);
        self.next += 1;
        Ok(Some(MediaFrame::Video(FrameView {
            width: self.current.width,
            height: self.current.height,
            stride: self.current.row_bytes(),
            format: PixelFormat::Rgb8,
            timestamp_us: ts,
            data: &self.current.data,
        })))
    }

    fn close(&mut self) {
        self.next = self.files.len();
    }
}
