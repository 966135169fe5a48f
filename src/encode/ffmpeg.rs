use std::{
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::encode::sink::{FrameSink, SinkConfig, SinkFrame, check_video_frame};
use crate::foundation::core::{Fps, PixelFormat};
use crate::foundation::error::{StitchError, StitchResult};

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub format: PixelFormat,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl EncodeConfig {
    pub fn validate(&self) -> StitchResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StitchError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(StitchError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(())
    }

    fn input_pix_fmt(&self) -> &'static str {
        match self.format {
            PixelFormat::Gray8 => "gray",
            PixelFormat::Rgb8 => "rgb24",
            PixelFormat::Rgba8 => "rgba",
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> StitchResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

struct Encoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Encoder {
    fn spawn(cfg: EncodeConfig) -> StitchResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(StitchError::validation(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(StitchError::io(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if cfg.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            cfg.input_pix_fmt(),
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            StitchError::io(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StitchError::io("failed to open ffmpeg stdin (unexpected)"))?;

        Ok(Self {
            cfg,
            child,
            stdin: Some(stdin),
        })
    }

    fn write(&mut self, data: &[u8]) -> StitchResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(StitchError::pipeline("ffmpeg encoder is already finalized"));
        };

        use std::io::Write as _;
        stdin
            .write_all(data)
            .map_err(|e| StitchError::io(format!("failed to write frame to ffmpeg stdin: {e}")))
    }

    fn finish(mut self) -> StitchResult<()> {
        drop(self.stdin.take());

        let output = self.child.wait_with_output().map_err(|e| {
            StitchError::io(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StitchError::io(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(out = %self.cfg.out_path.display(), "ffmpeg encode finished");
        Ok(())
    }
}

/// H.264 MP4 output through the system `ffmpeg` binary (raw frames on stdin).
///
/// Audio packets are not muxed; they are counted and dropped.
pub struct FfmpegSink {
    out_path: PathBuf,
    overwrite: bool,
    encoder: Option<Encoder>,
    audio_dropped: u64,
}

impl FfmpegSink {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            encoder: None,
            audio_dropped: 0,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn config_for(&self, cfg: &SinkConfig) -> EncodeConfig {
        EncodeConfig {
            width: cfg.width,
            height: cfg.height,
            fps: cfg.fps,
            format: cfg.format,
            out_path: self.out_path.clone(),
            overwrite: self.overwrite,
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: &SinkConfig) -> StitchResult<()> {
        if self.encoder.is_some() {
            return Err(StitchError::pipeline("ffmpeg sink already started"));
        }
        self.encoder = Some(Encoder::spawn(self.config_for(cfg))?);
        Ok(())
    }

    fn push(&mut self, frame: SinkFrame<'_>) -> StitchResult<()> {
        let enc = self
            .encoder
            .as_mut()
            .ok_or_else(|| StitchError::pipeline("ffmpeg sink pushed before begin"))?;
        match frame {
            SinkFrame::Video { image, .. } => {
                let sink_cfg = SinkConfig {
                    width: enc.cfg.width,
                    height: enc.cfg.height,
                    format: enc.cfg.format,
                    fps: enc.cfg.fps,
                    has_audio: false,
                };
                check_video_frame(&sink_cfg, image)?;
                enc.write(&image.data)
            }
            SinkFrame::Audio(_) => {
                self.audio_dropped += 1;
                Ok(())
            }
        }
    }

    fn end(&mut self) -> StitchResult<()> {
        if self.audio_dropped > 0 {
            tracing::warn!(packets = self.audio_dropped, "ffmpeg sink does not mux audio");
        }
        match self.encoder.take() {
            Some(enc) => enc.finish(),
            None => Ok(()),
        }
    }
}
