use crate::blend::strategy::BlendStrategy;
use crate::concurrency::pool::BufferPoolOpts;
use crate::foundation::core::{Fps, Size};
use crate::pipeline::overlay::LogoOverlay;
use crate::render::stage::{BlendChoice, RenderOpts};

/// Task-level knobs: queue depths, pooling, frame budget and post-processing.
#[derive(Clone, Debug)]
pub struct TaskConfig {
    /// Source whose audio packets are forwarded to the sink. Audio from other sources is ignored.
    pub audio_source: Option<usize>,
    /// Stop after this many frame-sets.
    pub max_frames: Option<u64>,
    pub decode_queue_depth: usize,
    pub render_queue_depth: usize,
    pub post_queue_depth: usize,
    pub pool: BufferPoolOpts,
    pub overlay: Option<LogoOverlay>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            audio_source: None,
            max_frames: None,
            decode_queue_depth: 4,
            render_queue_depth: 4,
            post_queue_depth: 8,
            pool: BufferPoolOpts::default(),
            overlay: None,
        }
    }
}

/// Panorama output: canvas size, render options and an optional frame-rate override.
#[derive(Debug)]
pub struct OutputSpec {
    pub size: Size,
    pub render: RenderOpts,
    /// Defaults to the first source's frame rate.
    pub fps: Option<Fps>,
}

impl OutputSpec {
    pub fn new(size: Size, blend: BlendChoice) -> Self {
        Self {
            size,
            render: RenderOpts::new(blend),
            fps: None,
        }
    }

    pub fn with_render(size: Size, render: RenderOpts) -> Self {
        Self {
            size,
            render,
            fps: None,
        }
    }

    /// Output composited by a host-supplied [`BlendStrategy`].
    pub fn external(size: Size, strategy: Box<dyn BlendStrategy>, levels: u32, min_side: u32) -> Self {
        Self::new(
            size,
            BlendChoice::External {
                strategy,
                levels,
                min_side,
            },
        )
    }
}
