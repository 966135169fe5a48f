//! Panostitch stitches synchronized camera streams into a panoramic video.
//!
//! The crate is built around a four-stage threaded task:
//!
//! - Decode frame-sets from N [`FrameSource`]s into pooled buffers
//! - Render them through a [`RenderStage`] (reprojection, photometric correction, blending)
//! - Post-process (optional [`LogoOverlay`])
//! - Encode in order into a [`FrameSink`]
//!
//! Stages talk through [`BoundedQueue`]s, so a slow sink throttles decoding instead of growing
//! memory. [`PipelineTask`] owns the threads and exposes progress, cancellation and error
//! reporting.
#![forbid(unsafe_code)]

mod foundation;

/// Seam and linear compositors plus the pluggable blend interface.
pub mod blend;
/// Bounded queues and buffer pools shared by the pipeline stages.
pub mod concurrency;
/// Camera stream sources.
pub mod decode;
/// Output sinks.
pub mod encode;
/// Mask algebra, distance transforms and blurs used by the compositors.
pub mod imgproc;
/// Gain compensation, histogram matching and LUTs.
pub mod photometric;
/// The threaded stitching task.
pub mod pipeline;
/// Per-frame rendering: geometry, reprojection, composition.
pub mod render;

pub use crate::foundation::core::{
    AudioPacket, Fps, FrameView, ImageBuf, Mask, PixelFormat, SampleMap, Size,
};
pub use crate::foundation::error::{StitchError, StitchResult};
pub use crate::foundation::math::{BLEND_SHIFT, BLEND_UNIT};

pub use crate::blend::seam::{PixelClass, SeamBlender, SeamMode};
pub use crate::blend::strategy::BlendStrategy;
pub use crate::concurrency::pool::{BufferPool, BufferPoolOpts, BufferPoolStats, Pooled};
pub use crate::concurrency::queue::BoundedQueue;
pub use crate::decode::png_seq::ImageSequenceSource;
pub use crate::decode::source::{FrameSource, InMemorySource, MediaFrame, SourceInfo};
pub use crate::encode::ffmpeg::FfmpegSink;
pub use crate::encode::png_seq::PngSequenceSink;
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig, SinkFrame};
pub use crate::imgproc::masks::{unique_masks, validate_masks};
pub use crate::photometric::gain::{GainCorrection, GainModel, GainSolve, GainSolver, GainSolverOpts};
pub use crate::photometric::histogram::HistogramGainMatcher;
pub use crate::photometric::lut::{ChannelLuts, Lut};
pub use crate::photometric::ransac::RansacOpts;
pub use crate::pipeline::config::{OutputSpec, TaskConfig};
pub use crate::pipeline::overlay::LogoOverlay;
pub use crate::pipeline::task::{CancelHandle, PipelineTask, PoolStats, TaskState};
pub use crate::render::custom_masks::CustomMasks;
pub use crate::render::geometry::{CameraGeometry, FixedGeometry, GeometryProvider, StripGeometry};
pub use crate::render::stage::{BlendChoice, Correction, ExecBackend, RenderOpts, RenderStage};
