use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::concurrency::pool::{BufferPool, BufferPoolStats, Pooled};
use crate::concurrency::queue::BoundedQueue;
use crate::decode::source::{FrameSource, MediaFrame, SourceInfo};
use crate::encode::sink::{FrameSink, SinkConfig, SinkFrame};
use crate::foundation::core::{AudioPacket, ImageBuf, Size};
use crate::foundation::error::{StitchError, StitchResult};
use crate::pipeline::config::{OutputSpec, TaskConfig};
use crate::pipeline::overlay::LogoOverlay;
use crate::pipeline::progress::Progress;
use crate::render::custom_masks::CustomMasks;
use crate::render::geometry::{GeometryProvider, validate_geometry};
use crate::render::stage::RenderStage;

/// Lifecycle of a [`PipelineTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Initialized,
    Running,
    Completed,
    Canceled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }
}

/// Usage counters of the camera-frame and output-frame pools.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub camera: BufferPoolStats,
    pub output: BufferPoolStats,
}

enum DecodedItem {
    Frames {
        set: Vec<Pooled<ImageBuf>>,
        timestamps_us: Vec<i64>,
        index: u64,
    },
    Audio(AudioPacket),
}

enum RenderedItem {
    Video {
        image: Pooled<ImageBuf>,
        timestamp_us: i64,
    },
    Audio(AudioPacket),
}

struct Shared {
    canceled: AtomicBool,
    failed: AtomicBool,
    async_error: Mutex<Option<String>>,
    progress: Progress,
    decoded: BoundedQueue<DecodedItem>,
    rendered: BoundedQueue<RenderedItem>,
    finished: BoundedQueue<RenderedItem>,
}

impl Shared {
    fn new(cfg: &TaskConfig) -> Self {
        Self {
            canceled: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            async_error: Mutex::new(None),
            progress: Progress::new(),
            decoded: BoundedQueue::new(cfg.decode_queue_depth),
            rendered: BoundedQueue::new(cfg.render_queue_depth),
            finished: BoundedQueue::new(cfg.post_queue_depth),
        }
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.decoded.stop();
        self.rendered.stop();
        self.finished.stop();
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn error_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.async_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps the first message, then cancels the whole task.
    fn record_error(&self, stage: &str, msg: String) {
        tracing::error!(stage, error = %msg, "stage failed");
        {
            let mut slot = self.error_slot();
            if !self.failed.swap(true, Ordering::SeqCst) {
                *slot = Some(format!("{stage}: {msg}"));
            }
        }
        self.cancel();
    }

    fn drain_queues(&self) -> usize {
        self.decoded.drain().len() + self.rendered.drain().len() + self.finished.drain().len()
    }
}

/// Cloneable handle that cancels a running task from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.shared.is_canceled()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

struct Prepared {
    sources: Vec<Box<dyn FrameSource>>,
    sink: Box<dyn FrameSink>,
    stage: RenderStage,
}

/// Four-stage stitching task: decode → render → post-process → encode, one thread each,
/// joined by bounded queues.
///
/// ```text
/// Created --init--> Initialized --start--> Running --wait_for_completion--> Completed
///                                                                       \-> Canceled
///                                                                       \-> Failed
/// ```
///
/// Errors raised by `init` are synchronous and kept for [`PipelineTask::last_sync_error_message`].
/// Errors raised inside a stage (including panics) are asynchronous: the first one is stored,
/// the task is canceled, and it settles as [`TaskState::Failed`].
pub struct PipelineTask {
    config: TaskConfig,
    state: TaskState,
    shared: Arc<Shared>,
    prepared: Option<Prepared>,
    camera_pool: Option<BufferPool<ImageBuf>>,
    output_pool: Option<BufferPool<ImageBuf>>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
    sync_error: Option<String>,
}

impl fmt::Debug for PipelineTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineTask")
            .field("state", &self.state)
            .field("progress", &self.progress())
            .field("threads", &self.threads.len())
            .finish_non_exhaustive()
    }
}

impl PipelineTask {
    pub fn new(config: TaskConfig) -> Self {
        let shared = Arc::new(Shared::new(&config));
        Self {
            config,
            state: TaskState::Created,
            shared,
            prepared: None,
            camera_pool: None,
            output_pool: None,
            threads: Vec::new(),
            sync_error: None,
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Validate inputs, begin the sink, prepare the render stage and allocate pools.
    #[tracing::instrument(skip_all, fields(sources = sources.len()))]
    pub fn init(
        &mut self,
        sources: Vec<Box<dyn FrameSource>>,
        sink: Box<dyn FrameSink>,
        geometry: &dyn GeometryProvider,
        mask_overrides: Option<CustomMasks>,
        output: OutputSpec,
    ) -> StitchResult<()> {
        let res = if self.state == TaskState::Created {
            self.try_init(sources, sink, geometry, mask_overrides, output)
        } else {
            Err(StitchError::pipeline(format!(
                "init called on a task in state {:?}",
                self.state
            )))
        };
        match res {
            Ok(()) => {
                self.state = TaskState::Initialized;
                self.sync_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "task init failed");
                self.sync_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn try_init(
        &mut self,
        sources: Vec<Box<dyn FrameSource>>,
        mut sink: Box<dyn FrameSink>,
        geometry: &dyn GeometryProvider,
        mask_overrides: Option<CustomMasks>,
        output: OutputSpec,
    ) -> StitchResult<()> {
        let cfg = self.config.clone();
        for (name, depth) in [
            ("decode", cfg.decode_queue_depth),
            ("render", cfg.render_queue_depth),
            ("post-process", cfg.post_queue_depth),
        ] {
            if depth == 0 {
                return Err(StitchError::validation(format!(
                    "{name} queue depth must be > 0"
                )));
            }
        }

        let infos: Vec<SourceInfo> = sources.iter().map(|s| s.info()).collect();
        let first = check_sources(&infos)?;
        if let Some(a) = cfg.audio_source
            && a >= infos.len()
        {
            return Err(StitchError::validation(format!(
                "audio source {a} out of range for {} sources",
                infos.len()
            )));
        }
        if let Some(overlay) = &cfg.overlay {
            overlay.check_target(first.format)?;
        }

        let OutputSpec {
            size,
            mut render,
            fps,
        } = output;
        let src_sizes: Vec<Size> = infos.iter().map(|i| Size::new(i.width, i.height)).collect();
        let cameras = geometry.camera_geometry(&src_sizes, size)?;
        validate_geometry(&cameras, infos.len(), size)?;
        if mask_overrides.is_some() {
            render.custom_masks = mask_overrides;
        }
        let stage = RenderStage::prepare(cameras, render)?;

        let expected = expected_frames(&infos, cfg.max_frames);
        let sink_cfg = SinkConfig {
            width: size.width,
            height: size.height,
            format: first.format,
            fps: fps.unwrap_or(first.fps),
            has_audio: cfg.audio_source.is_some_and(|a| infos[a].has_audio),
        };
        sink.begin(&sink_cfg)?;

        let format = first.format;
        self.camera_pool = Some(BufferPool::new(cfg.pool, move || {
            ImageBuf::new(0, 0, format)
        }));
        self.output_pool = Some(BufferPool::new(cfg.pool, move || {
            ImageBuf::new(size.width, size.height, format)
        }));
        self.shared.progress.reset(expected);
        self.prepared = Some(Prepared {
            sources,
            sink,
            stage,
        });
        tracing::info!(
            cameras = infos.len(),
            width = size.width,
            height = size.height,
            expected = ?expected,
            "task initialized"
        );
        Ok(())
    }

    /// Spawn the stage threads. Only valid once, right after a successful `init`.
    pub fn start(&mut self) -> StitchResult<()> {
        if self.state != TaskState::Initialized {
            return Err(StitchError::pipeline(format!(
                "start needs an initialized task, state is {:?}",
                self.state
            )));
        }
        let (Some(prepared), Some(camera_pool), Some(output_pool)) = (
            self.prepared.take(),
            self.camera_pool.clone(),
            self.output_pool.clone(),
        ) else {
            return Err(StitchError::pipeline("task resources missing after init"));
        };

        self.state = TaskState::Running;
        if let Err(e) = self.spawn_stages(prepared, camera_pool, output_pool) {
            self.sync_error = Some(e.to_string());
            self.shared.cancel();
            self.join_all();
            self.shared.drain_queues();
            self.state = TaskState::Failed;
            return Err(e);
        }
        tracing::info!("task started");
        Ok(())
    }

    fn spawn_stages(
        &mut self,
        prepared: Prepared,
        camera_pool: BufferPool<ImageBuf>,
        output_pool: BufferPool<ImageBuf>,
    ) -> StitchResult<()> {
        let Prepared {
            mut sources,
            mut sink,
            mut stage,
        } = prepared;
        let audio_source = self.config.audio_source;
        let max_frames = self.config.max_frames;
        let overlay = self.config.overlay.clone();

        let encode = spawn_stage("encode", &self.shared, move |shared| {
            let looped = panic::catch_unwind(AssertUnwindSafe(|| encode_loop(shared, &mut *sink)));
            let ended = sink.end();
            match looped {
                Ok(res) => res?,
                Err(payload) => panic::resume_unwind(payload),
            };
            ended
        })?;
        self.threads.push(("encode", encode));

        let post = spawn_stage("post-process", &self.shared, move |shared| {
            let res = post_loop(shared, overlay.as_ref());
            shared.finished.close();
            res
        })?;
        self.threads.push(("post-process", post));

        let render = spawn_stage("render", &self.shared, move |shared| {
            let res = render_loop(shared, &mut stage, &output_pool);
            shared.rendered.close();
            res
        })?;
        self.threads.push(("render", render));

        let decode = spawn_stage("decode", &self.shared, move |shared| {
            let res = decode_loop(shared, &mut sources, &camera_pool, audio_source, max_frames);
            for s in &mut sources {
                s.close();
            }
            shared.decoded.close();
            res.map(|frames| tracing::debug!(frames, "decode finished"))
        })?;
        self.threads.push(("decode", decode));
        Ok(())
    }

    pub fn cancel(&self) {
        tracing::info!("task cancel requested");
        self.shared.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn join_all(&mut self) {
        for (name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                self.shared
                    .record_error(name, "thread terminated abnormally".to_string());
            }
        }
    }

    /// Join every stage, return leftover buffers to their pools and settle the final state.
    /// Calling it again returns the settled state.
    pub fn wait_for_completion(&mut self) -> TaskState {
        self.join_all();
        if self.state == TaskState::Running {
            let leftovers = self.shared.drain_queues();
            if leftovers > 0 {
                tracing::debug!(leftovers, "released queued items");
            }
            self.state = if self.shared.failed.load(Ordering::SeqCst) {
                TaskState::Failed
            } else if self.shared.is_canceled() {
                TaskState::Canceled
            } else {
                self.shared.progress.finish();
                TaskState::Completed
            };
            tracing::info!(
                state = ?self.state,
                frames = self.shared.progress.frames(),
                "task finished"
            );
        }
        self.state
    }

    /// Percentage of the expected frames written so far; 100 once completed.
    pub fn progress(&self) -> u8 {
        self.shared.progress.percent()
    }

    pub fn frames_encoded(&self) -> u64 {
        self.shared.progress.frames()
    }

    /// Frame-sets the task expects to write, when the sources know their length.
    pub fn expected_frames(&self) -> Option<u64> {
        self.shared.progress.total()
    }

    pub fn last_sync_error_message(&self) -> Option<&str> {
        self.sync_error.as_deref()
    }

    pub fn has_async_error_message(&self) -> bool {
        self.shared.error_slot().is_some()
    }

    /// Hand out the stored stage error. Later calls return `None`.
    pub fn take_async_error_message(&self) -> Option<String> {
        self.shared.error_slot().take()
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            camera: self
                .camera_pool
                .as_ref()
                .map(BufferPool::stats)
                .unwrap_or_default(),
            output: self
                .output_pool
                .as_ref()
                .map(BufferPool::stats)
                .unwrap_or_default(),
        }
    }
}

impl Drop for PipelineTask {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.shared.cancel();
            self.join_all();
            self.shared.drain_queues();
        }
        if let Some(mut prepared) = self.prepared.take()
            && let Err(e) = prepared.sink.end()
        {
            tracing::warn!(error = %e, "sink finalize failed for a task that never started");
        }
    }
}

fn check_sources(infos: &[SourceInfo]) -> StitchResult<SourceInfo> {
    let first = *infos
        .first()
        .ok_or_else(|| StitchError::validation("task needs at least one source"))?;
    for (i, info) in infos.iter().enumerate() {
        if info.width == 0 || info.height == 0 {
            return Err(StitchError::validation(format!("source {i} has an empty frame size")));
        }
        if info.format != first.format {
            return Err(StitchError::validation(format!(
                "source {i} decodes to {:?}, source 0 to {:?}",
                info.format, first.format
            )));
        }
        if info.fps != first.fps {
            return Err(StitchError::validation(format!(
                "source {i} runs at {}/{} fps, source 0 at {}/{}",
                info.fps.num, info.fps.den, first.fps.num, first.fps.den
            )));
        }
    }
    Ok(first)
}

/// Shortest known source length, clamped by the frame budget.
fn expected_frames(infos: &[SourceInfo], max_frames: Option<u64>) -> Option<u64> {
    let known = infos
        .iter()
        .map(|i| i.frame_count)
        .collect::<Option<Vec<u64>>>()
        .and_then(|counts| counts.into_iter().min());
    match (known, max_frames) {
        (Some(k), Some(m)) => Some(k.min(m)),
        (k, m) => k.or(m),
    }
}

fn spawn_stage(
    name: &'static str,
    shared: &Arc<Shared>,
    body: impl FnOnce(&Shared) -> StitchResult<()> + Send + 'static,
) -> StitchResult<JoinHandle<()>> {
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("panostitch-{name}"))
        .spawn(move || {
            tracing::info!(stage = name, "stage started");
            match panic::catch_unwind(AssertUnwindSafe(|| body(&shared))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => shared.record_error(name, e.to_string()),
                Err(payload) => {
                    let msg = format!("panicked: {}", panic_message(payload.as_ref()));
                    shared.record_error(name, msg);
                }
            }
            tracing::info!(stage = name, "stage stopped");
        })
        .map_err(|e| StitchError::pipeline(format!("failed to spawn {name} thread: {e}")))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn decode_loop(
    shared: &Shared,
    sources: &mut [Box<dyn FrameSource>],
    pool: &BufferPool<ImageBuf>,
    audio_source: Option<usize>,
    max_frames: Option<u64>,
) -> StitchResult<u64> {
    let mut index = 0u64;
    'frames: while max_frames.is_none_or(|m| index < m) {
        if shared.is_canceled() {
            break;
        }
        let mut set = Vec::with_capacity(sources.len());
        let mut timestamps_us = Vec::with_capacity(sources.len());
        for (cam, src) in sources.iter_mut().enumerate() {
            loop {
                match src.read()? {
                    None => break 'frames,
                    Some(MediaFrame::Audio { timestamp_us, data }) => {
                        if audio_source != Some(cam) {
                            continue;
                        }
                        let packet = AudioPacket {
                            timestamp_us,
                            data: data.to_vec(),
                        };
                        if shared.decoded.push(DecodedItem::Audio(packet)).is_err() {
                            break 'frames;
                        }
                    }
                    Some(MediaFrame::Video(view)) => {
                        let mut buf = pool.acquire();
                        buf.copy_from_view(&view)?;
                        timestamps_us.push(view.timestamp_us);
                        set.push(buf);
                        break;
                    }
                }
            }
        }
        let item = DecodedItem::Frames {
            set,
            timestamps_us,
            index,
        };
        if shared.decoded.push(item).is_err() {
            break;
        }
        index += 1;
    }
    Ok(index)
}

fn render_loop(
    shared: &Shared,
    stage: &mut RenderStage,
    pool: &BufferPool<ImageBuf>,
) -> StitchResult<()> {
    while let Some(item) = shared.decoded.pull() {
        if shared.is_canceled() {
            break;
        }
        let next = match item {
            DecodedItem::Audio(p) => RenderedItem::Audio(p),
            DecodedItem::Frames {
                set,
                timestamps_us,
                index,
            } => {
                let mut out = pool.acquire();
                let frames: Vec<&ImageBuf> = set.iter().map(|b| &**b).collect();
                stage
                    .render_into(&frames, &timestamps_us, &mut out)
                    .map_err(|e| StitchError::render(format!("frame-set {index}: {e}")))?;
                drop(frames);
                drop(set);
                RenderedItem::Video {
                    image: out,
                    timestamp_us: timestamps_us.first().copied().unwrap_or_default(),
                }
            }
        };
        if shared.rendered.push(next).is_err() {
            break;
        }
    }
    Ok(())
}

fn post_loop(shared: &Shared, overlay: Option<&LogoOverlay>) -> StitchResult<()> {
    while let Some(mut item) = shared.rendered.pull() {
        if shared.is_canceled() {
            break;
        }
        if let (Some(overlay), RenderedItem::Video { image, .. }) = (overlay, &mut item) {
            overlay.apply(image)?;
        }
        if shared.finished.push(item).is_err() {
            break;
        }
    }
    Ok(())
}

fn encode_loop(shared: &Shared, sink: &mut dyn FrameSink) -> StitchResult<()> {
    while let Some(item) = shared.finished.pull() {
        if shared.is_canceled() {
            break;
        }
        match &item {
            RenderedItem::Video {
                image,
                timestamp_us,
            } => {
                sink.push(SinkFrame::Video {
                    image: &**image,
                    timestamp_us: *timestamp_us,
                })?;
                shared.progress.record_frame();
            }
            RenderedItem::Audio(p) => sink.push(SinkFrame::Audio(p))?,
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/task.rs"]
mod tests;
