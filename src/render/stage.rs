use std::fmt;
use std::sync::Arc;

use crate::blend::linear::LinearBlender;
use crate::blend::seam::{SeamBlender, SeamMode};
use crate::blend::strategy::BlendStrategy;
use crate::foundation::core::{ImageBuf, Mask, PixelFormat, Size};
use crate::foundation::error::{StitchError, StitchResult};
use crate::imgproc::masks::unique_masks;
use crate::photometric::gain::GainCorrection;
use crate::photometric::histogram::{HISTOGRAM_EXTENSION_RADIUS, HistogramGainMatcher};
use crate::photometric::lut::ChannelLuts;
use crate::photometric::ransac::RansacOpts;
use crate::render::custom_masks::{ActiveIntervals, CustomMasks};
use crate::render::geometry::CameraGeometry;
use crate::render::reproject::{reproject, reproject_par};

/// Compositing algorithm, fixed at prepare time.
pub enum BlendChoice {
    /// Feathered weighted average over any number of cameras.
    Linear { radius: u32 },
    /// Fixed-point seam blend; exactly two cameras.
    Seam(SeamMode),
    /// Host-provided compositor (for example a multiband blender), prepared on unique masks.
    External {
        strategy: Box<dyn BlendStrategy>,
        levels: u32,
        min_side: u32,
    },
}

impl fmt::Debug for BlendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear { radius } => f.debug_struct("Linear").field("radius", radius).finish(),
            Self::Seam(mode) => f.debug_tuple("Seam").field(mode).finish(),
            Self::External {
                strategy,
                levels,
                min_side,
            } => f
                .debug_struct("External")
                .field("strategy", &strategy.name())
                .field("levels", levels)
                .field("min_side", min_side)
                .finish(),
        }
    }
}

/// Where per-frame work runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExecBackend {
    /// Everything on the render thread.
    Serial,
    /// Row-parallel on a dedicated rayon pool; `threads: None` uses rayon's default.
    Parallel { threads: Option<usize> },
}

impl Default for ExecBackend {
    fn default() -> Self {
        Self::Parallel { threads: None }
    }
}

/// Photometric correction applied to camera frames before reprojection.
#[derive(Clone, Debug, Default)]
pub enum Correction {
    #[default]
    None,
    /// Host-supplied LUTs, one entry per camera.
    Luts(Vec<ChannelLuts>),
    /// Gain compensation solved once from the first frame-set.
    AutoGain(GainCorrection),
    /// Histogram matching against a preliminary composite of the first frame-set.
    AutoHistogram(RansacOpts),
}

#[derive(Debug)]
pub struct RenderOpts {
    pub blend: BlendChoice,
    pub backend: ExecBackend,
    pub correction: Correction,
    pub custom_masks: Option<CustomMasks>,
    /// Output must have even dimensions and a 2:1 aspect.
    pub require_equirect_aspect: bool,
}

impl RenderOpts {
    pub fn new(blend: BlendChoice) -> Self {
        Self {
            blend,
            backend: ExecBackend::default(),
            correction: Correction::None,
            custom_masks: None,
            require_equirect_aspect: true,
        }
    }
}

enum Compositor {
    Linear(LinearBlender),
    Seam(SeamBlender),
    External(Box<dyn BlendStrategy>),
}

impl Compositor {
    /// Composite already reprojected images.
    fn blend(&mut self, images: &[ImageBuf], out: &mut ImageBuf) -> StitchResult<()> {
        match self {
            Self::Linear(b) => b.blend(images, out),
            Self::Seam(s) => s.blend_into(&images[0], &images[1], out),
            Self::External(b) => b.blend(images, out),
        }
    }
}

enum CorrectionState {
    None,
    Ready(Vec<ChannelLuts>),
    PendingGain(GainCorrection),
    PendingHistogram(RansacOpts),
}

struct CustomCache {
    active: ActiveIntervals,
    masks: Vec<Mask>,
    /// Re-prepared compositor for built-in blenders; external strategies use `masks` directly.
    compositor: Option<Compositor>,
}

/// Per-frame reprojection, tone correction and compositing of one frame-set.
pub struct RenderStage {
    size: Size,
    geometry: Vec<CameraGeometry>,
    /// Masks the compositor was prepared with; custom overrides fall back to these.
    default_masks: Vec<Mask>,
    seam_mode: Option<SeamMode>,
    linear_radius: Option<u32>,
    compositor: Compositor,
    backend: ExecBackend,
    pool: Arc<rayon::ThreadPool>,
    correction: CorrectionState,
    custom: Option<CustomMasks>,
    custom_cache: Option<CustomCache>,
    corrected: Vec<ImageBuf>,
    reprojected: Vec<ImageBuf>,
    lut_warned: bool,
    frames_rendered: u64,
}

impl fmt::Debug for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStage")
            .field("size", &self.size)
            .field("cameras", &self.geometry.len())
            .field("backend", &self.backend)
            .field("frames_rendered", &self.frames_rendered)
            .finish_non_exhaustive()
    }
}

pub(crate) fn build_thread_pool(threads: Option<usize>) -> StitchResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(StitchError::validation(
            "render backend 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("render-worker-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| StitchError::render(format!("failed to build rayon thread pool: {e}")))
}

/// Even dimensions with width exactly twice the height.
pub fn check_equirect_size(size: Size) -> StitchResult<()> {
    if size.area() == 0 {
        return Err(StitchError::validation("output size must be non-zero"));
    }
    if !size.width.is_multiple_of(2) || !size.height.is_multiple_of(2) {
        return Err(StitchError::validation(format!(
            "output {}x{} must have even dimensions",
            size.width, size.height
        )));
    }
    if size.width != size.height * 2 {
        return Err(StitchError::validation(format!(
            "output {}x{} must have a 2:1 aspect ratio",
            size.width, size.height
        )));
    }
    Ok(())
}

fn reproject_all(
    geometry: &[CameraGeometry],
    sources: &[&ImageBuf],
    reprojected: &mut Vec<ImageBuf>,
    parallel: bool,
) -> StitchResult<()> {
    reprojected.resize_with(sources.len(), || ImageBuf::new(0, 0, PixelFormat::Gray8));
    for ((g, src), dst) in geometry.iter().zip(sources).zip(reprojected.iter_mut()) {
        if parallel {
            reproject_par(src, &g.map, dst)?;
        } else {
            reproject(src, &g.map, dst)?;
        }
    }
    Ok(())
}

fn composite(
    compositor: &mut Compositor,
    geometry: &[CameraGeometry],
    reprojected: &mut Vec<ImageBuf>,
    sources: &[&ImageBuf],
    parallel: bool,
    out: &mut ImageBuf,
) -> StitchResult<()> {
    if let Compositor::Seam(seam) = compositor {
        let (a, b) = (&geometry[0].map, &geometry[1].map);
        return if parallel {
            seam.reproject_and_blend_par(sources[0], sources[1], a, b, out)
        } else {
            seam.reproject_and_blend(sources[0], sources[1], a, b, out)
        };
    }
    reproject_all(geometry, sources, reprojected, parallel)?;
    compositor.blend(reprojected, out)
}

impl RenderStage {
    #[tracing::instrument(skip_all, fields(cameras = geometry.len()))]
    pub fn prepare(geometry: Vec<CameraGeometry>, opts: RenderOpts) -> StitchResult<Self> {
        let first = geometry
            .first()
            .ok_or_else(|| StitchError::validation("render stage needs at least one camera"))?;
        let size = first.size();
        if opts.require_equirect_aspect {
            check_equirect_size(size)?;
        } else if size.area() == 0 {
            return Err(StitchError::validation("output size must be non-zero"));
        }
        if let Some((i, g)) = geometry
            .iter()
            .enumerate()
            .find(|(_, g)| g.map.size() != size || g.mask.size() != size)
        {
            return Err(StitchError::validation(format!(
                "camera {i} geometry is {}x{}, camera 0 is {}x{}",
                g.map.width(),
                g.map.height(),
                size.width,
                size.height
            )));
        }
        let cameras = geometry.len();
        let coverage: Vec<Mask> = geometry.iter().map(|g| g.mask.clone()).collect();

        let mut seam_mode = None;
        let mut linear_radius = None;
        let (compositor, default_masks) = match opts.blend {
            BlendChoice::Linear { radius } => {
                let mut b = LinearBlender::new(radius);
                b.prepare(&coverage, 0, 0)?;
                linear_radius = Some(radius);
                (Compositor::Linear(b), coverage)
            }
            BlendChoice::Seam(mode) => {
                if cameras != 2 {
                    return Err(StitchError::validation(format!(
                        "seam blending needs exactly 2 cameras, got {cameras}"
                    )));
                }
                let s = SeamBlender::prepare(&coverage[0], &coverage[1], mode)?;
                seam_mode = Some(mode);
                (Compositor::Seam(s), coverage)
            }
            BlendChoice::External {
                mut strategy,
                levels,
                min_side,
            } => {
                let unique = unique_masks(&coverage)?;
                strategy.prepare(&unique, levels, min_side)?;
                (Compositor::External(strategy), unique)
            }
        };

        let correction = match opts.correction {
            Correction::None => CorrectionState::None,
            Correction::Luts(luts) if luts.len() == cameras => CorrectionState::Ready(luts),
            Correction::Luts(luts) => {
                tracing::warn!(
                    luts = luts.len(),
                    cameras,
                    "LUT set does not match camera count; skipping correction"
                );
                CorrectionState::None
            }
            Correction::AutoGain(g) => CorrectionState::PendingGain(g),
            Correction::AutoHistogram(o) => CorrectionState::PendingHistogram(o),
        };

        let custom = match opts.custom_masks {
            Some(c) if !c.is_empty() => {
                c.validate(cameras, size)?;
                Some(c)
            }
            _ => None,
        };

        let threads = match opts.backend {
            ExecBackend::Serial => Some(1),
            ExecBackend::Parallel { threads } => threads,
        };
        let pool = Arc::new(build_thread_pool(threads)?);

        tracing::info!(
            width = size.width,
            height = size.height,
            cameras,
            backend = ?opts.backend,
            "render stage prepared"
        );
        Ok(Self {
            size,
            geometry,
            default_masks,
            seam_mode,
            linear_radius,
            compositor,
            backend: opts.backend,
            pool,
            correction,
            custom,
            custom_cache: None,
            corrected: Vec::new(),
            reprojected: Vec::new(),
            lut_warned: false,
            frames_rendered: 0,
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn cameras(&self) -> usize {
        self.geometry.len()
    }

    pub fn backend(&self) -> ExecBackend {
        self.backend
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// LUTs in effect, once known. Auto corrections resolve on the first rendered frame-set.
    pub fn luts(&self) -> Option<&[ChannelLuts]> {
        match &self.correction {
            CorrectionState::Ready(l) => Some(l),
            _ => None,
        }
    }

    fn is_parallel(&self) -> bool {
        matches!(self.backend, ExecBackend::Parallel { .. })
    }

    fn check_frames(&self, frames: &[&ImageBuf], timestamps_us: &[i64]) -> StitchResult<()> {
        if frames.len() != self.cameras() {
            return Err(StitchError::validation(format!(
                "render stage prepared for {} cameras, got {} frames",
                self.cameras(),
                frames.len()
            )));
        }
        if timestamps_us.len() != frames.len() {
            return Err(StitchError::validation(format!(
                "{} frames but {} timestamps",
                frames.len(),
                timestamps_us.len()
            )));
        }
        let format = frames[0].format;
        for (i, f) in frames.iter().enumerate() {
            if f.width == 0 || f.height == 0 {
                return Err(StitchError::validation(format!("frame {i} is empty")));
            }
            if f.format != format {
                return Err(StitchError::validation(format!(
                    "frame {i} is {:?}, frame 0 is {format:?}",
                    f.format
                )));
            }
        }
        Ok(())
    }

    /// Render one frame-set into `out`, which is re-shaped to the output size and frame format.
    pub fn render_into(
        &mut self,
        frames: &[&ImageBuf],
        timestamps_us: &[i64],
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        self.check_frames(frames, timestamps_us)?;
        let pool = Arc::clone(&self.pool);
        pool.install(|| self.render_frame(frames, timestamps_us, out))?;
        self.frames_rendered += 1;
        Ok(())
    }

    pub fn render(&mut self, frames: &[&ImageBuf], timestamps_us: &[i64]) -> StitchResult<ImageBuf> {
        let mut out = ImageBuf::new(0, 0, PixelFormat::Rgb8);
        self.render_into(frames, timestamps_us, &mut out)?;
        Ok(out)
    }

    fn derive_correction(&mut self, frames: &[&ImageBuf], out: &mut ImageBuf) -> StitchResult<()> {
        let parallel = self.is_parallel();
        let luts = match &self.correction {
            CorrectionState::PendingGain(g) => {
                reproject_all(&self.geometry, frames, &mut self.reprojected, parallel)?;
                let masks: Vec<Mask> = self.geometry.iter().map(|g| g.mask.clone()).collect();
                g.luts(&self.reprojected, &masks)?
            }
            CorrectionState::PendingHistogram(opts) => {
                reproject_all(&self.geometry, frames, &mut self.reprojected, parallel)?;
                self.compositor.blend(&self.reprojected, out)?;
                let masks: Vec<Mask> = self.geometry.iter().map(|g| g.mask.clone()).collect();
                let matcher =
                    HistogramGainMatcher::prepare(&masks, HISTOGRAM_EXTENSION_RADIUS, *opts)?;
                matcher.luts(&self.reprojected, out)?
            }
            CorrectionState::None | CorrectionState::Ready(_) => return Ok(()),
        };
        tracing::debug!(
            identity = luts.iter().filter(|l| l.is_identity()).count(),
            cameras = luts.len(),
            "tone correction derived from first frame-set"
        );
        self.correction = CorrectionState::Ready(luts);
        Ok(())
    }

    fn render_frame(
        &mut self,
        frames: &[&ImageBuf],
        timestamps_us: &[i64],
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        if matches!(
            self.correction,
            CorrectionState::PendingGain(_) | CorrectionState::PendingHistogram(_)
        ) {
            self.derive_correction(frames, out)?;
        }
        let parallel = self.is_parallel();

        let mut applied = vec![false; frames.len()];
        if let CorrectionState::Ready(luts) = &self.correction {
            self.corrected
                .resize_with(frames.len(), || ImageBuf::new(0, 0, PixelFormat::Gray8));
            for (i, (lut, frame)) in luts.iter().zip(frames).enumerate() {
                if lut.is_identity() {
                    continue;
                }
                match lut.apply_into(frame, &mut self.corrected[i]) {
                    Ok(()) => applied[i] = true,
                    Err(err) => {
                        if !self.lut_warned {
                            tracing::warn!(camera = i, %err, "skipping malformed LUT");
                            self.lut_warned = true;
                        }
                    }
                }
            }
        }
        let sources: Vec<&ImageBuf> = frames
            .iter()
            .zip(&applied)
            .enumerate()
            .map(|(i, (f, &a))| if a { &self.corrected[i] } else { *f })
            .collect();

        let active = self
            .custom
            .as_ref()
            .map(|c| c.active(timestamps_us))
            .filter(|a| a.iter().any(Option::is_some));
        let Some(active) = active else {
            return composite(
                &mut self.compositor,
                &self.geometry,
                &mut self.reprojected,
                &sources,
                parallel,
                out,
            );
        };

        if self
            .custom_cache
            .as_ref()
            .is_none_or(|c| c.active != active)
        {
            let custom = self
                .custom
                .as_ref()
                .ok_or_else(|| StitchError::render("custom mask state lost"))?;
            let masks: Vec<Mask> = custom
                .resolve(&active, &self.default_masks)
                .into_iter()
                .cloned()
                .collect();
            let compositor = if let Some(mode) = self.seam_mode {
                Some(Compositor::Seam(SeamBlender::prepare(
                    &masks[0], &masks[1], mode,
                )?))
            } else if let Some(radius) = self.linear_radius {
                let mut b = LinearBlender::new(radius);
                b.prepare(&masks, 0, 0)?;
                Some(Compositor::Linear(b))
            } else {
                None
            };
            tracing::debug!(?active, "custom masks re-prepared");
            self.custom_cache = Some(CustomCache {
                active,
                masks,
                compositor,
            });
        }

        let cache = self
            .custom_cache
            .as_mut()
            .ok_or_else(|| StitchError::render("custom mask cache missing"))?;
        match (&mut cache.compositor, &mut self.compositor) {
            (Some(c), _) => composite(
                c,
                &self.geometry,
                &mut self.reprojected,
                &sources,
                parallel,
                out,
            ),
            (None, Compositor::External(strategy)) => {
                reproject_all(&self.geometry, &sources, &mut self.reprojected, parallel)?;
                strategy.blend_with_masks(&self.reprojected, &cache.masks, out)
            }
            (None, other) => composite(
                other,
                &self.geometry,
                &mut self.reprojected,
                &sources,
                parallel,
                out,
            ),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/stage.rs"]
mod tests;
