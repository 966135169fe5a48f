use nalgebra::{DMatrix, DVector};

use crate::foundation::core::{ImageBuf, Mask, PixelFormat};
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::saturate_u8;
use crate::imgproc::masks::{extended_masks, overlap_masks, unique_masks, validate_masks};
use crate::photometric::lut::{ChannelLuts, Lut};

/// Radius used to grow unique regions before collecting overlap statistics.
pub const GAIN_EXTENSION_RADIUS: u32 = 100;

/// Gains this close to 1 use a straight linear LUT instead of the Bézier tone curve.
const LINEAR_LUT_EPS: f64 = 0.02;

/// Weighting model for the gain system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GainModel {
    /// Pairwise consistency plus a prior pulling every gain toward 1.
    Smoothness,
    /// Adds a direct-observation term matching each camera to its neighbor's absolute intensity.
    SmoothnessWithObservation,
}

/// Solver weights. The model has no default and must be chosen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GainSolverOpts {
    pub model: GainModel,
    /// Weight of the pairwise intensity-consistency term.
    pub inv_sigma_noise_sq: f64,
    /// Weight of the gain-equals-one prior.
    pub inv_sigma_gain_sq: f64,
    /// Weight of the direct-observation term (only used by `SmoothnessWithObservation`).
    pub inv_sigma_obs_sq: f64,
}

impl GainSolverOpts {
    pub fn new(model: GainModel) -> Self {
        Self {
            model,
            inv_sigma_noise_sq: 0.01,
            inv_sigma_gain_sq: 100.0,
            inv_sigma_obs_sq: 1.0,
        }
    }
}

/// Outcome of a gain solve.
#[derive(Clone, Debug, PartialEq)]
pub enum GainSolve {
    Solved(Vec<f64>),
    /// The system was singular or produced unusable gains.
    Degenerate { cameras: usize },
}

impl GainSolve {
    /// Gains to apply; a degenerate solve falls back to identity.
    pub fn gains(&self) -> Vec<f64> {
        match self {
            Self::Solved(g) => g.clone(),
            Self::Degenerate { cameras } => vec![1.0; *cameras],
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. })
    }
}

/// Least-squares exposure gains from overlap statistics.
#[derive(Clone, Copy, Debug)]
pub struct GainSolver {
    opts: GainSolverOpts,
}

impl GainSolver {
    pub fn new(opts: GainSolverOpts) -> Self {
        Self { opts }
    }

    pub fn opts(&self) -> GainSolverOpts {
        self.opts
    }

    /// Solve one gain per camera from Gray8 `images` over the pairwise intersections of `masks`.
    #[tracing::instrument(skip_all, fields(cameras = images.len(), model = ?self.opts.model))]
    pub fn solve(&self, images: &[ImageBuf], masks: &[Mask]) -> StitchResult<GainSolve> {
        validate_inputs(images, masks, Some(PixelFormat::Gray8))?;
        let planes: Vec<&[u8]> = images.iter().map(|im| im.data.as_slice()).collect();
        Ok(self.solve_planes(&planes, masks))
    }

    /// Solve R, G and B independently. Degenerate channels fall back to 1.0.
    #[tracing::instrument(skip_all, fields(cameras = images.len(), model = ?self.opts.model))]
    pub fn solve_per_channel(
        &self,
        images: &[ImageBuf],
        masks: &[Mask],
    ) -> StitchResult<Vec<[f64; 3]>> {
        validate_inputs(images, masks, None)?;
        if let Some(im) = images.iter().find(|im| im.format.color_channels() != 3) {
            return Err(StitchError::validation(format!(
                "per-channel gain solve needs color images, got {:?}",
                im.format
            )));
        }

        let mut out = vec![[1.0f64; 3]; images.len()];
        for c in 0..3 {
            let planes = images
                .iter()
                .map(|im| im.channel_plane(c))
                .collect::<StitchResult<Vec<_>>>()?;
            let views: Vec<&[u8]> = planes.iter().map(|p| p.data.as_slice()).collect();
            let gains = self.solve_planes(&views, masks).gains();
            for (o, g) in out.iter_mut().zip(gains) {
                o[c] = g;
            }
        }
        Ok(out)
    }

    fn solve_planes(&self, planes: &[&[u8]], masks: &[Mask]) -> GainSolve {
        let n = planes.len();
        let (a, b) = self.build_system(planes, masks);

        let Some(x) = a.lu().solve(&b) else {
            tracing::warn!(cameras = n, "gain system is singular; using identity gains");
            return GainSolve::Degenerate { cameras: n };
        };
        let gains: Vec<f64> = x.iter().copied().collect();
        if gains.iter().any(|g| !g.is_finite() || *g <= 0.0) {
            tracing::warn!(?gains, "gain solve produced unusable gains; using identity gains");
            return GainSolve::Degenerate { cameras: n };
        }
        tracing::debug!(?gains, "gain solve");
        GainSolve::Solved(gains)
    }

    fn build_system(&self, planes: &[&[u8]], masks: &[Mask]) -> (DMatrix<f64>, DVector<f64>) {
        let n = planes.len();
        let alpha = self.opts.inv_sigma_noise_sq;
        let beta = self.opts.inv_sigma_gain_sq;
        let delta = match self.opts.model {
            GainModel::Smoothness => 0.0,
            GainModel::SmoothnessWithObservation => self.opts.inv_sigma_obs_sq,
        };

        let mut a = DMatrix::<f64>::zeros(n, n);
        let mut b = DVector::<f64>::zeros(n);
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let (mi, mj) = (masks[i].as_slice(), masks[j].as_slice());
                for idx in 0..mi.len() {
                    if mi[idx] == 0 || mj[idx] == 0 {
                        continue;
                    }
                    let vi = f64::from(planes[i][idx]);
                    let vj = f64::from(planes[j][idx]);
                    a[(i, i)] += vi * vi * (alpha + delta) + beta;
                    a[(j, j)] += vj * vj * (alpha + delta);
                    a[(i, j)] -= 2.0 * vi * vj * alpha;
                    b[i] += beta + vi * vj * delta;
                    b[j] += vi * vj * delta;
                }
            }
        }
        (a, b)
    }
}

fn validate_inputs(
    images: &[ImageBuf],
    masks: &[Mask],
    format: Option<PixelFormat>,
) -> StitchResult<()> {
    if images.len() < 2 {
        return Err(StitchError::validation(
            "gain solve needs at least two cameras",
        ));
    }
    if images.len() != masks.len() {
        return Err(StitchError::validation(format!(
            "gain solve got {} images but {} masks",
            images.len(),
            masks.len()
        )));
    }
    let size = validate_masks(masks)?;
    for (i, im) in images.iter().enumerate() {
        if im.size() != size {
            return Err(StitchError::validation(format!(
                "image {i} is {}x{}, masks are {}x{}",
                im.width, im.height, size.width, size.height
            )));
        }
        if let Some(f) = format
            && im.format != f
        {
            return Err(StitchError::validation(format!(
                "image {i} has format {:?}, expected {f:?}",
                im.format
            )));
        }
    }
    Ok(())
}

/// Camera with the highest mean Gray8 intensity inside its mask.
pub fn reference_camera(images: &[ImageBuf], masks: &[Mask]) -> StitchResult<usize> {
    validate_inputs(images, masks, Some(PixelFormat::Gray8))?;
    let mut best = (0usize, f64::NEG_INFINITY);
    for (i, (im, m)) in images.iter().zip(masks).enumerate() {
        let (sum, count) = im
            .data
            .iter()
            .zip(m.as_slice())
            .filter(|(_, mv)| **mv != 0)
            .fold((0u64, 0u64), |(s, c), (v, _)| (s + u64::from(*v), c + 1));
        if count == 0 {
            continue;
        }
        let mean = sum as f64 / count as f64;
        if mean > best.1 {
            best = (i, mean);
        }
    }
    Ok(best.0)
}

/// Scale gains so that `gains[reference] == 1.0`.
pub fn rescale(gains: &mut [f64], reference: usize) -> StitchResult<()> {
    let k = *gains.get(reference).ok_or_else(|| {
        StitchError::validation(format!(
            "reference camera {reference} out of range for {} gains",
            gains.len()
        ))
    })?;
    if !k.is_finite() || k <= 0.0 {
        return Err(StitchError::validation(format!(
            "reference gain must be positive, got {k}"
        )));
    }
    let scale = 1.0 / k;
    for g in gains.iter_mut() {
        *g *= scale;
    }
    gains[reference] = 1.0;
    Ok(())
}

/// Tone curve applying gain `k`.
///
/// Near 1 this is a linear scale. Otherwise it is a quadratic Bézier through (0,0) and (255,255)
/// whose control point makes the curve leave the origin with slope `k`, so highlights never clip.
pub fn gain_lut(k: f64) -> StitchResult<Lut> {
    if !k.is_finite() || k <= 0.0 {
        return Err(StitchError::validation(format!(
            "gain must be finite and > 0, got {k}"
        )));
    }
    if (k - 1.0).abs() < LINEAR_LUT_EPS {
        return Ok(Lut::linear(k, 0.0));
    }

    let p0 = (0.0f64, 0.0f64);
    let p1 = if k > 1.0 {
        (255.0 / k, 255.0)
    } else {
        (255.0, 255.0 * k)
    };
    let p2 = (255.0f64, 255.0f64);

    let mut t = [0u8; 256];
    t[255] = 255;
    let a = p0.0 + p2.0 - 2.0 * p1.0;
    let b = 2.0 * (p1.0 - p0.0);
    for (i, out) in t.iter_mut().enumerate().take(255).skip(1) {
        let c = p0.0 - i as f64;
        let s = bezier_root(a, b, c);
        let y = (1.0 - s) * (1.0 - s) * p0.1 + 2.0 * (1.0 - s) * s * p1.1 + s * s * p2.1;
        *out = saturate_u8((y + 0.5).floor());
    }
    Ok(Lut(t))
}

/// Root of `a t^2 + b t + c = 0` lying in `[0, 1]`.
fn bezier_root(a: f64, b: f64, c: f64) -> f64 {
    if a.abs() < 1e-9 {
        return (-c / b).clamp(0.0, 1.0);
    }
    let disc = (b * b - 4.0 * a * c).max(0.0).sqrt();
    let m = -b / (2.0 * a);
    let n = disc / (2.0 * a);
    let (r0, r1) = (m - n, m + n);
    const TOL: f64 = 1e-9;
    if (-TOL..=1.0 + TOL).contains(&r0) {
        r0.clamp(0.0, 1.0)
    } else {
        r1.clamp(0.0, 1.0)
    }
}

/// How the automatic gain correction is derived.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GainCorrection {
    pub solver: GainSolverOpts,
    /// Solve R, G, B separately instead of on luma.
    pub per_channel: bool,
    /// Pin the brightest camera (by mean over its unique region) to gain 1.
    pub fix_reference: bool,
}

impl GainCorrection {
    pub fn new(model: GainModel) -> Self {
        Self {
            solver: GainSolverOpts::new(model),
            per_channel: false,
            fix_reference: false,
        }
    }

    /// Derive one LUT set per camera from reprojected `images` covering `masks`.
    #[tracing::instrument(skip_all, fields(cameras = images.len()))]
    pub fn luts(&self, images: &[ImageBuf], masks: &[Mask]) -> StitchResult<Vec<ChannelLuts>> {
        validate_inputs(images, masks, None)?;
        let ext = extended_masks(masks, GAIN_EXTENSION_RADIUS)?;
        let overlaps = overlap_masks(&ext.masks)?;
        let gray: Vec<ImageBuf> = images.iter().map(ImageBuf::to_gray).collect();
        let reference = if self.fix_reference {
            Some(reference_camera(&gray, &unique_masks(masks)?)?)
        } else {
            None
        };
        let solver = GainSolver::new(self.solver);

        if self.per_channel && images.iter().all(|im| im.format.color_channels() == 3) {
            let mut gains = solver.solve_per_channel(images, &overlaps)?;
            if let Some(r) = reference {
                for c in 0..3 {
                    let mut col: Vec<f64> = gains.iter().map(|g| g[c]).collect();
                    rescale(&mut col, r)?;
                    for (g, v) in gains.iter_mut().zip(col) {
                        g[c] = v;
                    }
                }
            }
            return gains
                .iter()
                .map(|g| {
                    Ok(ChannelLuts::PerChannel([
                        gain_lut(g[0])?,
                        gain_lut(g[1])?,
                        gain_lut(g[2])?,
                    ]))
                })
                .collect();
        }

        let solve = solver.solve(&gray, &overlaps)?;
        let mut gains = solve.gains();
        if let Some(r) = reference
            && !solve.is_degenerate()
        {
            rescale(&mut gains, r)?;
        }
        gains
            .iter()
            .map(|&g| Ok(ChannelLuts::Uniform(gain_lut(g)?)))
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/photometric/gain.rs"]
mod tests;
