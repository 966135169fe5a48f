use std::borrow::Cow;

use crate::foundation::core::{ImageBuf, Mask, PixelFormat, Size};
use crate::foundation::error::{StitchError, StitchResult};
use crate::imgproc::masks::{ExtendedMasks, extended_masks};
use crate::photometric::lut::{ChannelLuts, Lut};
use crate::photometric::ransac::{LineFit, RansacOpts, fit_line_ransac};

/// Default start radius for the extension-mask search.
pub const HISTOGRAM_EXTENSION_RADIUS: u32 = 50;

fn gray_of(img: &ImageBuf) -> Cow<'_, ImageBuf> {
    match img.format {
        PixelFormat::Gray8 => Cow::Borrowed(img),
        _ => Cow::Owned(img.to_gray()),
    }
}

/// Fits a per-camera linear tone mapping against a reference composite.
///
/// Each camera is compared to the reference only inside its extension mask, so the paired samples
/// come from pixels the camera actually shaped in the composite.
#[derive(Clone, Debug)]
pub struct HistogramGainMatcher {
    size: Size,
    extended: ExtendedMasks,
    opts: RansacOpts,
}

impl HistogramGainMatcher {
    #[tracing::instrument(skip(masks, opts), fields(cameras = masks.len()))]
    pub fn prepare(masks: &[Mask], radius: u32, opts: RansacOpts) -> StitchResult<Self> {
        let extended = extended_masks(masks, radius)?;
        let size = masks[0].size();
        Ok(Self {
            size,
            extended,
            opts,
        })
    }

    pub fn extension_masks(&self) -> &[Mask] {
        &self.extended.masks
    }

    pub fn extension_radius(&self) -> u32 {
        self.extended.radius
    }

    pub fn cameras(&self) -> usize {
        self.extended.masks.len()
    }

    /// Linear fit of `reference` intensities against `source` intensities inside the extension
    /// mask of `camera`.
    pub fn fit(
        &self,
        camera: usize,
        source: &ImageBuf,
        reference: &ImageBuf,
    ) -> StitchResult<(Lut, LineFit)> {
        let mask = self.extended.masks.get(camera).ok_or_else(|| {
            StitchError::validation(format!(
                "camera {camera} out of range for {} extension masks",
                self.cameras()
            ))
        })?;
        for (what, im) in [("source", source), ("reference", reference)] {
            if im.size() != self.size {
                return Err(StitchError::validation(format!(
                    "{what} image is {}x{}, masks are {}x{}",
                    im.width, im.height, self.size.width, self.size.height
                )));
            }
        }

        let pairs = sample_pairs(&gray_of(source), &gray_of(reference), mask);
        let fit = fit_line_ransac(&pairs, &self.opts)?;
        let (slope, intercept) = fit.line.slope_intercept()?;
        tracing::debug!(camera, slope, intercept, inliers = fit.inliers, "histogram gain fit");
        Ok((Lut::linear(slope, intercept), fit))
    }

    /// One LUT per camera. Cameras whose fit fails keep an identity LUT.
    pub fn luts(&self, sources: &[ImageBuf], reference: &ImageBuf) -> StitchResult<Vec<ChannelLuts>> {
        if sources.len() != self.cameras() {
            return Err(StitchError::validation(format!(
                "histogram matcher prepared for {} cameras, got {} images",
                self.cameras(),
                sources.len()
            )));
        }
        let reference = gray_of(reference);
        let mut out = Vec::with_capacity(sources.len());
        for (i, src) in sources.iter().enumerate() {
            match self.fit(i, src, &reference) {
                Ok((lut, _)) => out.push(ChannelLuts::Uniform(lut)),
                Err(StitchError::Validation(msg)) => return Err(StitchError::Validation(msg)),
                Err(err) => {
                    tracing::warn!(camera = i, %err, "histogram gain fit failed; keeping identity");
                    out.push(ChannelLuts::identity());
                }
            }
        }
        Ok(out)
    }
}

/// `(source, reference)` intensity pairs at every set pixel of `mask`.
pub fn sample_pairs(source: &ImageBuf, reference: &ImageBuf, mask: &Mask) -> Vec<[f64; 2]> {
    source
        .data
        .iter()
        .zip(&reference.data)
        .zip(mask.as_slice())
        .filter(|(_, m)| **m != 0)
        .map(|((&s, &r), _)| [f64::from(s), f64::from(r)])
        .collect()
}

fn cumulative_histogram(image: &ImageBuf, mask: &Mask) -> [f64; 256] {
    let mut counts = [0u64; 256];
    for (&v, &m) in image.data.iter().zip(mask.as_slice()) {
        if m != 0 {
            counts[v as usize] += 1;
        }
    }
    for i in 1..256 {
        counts[i] += counts[i - 1];
    }
    let total = counts[255].max(1) as f64;
    let mut out = [0.0f64; 256];
    for (o, c) in out.iter_mut().zip(counts) {
        *o = c as f64 / total;
    }
    out
}

/// Histogram-specification LUT mapping `src` tones onto `dst` tones over the shared coverage.
pub fn histogram_specification_lut(
    src: &ImageBuf,
    src_mask: &Mask,
    dst: &ImageBuf,
    dst_mask: &Mask,
) -> StitchResult<Lut> {
    let size = src.size();
    if dst.size() != size || src_mask.size() != size || dst_mask.size() != size {
        return Err(StitchError::validation(
            "histogram specification needs equally sized images and masks",
        ));
    }
    let shared = src_mask.and(dst_mask);
    if shared.is_empty() {
        return Err(StitchError::validation(
            "histogram specification needs overlapping masks",
        ));
    }
    let src_cdf = cumulative_histogram(&gray_of(src), &shared);
    let dst_cdf = cumulative_histogram(&gray_of(dst), &shared);

    let mut t = [0u8; 256];
    for (out, &v) in t.iter_mut().zip(src_cdf.iter()) {
        let mut best = 0usize;
        let mut best_diff = (v - dst_cdf[0]).abs();
        for (j, &d) in dst_cdf.iter().enumerate().skip(1) {
            let diff = (v - d).abs();
            if diff < best_diff {
                best = j;
                best_diff = diff;
            }
        }
        *out = best as u8;
    }
    Ok(Lut(t))
}

#[cfg(test)]
#[path = "../../tests/unit/photometric/histogram.rs"]
mod tests;
