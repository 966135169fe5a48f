use crate::foundation::core::{Mask, Size};
use crate::foundation::error::{StitchError, StitchResult};
use crate::imgproc::blur::blur_mask_plane;
use crate::imgproc::distance::distance_l1;

/// Check that `masks` is non-empty and every mask shares one size.
pub fn validate_masks(masks: &[Mask]) -> StitchResult<Size> {
    let first = masks
        .first()
        .ok_or_else(|| StitchError::validation("at least one mask is required"))?;
    let size = first.size();
    if size.area() == 0 {
        return Err(StitchError::validation("masks must be non-empty images"));
    }
    if let Some((i, m)) = masks.iter().enumerate().find(|(_, m)| m.size() != size) {
        return Err(StitchError::validation(format!(
            "mask {i} is {}x{}, expected {}x{}",
            m.width(),
            m.height(),
            size.width,
            size.height
        )));
    }
    Ok(size)
}

/// Split overlapping coverage so every covered pixel belongs to exactly one camera.
///
/// A pixel goes to the camera it sits deepest inside (largest L1 distance to that camera's mask
/// boundary); on ties the later camera wins.
pub fn unique_masks(masks: &[Mask]) -> StitchResult<Vec<Mask>> {
    let size = validate_masks(masks)?;
    let dists: Vec<Vec<u32>> = masks.iter().map(distance_l1).collect();
    let mut out: Vec<Mask> = masks
        .iter()
        .map(|_| Mask::new(size.width, size.height))
        .collect();

    for y in 0..size.height {
        for x in 0..size.width {
            let idx = (y as usize) * (size.width as usize) + x as usize;
            let mut best: Option<(usize, u32)> = None;
            for (i, m) in masks.iter().enumerate() {
                if !m.is_set(idx) {
                    continue;
                }
                let d = dists[i][idx];
                if best.is_none_or(|(_, bd)| d >= bd) {
                    best = Some((i, d));
                }
            }
            if let Some((i, _)) = best {
                out[i].set(x, y, true);
            }
        }
    }
    Ok(out)
}

/// Extension masks: each camera's unique region grown outwards by blurring.
#[derive(Clone, Debug)]
pub struct ExtendedMasks {
    pub masks: Vec<Mask>,
    /// Blur radius that satisfied the containment check (or the smallest one tried).
    pub radius: u32,
}

/// Grow every unique region by Gaussian dilation without leaving its own coverage.
///
/// Radii are tried from `radius` downwards in steps of 2; the first radius where no blurred
/// unique region has energy outside its camera's mask wins.
#[tracing::instrument(skip(masks), fields(cameras = masks.len()))]
pub fn extended_masks(masks: &[Mask], radius: u32) -> StitchResult<ExtendedMasks> {
    if radius == 0 {
        return Err(StitchError::validation("extension radius must be >= 1"));
    }
    let size = validate_masks(masks)?;
    let unique = unique_masks(masks)?;

    let mut r = radius;
    let blurred = loop {
        let blurred = unique
            .iter()
            .map(|u| blur_mask_plane(u.as_slice(), size.width, size.height, r))
            .collect::<StitchResult<Vec<_>>>()?;
        let contained = blurred.iter().zip(masks).all(|(b, m)| {
            b.iter()
                .zip(m.as_slice())
                .all(|(&bv, &mv)| bv == 0 || mv != 0)
        });
        if contained || r <= 2 {
            if !contained {
                tracing::debug!(radius = r, "extension masks still leak at smallest radius");
            }
            break blurred;
        }
        r -= 2;
    };

    tracing::debug!(radius = r, "extension masks ready");
    Ok(ExtendedMasks {
        masks: blurred
            .iter()
            .map(|b| Mask::from_plane(size.width, size.height, b))
            .collect(),
        radius: r,
    })
}

/// For each camera, the union of its overlaps with every other camera.
pub fn overlap_masks(masks: &[Mask]) -> StitchResult<Vec<Mask>> {
    let size = validate_masks(masks)?;
    let mut out = Vec::with_capacity(masks.len());
    for (i, mi) in masks.iter().enumerate() {
        let mut acc = Mask::new(size.width, size.height);
        for (j, mj) in masks.iter().enumerate() {
            if i != j {
                acc = acc.or(&mi.and(mj));
            }
        }
        out.push(acc);
    }
    Ok(out)
}

/// Per-camera float weights for feathered accumulation.
///
/// Unique regions are blurred with `radius`, clipped to each camera's coverage, and normalized so
/// the weights of every covered pixel sum to 1.
#[tracing::instrument(skip(masks), fields(cameras = masks.len()))]
pub fn linear_blend_weights(masks: &[Mask], radius: u32) -> StitchResult<Vec<Vec<f32>>> {
    let size = validate_masks(masks)?;
    let unique = unique_masks(masks)?;
    let mut weights = Vec::with_capacity(masks.len());
    for (u, m) in unique.iter().zip(masks) {
        let blurred = if radius == 0 {
            u.as_slice().to_vec()
        } else {
            blur_mask_plane(u.as_slice(), size.width, size.height, radius)?
        };
        weights.push(
            blurred
                .iter()
                .zip(m.as_slice())
                .map(|(&b, &mv)| if mv != 0 { f32::from(b) } else { 0.0 })
                .collect::<Vec<f32>>(),
        );
    }

    for idx in 0..size.area() {
        let sum: f32 = weights.iter().map(|w| w[idx]).sum();
        for w in weights.iter_mut() {
            w[idx] = if sum > 0.0 { w[idx] / sum } else { 0.0 };
        }
    }
    Ok(weights)
}

#[cfg(test)]
#[path = "../../tests/unit/imgproc/masks.rs"]
mod tests;
