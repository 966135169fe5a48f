use crate::foundation::error::{StitchError, StitchResult};
use rayon::prelude::*;

/// Separable Gaussian blur of a single-channel 8-bit plane with edge clamping.
///
/// Used on 0/255 masks to build soft transitions, so it runs on the `u8` grid with a Q16 kernel
/// rather than in floating point.
pub fn blur_plane(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> StitchResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| StitchError::render("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(StitchError::validation(
            "blur_plane expects src matching width*height",
        ));
    }
    if radius == 0 || expected_len == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    horizontal_pass(src, &mut tmp, width, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Ok(out)
}

/// Blur with the `(2r+1, sigma = r/3)` window used throughout mask construction.
pub fn blur_mask_plane(src: &[u8], width: u32, height: u32, radius: u32) -> StitchResult<Vec<u8>> {
    blur_plane(src, width, height, radius, radius as f32 / 3.0)
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> StitchResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(StitchError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(StitchError::render("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Fold rounding drift into the center tap so the kernel sums to exactly 1.0.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }

    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as usize;
    dst.par_chunks_mut(w)
        .zip(src.par_chunks(w))
        .for_each(|(out_row, row)| {
            let last = w as i32 - 1;
            for (x, out) in out_row.iter_mut().enumerate() {
                let mut acc = 0u64;
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x as i32 + ki as i32 - radius).clamp(0, last);
                    acc += u64::from(kw) * u64::from(row[sx as usize]);
                }
                *out = q16_to_u8(acc);
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as usize;
    let last = height as i32 - 1;
    dst.par_chunks_mut(w).enumerate().for_each(|(y, out_row)| {
        for (x, out) in out_row.iter_mut().enumerate() {
            let mut acc = 0u64;
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y as i32 + ki as i32 - radius).clamp(0, last);
                acc += u64::from(kw) * u64::from(src[sy as usize * w + x]);
            }
            *out = q16_to_u8(acc);
        }
    });
}

fn q16_to_u8(acc: u64) -> u8 {
    let v = (acc + 32768) >> 16;
    v.min(255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/imgproc/blur.rs"]
mod tests;
