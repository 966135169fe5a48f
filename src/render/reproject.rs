use rayon::prelude::*;

use crate::foundation::core::{ImageBuf, SampleMap};
use crate::foundation::error::{StitchError, StitchResult};

const FRAC_SHIFT: u32 = 10;
const FRAC_UNIT: u32 = 1 << FRAC_SHIFT;

/// Bilinear 4-tap sample of `src` at `(x, y)` written into `out` (one pixel, `src` channels).
///
/// Neighbours are edge-clamped. Coordinates more than half a pixel outside the image, or NaN,
/// yield `false` and leave `out` untouched.
#[inline]
pub fn sample_bilinear(src: &ImageBuf, x: f32, y: f32, out: &mut [u8]) -> bool {
    let w = src.width;
    let h = src.height;
    if w == 0 || h == 0 {
        return false;
    }
    let (wf, hf) = (w as f32, h as f32);
    // NaN fails every comparison and lands here too.
    if !(x >= -0.5 && x <= wf - 0.5 && y >= -0.5 && y <= hf - 0.5) {
        return false;
    }

    let xc = x.clamp(0.0, wf - 1.0);
    let yc = y.clamp(0.0, hf - 1.0);
    let x0 = xc.floor() as u32;
    let y0 = yc.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = ((xc - x0 as f32) * FRAC_UNIT as f32).round() as u32;
    let fy = ((yc - y0 as f32) * FRAC_UNIT as f32).round() as u32;
    let w00 = (FRAC_UNIT - fx) * (FRAC_UNIT - fy);
    let w01 = fx * (FRAC_UNIT - fy);
    let w10 = (FRAC_UNIT - fx) * fy;
    let w11 = fx * fy;

    let c = src.channels();
    let stride = src.row_bytes();
    let i00 = y0 as usize * stride + x0 as usize * c;
    let i01 = y0 as usize * stride + x1 as usize * c;
    let i10 = y1 as usize * stride + x0 as usize * c;
    let i11 = y1 as usize * stride + x1 as usize * c;
    let d = &src.data;
    for (k, o) in out.iter_mut().enumerate().take(c) {
        let acc = u32::from(d[i00 + k]) * w00
            + u32::from(d[i01 + k]) * w01
            + u32::from(d[i10 + k]) * w10
            + u32::from(d[i11 + k]) * w11;
        *o = ((acc + (1 << (2 * FRAC_SHIFT - 1))) >> (2 * FRAC_SHIFT)) as u8;
    }
    true
}

fn reproject_row(src: &ImageBuf, coords: &[[f32; 2]], row: &mut [u8]) {
    let c = src.channels();
    for (px, &[x, y]) in row.chunks_exact_mut(c).zip(coords) {
        if !sample_bilinear(src, x, y, px) {
            px.fill(0);
        }
    }
}

fn prepare_out(src: &ImageBuf, map: &SampleMap, out: &mut ImageBuf) -> StitchResult<()> {
    if src.width == 0 || src.height == 0 {
        return Err(StitchError::validation("cannot reproject an empty source image"));
    }
    out.reshape(map.width(), map.height(), src.format);
    Ok(())
}

/// Resample `src` through `map` into `out` (re-shaped to the map size, source format).
pub fn reproject(src: &ImageBuf, map: &SampleMap, out: &mut ImageBuf) -> StitchResult<()> {
    prepare_out(src, map, out)?;
    let row_bytes = out.row_bytes();
    if row_bytes == 0 {
        return Ok(());
    }
    for (y, row) in out.data.chunks_exact_mut(row_bytes).enumerate() {
        reproject_row(src, map.row(y as u32), row);
    }
    Ok(())
}

/// Row-parallel [`reproject`] on the current rayon pool.
pub fn reproject_par(src: &ImageBuf, map: &SampleMap, out: &mut ImageBuf) -> StitchResult<()> {
    prepare_out(src, map, out)?;
    let row_bytes = out.row_bytes();
    if row_bytes == 0 {
        return Ok(());
    }
    out.data
        .par_chunks_exact_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| reproject_row(src, map.row(y as u32), row));
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/render/reproject.rs"]
mod tests;
