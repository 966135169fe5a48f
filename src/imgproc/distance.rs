use crate::foundation::core::Mask;

/// Distance assigned to set pixels that have no unset pixel anywhere in the image.
pub const DIST_INF: u32 = u32::MAX / 2;

/// City-block (L1) distance from every set pixel to the nearest unset pixel.
///
/// Unset pixels are 0. Pixels outside the image do not count as unset, so a fully covered mask
/// yields [`DIST_INF`] everywhere.
pub fn distance_l1(mask: &Mask) -> Vec<u32> {
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    let src = mask.as_slice();
    let mut d: Vec<u32> = src
        .iter()
        .map(|&v| if v != 0 { DIST_INF } else { 0 })
        .collect();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if d[i] == 0 {
                continue;
            }
            let mut best = d[i];
            if x > 0 {
                best = best.min(d[i - 1].saturating_add(1));
            }
            if y > 0 {
                best = best.min(d[i - w].saturating_add(1));
            }
            d[i] = best.min(DIST_INF);
        }
    }
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let i = y * w + x;
            if d[i] == 0 {
                continue;
            }
            let mut best = d[i];
            if x + 1 < w {
                best = best.min(d[i + 1].saturating_add(1));
            }
            if y + 1 < h {
                best = best.min(d[i + w].saturating_add(1));
            }
            d[i] = best.min(DIST_INF);
        }
    }
    d
}
