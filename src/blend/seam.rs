use rayon::prelude::*;

use crate::foundation::core::{ImageBuf, Mask, SampleMap, Size};
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::{BLEND_SHIFT, BLEND_UNIT};
use crate::imgproc::blur::blur_mask_plane;
use crate::imgproc::distance::distance_l1;
use crate::render::reproject::sample_bilinear;

/// How the two-camera transition band is sized.
///
/// There is no default: callers pick a mode and radius explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SeamMode {
    /// Fixed blur radius around the seam.
    Fast { radius: u32 },
    /// Largest radius (stepping down by 2 from `initial_radius`) whose transition band stays
    /// inside both cameras' coverage.
    Smart { initial_radius: u32 },
}

impl SeamMode {
    pub const FAST_RADIUS: u32 = 20;
    pub const SMART_INITIAL_RADIUS: u32 = 50;
}

/// Which camera(s) an output pixel is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelClass {
    OwnerA,
    OwnerB,
    Mixed,
}

/// Per-class pixel counts of a prepared blender.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub owner_a: usize,
    pub owner_b: usize,
    pub mixed: usize,
}

/// Two-camera seam blender working on precomputed ownership and fixed-point weight maps.
///
/// Every pixel has exactly one [`PixelClass`]. On `Mixed` pixels the two weights sum to
/// [`BLEND_UNIT`]; owner pixels carry `(BLEND_UNIT, 0)` or `(0, BLEND_UNIT)`. Pixels outside both
/// masks are classed `OwnerA`.
#[derive(Clone, Debug)]
pub struct SeamBlender {
    size: Size,
    radius: u32,
    classes: Vec<PixelClass>,
    weights_a: Vec<i32>,
    weights_b: Vec<i32>,
}

impl SeamBlender {
    #[tracing::instrument(skip(mask_a, mask_b))]
    pub fn prepare(mask_a: &Mask, mask_b: &Mask, mode: SeamMode) -> StitchResult<Self> {
        let size = mask_a.size();
        if size.area() == 0 {
            return Err(StitchError::validation("seam masks must be non-empty"));
        }
        if mask_b.size() != size {
            return Err(StitchError::validation(format!(
                "seam masks differ in size: {}x{} vs {}x{}",
                size.width,
                size.height,
                mask_b.width(),
                mask_b.height()
            )));
        }

        let dist_a = distance_l1(mask_a);
        let dist_b = distance_l1(mask_b);
        let sel: Vec<bool> = dist_a.iter().zip(&dist_b).map(|(a, b)| a > b).collect();
        let (ma, mb) = (mask_a.as_slice(), mask_b.as_slice());
        let excl_a: Vec<u8> = sel
            .iter()
            .zip(ma)
            .map(|(&s, &m)| if s && m != 0 { 255 } else { 0 })
            .collect();
        let excl_b: Vec<u8> = sel
            .iter()
            .zip(mb)
            .map(|(&s, &m)| if !s && m != 0 { 255 } else { 0 })
            .collect();

        let (w, h) = (size.width, size.height);
        let (radius, mut blur_a, mut blur_b) = match mode {
            SeamMode::Fast { radius } => {
                if radius == 0 {
                    return Err(StitchError::validation("seam radius must be >= 1"));
                }
                (
                    radius,
                    blur_mask_plane(&excl_a, w, h, radius)?,
                    blur_mask_plane(&excl_b, w, h, radius)?,
                )
            }
            SeamMode::Smart { initial_radius } => {
                if initial_radius == 0 {
                    return Err(StitchError::validation("seam initial radius must be >= 1"));
                }
                // Pixels each camera's band must not reach: the other camera's side of the
                // seam where this camera has no coverage.
                let territory_a: Vec<bool> =
                    sel.iter().zip(ma).map(|(&s, &m)| !s && m == 0).collect();
                let territory_b: Vec<bool> =
                    sel.iter().zip(mb).map(|(&s, &m)| s && m == 0).collect();
                let leaks = |blurred: &[u8], territory: &[bool]| {
                    blurred.iter().zip(territory).any(|(&v, &t)| v != 0 && t)
                };

                let mut r = initial_radius;
                loop {
                    let ba = blur_mask_plane(&excl_a, w, h, r)?;
                    let bb = blur_mask_plane(&excl_b, w, h, r)?;
                    let fits = !leaks(&ba, &territory_a) && !leaks(&bb, &territory_b);
                    if fits || r <= 2 {
                        if !fits {
                            tracing::debug!(radius = r, "seam band still leaks at smallest radius");
                        }
                        break (r, ba, bb);
                    }
                    r -= 2;
                }
            }
        };
        tracing::debug!(radius, "seam radius chosen");

        for (v, &m) in blur_a.iter_mut().zip(ma) {
            if m == 0 {
                *v = 0;
            }
        }
        for (v, &m) in blur_b.iter_mut().zip(mb) {
            if m == 0 {
                *v = 0;
            }
        }

        let n = size.area();
        let mut classes = Vec::with_capacity(n);
        let mut weights_a = Vec::with_capacity(n);
        let mut weights_b = Vec::with_capacity(n);
        for (&a, &b) in blur_a.iter().zip(&blur_b) {
            let sum = u32::from(a) + u32::from(b);
            if sum == 0 {
                classes.push(PixelClass::OwnerA);
                weights_a.push(BLEND_UNIT);
                weights_b.push(0);
                continue;
            }
            let wa = f64::from(a) / f64::from(sum);
            let iwa = (wa * f64::from(BLEND_UNIT) + 0.5) as i32;
            let iwb = BLEND_UNIT - iwa;
            classes.push(if iwa == BLEND_UNIT {
                PixelClass::OwnerA
            } else if iwb == BLEND_UNIT {
                PixelClass::OwnerB
            } else {
                PixelClass::Mixed
            });
            weights_a.push(iwa);
            weights_b.push(iwb);
        }

        let blender = Self {
            size,
            radius,
            classes,
            weights_a,
            weights_b,
        };
        let counts = blender.counts();
        tracing::debug!(
            owner_a = counts.owner_a,
            owner_b = counts.owner_b,
            mixed = counts.mixed,
            "seam maps ready"
        );
        Ok(blender)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Blur radius the maps were built with.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn class_at(&self, x: u32, y: u32) -> PixelClass {
        self.classes[self.index(x, y)]
    }

    pub fn weights_at(&self, x: u32, y: u32) -> (i32, i32) {
        let i = self.index(x, y);
        (self.weights_a[i], self.weights_b[i])
    }

    pub fn counts(&self) -> ClassCounts {
        let mut c = ClassCounts::default();
        for class in &self.classes {
            match class {
                PixelClass::OwnerA => c.owner_a += 1,
                PixelClass::OwnerB => c.owner_b += 1,
                PixelClass::Mixed => c.mixed += 1,
            }
        }
        c
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.size.width as usize) + x as usize
    }

    /// Blend two already reprojected images.
    pub fn blend(&self, image_a: &ImageBuf, image_b: &ImageBuf) -> StitchResult<ImageBuf> {
        let mut out = ImageBuf::new(0, 0, image_a.format);
        self.blend_into(image_a, image_b, &mut out)?;
        Ok(out)
    }

    pub fn blend_into(
        &self,
        image_a: &ImageBuf,
        image_b: &ImageBuf,
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        for im in [image_a, image_b] {
            if im.size() != self.size {
                return Err(StitchError::validation(format!(
                    "blend input is {}x{}, seam maps are {}x{}",
                    im.width, im.height, self.size.width, self.size.height
                )));
            }
        }
        if image_a.format != image_b.format {
            return Err(StitchError::validation(format!(
                "blend inputs differ in format: {:?} vs {:?}",
                image_a.format, image_b.format
            )));
        }

        let c = image_a.channels();
        out.reshape(self.size.width, self.size.height, image_a.format);
        for (i, ((d, pa), pb)) in out
            .data
            .chunks_exact_mut(c)
            .zip(image_a.data.chunks_exact(c))
            .zip(image_b.data.chunks_exact(c))
            .enumerate()
        {
            match self.classes[i] {
                PixelClass::OwnerA => d.copy_from_slice(pa),
                PixelClass::OwnerB => d.copy_from_slice(pb),
                PixelClass::Mixed => mix(d, pa, pb, self.weights_a[i], self.weights_b[i]),
            }
        }
        Ok(())
    }

    /// Fused reprojection and blend: each output pixel samples only the camera(s) its class needs.
    pub fn reproject_and_blend(
        &self,
        src_a: &ImageBuf,
        src_b: &ImageBuf,
        map_a: &SampleMap,
        map_b: &SampleMap,
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        let row_bytes = self.prepare_fused(src_a, src_b, map_a, map_b, out)?;
        for (y, row) in out.data.chunks_exact_mut(row_bytes).enumerate() {
            self.fused_row(y as u32, src_a, src_b, map_a, map_b, row);
        }
        Ok(())
    }

    /// Row-parallel [`SeamBlender::reproject_and_blend`] on the current rayon pool.
    pub fn reproject_and_blend_par(
        &self,
        src_a: &ImageBuf,
        src_b: &ImageBuf,
        map_a: &SampleMap,
        map_b: &SampleMap,
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        let row_bytes = self.prepare_fused(src_a, src_b, map_a, map_b, out)?;
        out.data
            .par_chunks_exact_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| self.fused_row(y as u32, src_a, src_b, map_a, map_b, row));
        Ok(())
    }

    fn prepare_fused(
        &self,
        src_a: &ImageBuf,
        src_b: &ImageBuf,
        map_a: &SampleMap,
        map_b: &SampleMap,
        out: &mut ImageBuf,
    ) -> StitchResult<usize> {
        if src_a.format != src_b.format {
            return Err(StitchError::validation(format!(
                "seam sources differ in format: {:?} vs {:?}",
                src_a.format, src_b.format
            )));
        }
        for map in [map_a, map_b] {
            if map.size() != self.size {
                return Err(StitchError::validation(format!(
                    "sample map is {}x{}, seam maps are {}x{}",
                    map.width(),
                    map.height(),
                    self.size.width,
                    self.size.height
                )));
            }
        }
        out.reshape(self.size.width, self.size.height, src_a.format);
        Ok(out.row_bytes())
    }

    fn fused_row(
        &self,
        y: u32,
        src_a: &ImageBuf,
        src_b: &ImageBuf,
        map_a: &SampleMap,
        map_b: &SampleMap,
        row: &mut [u8],
    ) {
        let c = src_a.channels();
        let base = (y as usize) * (self.size.width as usize);
        let (ra, rb) = (map_a.row(y), map_b.row(y));
        let mut pa = [0u8; 4];
        let mut pb = [0u8; 4];
        for (x, d) in row.chunks_exact_mut(c).enumerate() {
            let i = base + x;
            match self.classes[i] {
                PixelClass::OwnerA => {
                    if !sample_bilinear(src_a, ra[x][0], ra[x][1], d) {
                        d.fill(0);
                    }
                }
                PixelClass::OwnerB => {
                    if !sample_bilinear(src_b, rb[x][0], rb[x][1], d) {
                        d.fill(0);
                    }
                }
                PixelClass::Mixed => {
                    let (pa, pb) = (&mut pa[..c], &mut pb[..c]);
                    if !sample_bilinear(src_a, ra[x][0], ra[x][1], pa) {
                        pa.fill(0);
                    }
                    if !sample_bilinear(src_b, rb[x][0], rb[x][1], pb) {
                        pb.fill(0);
                    }
                    mix(d, pa, pb, self.weights_a[i], self.weights_b[i]);
                }
            }
        }
    }
}

#[inline]
fn mix(dst: &mut [u8], a: &[u8], b: &[u8], wa: i32, wb: i32) {
    for ((d, &a), &b) in dst.iter_mut().zip(a).zip(b) {
        *d = ((i32::from(a) * wa + i32::from(b) * wb) >> BLEND_SHIFT) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/blend/seam.rs"]
mod tests;
