use crate::foundation::core::{Mask, SampleMap, Size};
use crate::foundation::error::{StitchError, StitchResult};

/// Reprojection inputs for one camera at output resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraGeometry {
    /// Output pixel → source sub-pixel coordinate.
    pub map: SampleMap,
    /// Output pixels this camera covers.
    pub mask: Mask,
}

impl CameraGeometry {
    pub fn new(map: SampleMap, mask: Mask) -> StitchResult<Self> {
        if map.size() != mask.size() {
            return Err(StitchError::validation(format!(
                "sample map is {}x{} but mask is {}x{}",
                map.width(),
                map.height(),
                mask.width(),
                mask.height()
            )));
        }
        Ok(Self { map, mask })
    }

    pub fn size(&self) -> Size {
        self.map.size()
    }
}

/// Produces per-camera sample maps and masks for a given output size.
///
/// Camera models and lens calibration live behind this trait; the pipeline only consumes the
/// resulting maps.
pub trait GeometryProvider: Send + Sync {
    fn camera_geometry(&self, src_sizes: &[Size], dst_size: Size)
    -> StitchResult<Vec<CameraGeometry>>;
}

/// Check that `geometry` has one entry per camera, all at `dst_size`.
pub fn validate_geometry(
    geometry: &[CameraGeometry],
    cameras: usize,
    dst_size: Size,
) -> StitchResult<()> {
    if geometry.len() != cameras {
        return Err(StitchError::validation(format!(
            "geometry describes {} cameras, expected {cameras}",
            geometry.len()
        )));
    }
    for (i, g) in geometry.iter().enumerate() {
        if g.map.size() != dst_size || g.mask.size() != dst_size {
            return Err(StitchError::validation(format!(
                "camera {i} geometry is {}x{}, output is {}x{}",
                g.map.width(),
                g.map.height(),
                dst_size.width,
                dst_size.height
            )));
        }
    }
    Ok(())
}

/// Precomputed geometry handed in by the host.
#[derive(Clone, Debug)]
pub struct FixedGeometry(pub Vec<CameraGeometry>);

impl GeometryProvider for FixedGeometry {
    fn camera_geometry(
        &self,
        src_sizes: &[Size],
        dst_size: Size,
    ) -> StitchResult<Vec<CameraGeometry>> {
        validate_geometry(&self.0, src_sizes.len(), dst_size)?;
        Ok(self.0.clone())
    }
}

/// Cameras laid side by side: camera `i` fills the `i`-th vertical strip of the output, widened
/// by `overlap` pixels shared with each neighbour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripGeometry {
    pub overlap: u32,
}

impl StripGeometry {
    pub fn new(overlap: u32) -> Self {
        Self { overlap }
    }

    /// Output columns `[begin, end)` covered by camera `i` of `n`.
    pub fn strip(&self, i: u32, n: u32, dst_width: u32) -> (u32, u32) {
        let lo = (u64::from(i) * u64::from(dst_width) / u64::from(n)) as u32;
        let hi = (u64::from(i + 1) * u64::from(dst_width) / u64::from(n)) as u32;
        let begin = if i == 0 {
            0
        } else {
            lo.saturating_sub(self.overlap / 2)
        };
        let end = if i + 1 == n {
            dst_width
        } else {
            (hi + self.overlap - self.overlap / 2).min(dst_width)
        };
        (begin, end)
    }
}

impl GeometryProvider for StripGeometry {
    fn camera_geometry(
        &self,
        src_sizes: &[Size],
        dst_size: Size,
    ) -> StitchResult<Vec<CameraGeometry>> {
        if src_sizes.is_empty() {
            return Err(StitchError::validation("strip geometry needs at least one camera"));
        }
        if dst_size.area() == 0 {
            return Err(StitchError::validation("output size must be non-zero"));
        }
        let n = src_sizes.len() as u32;
        let mut out = Vec::with_capacity(src_sizes.len());
        for (i, src) in src_sizes.iter().enumerate() {
            if src.area() == 0 {
                return Err(StitchError::validation(format!("camera {i} has an empty frame")));
            }
            let (begin, end) = self.strip(i as u32, n, dst_size.width);
            let sx = src.width as f32 / (end - begin) as f32;
            let sy = src.height as f32 / dst_size.height as f32;
            let map = SampleMap::from_fn(dst_size.width, dst_size.height, |x, y| {
                if x < begin || x >= end {
                    [-1.0, -1.0]
                } else {
                    [
                        ((x - begin) as f32 + 0.5) * sx - 0.5,
                        (y as f32 + 0.5) * sy - 0.5,
                    ]
                }
            });
            let mask = Mask::from_fn(dst_size.width, dst_size.height, |x, _| x >= begin && x < end);
            out.push(CameraGeometry { map, mask });
        }
        Ok(out)
    }
}
