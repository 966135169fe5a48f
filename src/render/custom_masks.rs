use crate::foundation::core::{Mask, Size};
use crate::foundation::error::{StitchError, StitchResult};

/// A mask that applies to frames with timestamps in `[begin_us, end_us)`.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskInterval {
    pub begin_us: i64,
    pub end_us: i64,
    pub mask: Mask,
}

impl MaskInterval {
    pub fn contains(&self, timestamp_us: i64) -> bool {
        self.begin_us <= timestamp_us && timestamp_us < self.end_us
    }
}

/// Which interval (if any) is active for every camera; `None` means the camera's default mask.
pub type ActiveIntervals = Vec<Option<usize>>;

/// Time-varying per-camera mask overrides.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CustomMasks {
    cameras: Vec<Vec<MaskInterval>>,
}

impl CustomMasks {
    pub fn new(cameras: usize) -> Self {
        Self {
            cameras: vec![Vec::new(); cameras],
        }
    }

    pub fn cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.iter().all(Vec::is_empty)
    }

    /// Register an override for `camera`. Intervals of one camera must not overlap.
    pub fn add(
        &mut self,
        camera: usize,
        begin_us: i64,
        end_us: i64,
        mask: Mask,
    ) -> StitchResult<()> {
        if begin_us >= end_us {
            return Err(StitchError::validation(format!(
                "mask interval [{begin_us}, {end_us}) is empty"
            )));
        }
        let list = self.cameras.get_mut(camera).ok_or_else(|| {
            StitchError::validation(format!("camera {camera} has no custom mask slot"))
        })?;
        if list
            .iter()
            .any(|iv| begin_us < iv.end_us && iv.begin_us < end_us)
        {
            return Err(StitchError::validation(format!(
                "mask interval [{begin_us}, {end_us}) overlaps an existing one for camera {camera}"
            )));
        }
        list.push(MaskInterval {
            begin_us,
            end_us,
            mask,
        });
        Ok(())
    }

    pub fn intervals(&self, camera: usize) -> &[MaskInterval] {
        self.cameras.get(camera).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn validate(&self, cameras: usize, size: Size) -> StitchResult<()> {
        if self.cameras.len() != cameras {
            return Err(StitchError::validation(format!(
                "custom masks describe {} cameras, expected {cameras}",
                self.cameras.len()
            )));
        }
        for (i, list) in self.cameras.iter().enumerate() {
            if let Some(iv) = list.iter().find(|iv| iv.mask.size() != size) {
                return Err(StitchError::validation(format!(
                    "custom mask of camera {i} is {}x{}, output is {}x{}",
                    iv.mask.width(),
                    iv.mask.height(),
                    size.width,
                    size.height
                )));
            }
        }
        Ok(())
    }

    /// Active interval per camera, each camera looked up with its own frame timestamp.
    pub fn active(&self, timestamps_us: &[i64]) -> ActiveIntervals {
        self.cameras
            .iter()
            .zip(timestamps_us)
            .map(|(list, &t)| list.iter().position(|iv| iv.contains(t)))
            .collect()
    }

    /// Masks to blend with for `active`, falling back to `defaults` per camera.
    pub fn resolve<'a>(&'a self, active: &[Option<usize>], defaults: &'a [Mask]) -> Vec<&'a Mask> {
        defaults
            .iter()
            .enumerate()
            .map(|(i, d)| match active.get(i).copied().flatten() {
                Some(k) => &self.cameras[i][k].mask,
                None => d,
            })
            .collect()
    }
}
