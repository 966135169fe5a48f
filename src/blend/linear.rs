use rayon::prelude::*;

use crate::blend::strategy::{BlendStrategy, check_blend_inputs};
use crate::foundation::core::{ImageBuf, Mask, Size};
use crate::foundation::error::{StitchError, StitchResult};
use crate::imgproc::masks::linear_blend_weights;

/// Feathered weighted average over any number of cameras.
///
/// Each camera's unique region is blurred by `radius`, clipped to its coverage and normalized, so
/// weights sum to 1 on covered pixels and to 0 elsewhere (those output pixels are black).
#[derive(Clone, Debug)]
pub struct LinearBlender {
    radius: u32,
    size: Size,
    weights: Vec<Vec<f32>>,
}

impl LinearBlender {
    pub fn new(radius: u32) -> Self {
        Self {
            radius,
            size: Size::new(0, 0),
            weights: Vec::new(),
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn is_prepared(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Normalized weight of `camera` at `(x, y)`.
    pub fn weight_at(&self, camera: usize, x: u32, y: u32) -> f32 {
        self.weights[camera][(y as usize) * (self.size.width as usize) + x as usize]
    }
}

fn accumulate(weights: &[Vec<f32>], images: &[ImageBuf], out: &mut ImageBuf) {
    let first = &images[0];
    let c = first.channels();
    let w = first.width as usize;
    out.reshape(first.width, first.height, first.format);
    let row_bytes = out.row_bytes();
    if row_bytes == 0 {
        return;
    }
    out.data
        .par_chunks_exact_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let mut acc = vec![0.0f32; row_bytes];
            for (wts, im) in weights.iter().zip(images) {
                let src = &im.data[y * row_bytes..(y + 1) * row_bytes];
                for x in 0..w {
                    let wt = wts[y * w + x];
                    if wt == 0.0 {
                        continue;
                    }
                    for k in 0..c {
                        acc[x * c + k] += wt * f32::from(src[x * c + k]);
                    }
                }
            }
            for (d, a) in row.iter_mut().zip(&acc) {
                *d = a.round().clamp(0.0, 255.0) as u8;
            }
        });
}

impl BlendStrategy for LinearBlender {
    fn prepare(&mut self, masks: &[Mask], _levels: u32, _min_side: u32) -> StitchResult<()> {
        self.weights = linear_blend_weights(masks, self.radius)?;
        self.size = masks[0].size();
        Ok(())
    }

    fn blend(&mut self, images: &[ImageBuf], out: &mut ImageBuf) -> StitchResult<()> {
        if !self.is_prepared() {
            return Err(StitchError::render("linear blender used before prepare"));
        }
        check_blend_inputs(images, self.weights.len())?;
        if images[0].size() != self.size {
            return Err(StitchError::validation(format!(
                "blend images are {}x{}, weights are {}x{}",
                images[0].width, images[0].height, self.size.width, self.size.height
            )));
        }
        accumulate(&self.weights, images, out);
        Ok(())
    }

    fn blend_with_masks(
        &mut self,
        images: &[ImageBuf],
        masks: &[Mask],
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        check_blend_inputs(images, masks.len())?;
        if masks[0].size() != images[0].size() {
            return Err(StitchError::validation("blend masks and images differ in size"));
        }
        let weights = linear_blend_weights(masks, self.radius)?;
        accumulate(&weights, images, out);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}
