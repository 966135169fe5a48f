use crate::foundation::core::{ImageBuf, Mask};
use crate::foundation::error::{StitchError, StitchResult};

/// Multi-camera compositor plugged into the render stage.
///
/// `prepare` runs once per mask set; `blend` then runs once per frame on reprojected images in
/// camera order. Implementations own whatever pyramids or weight maps they precompute.
pub trait BlendStrategy: Send {
    fn prepare(&mut self, masks: &[Mask], levels: u32, min_side: u32) -> StitchResult<()>;

    fn blend(&mut self, images: &[ImageBuf], out: &mut ImageBuf) -> StitchResult<()>;

    /// Blend with per-frame masks instead of the prepared ones.
    fn blend_with_masks(
        &mut self,
        images: &[ImageBuf],
        masks: &[Mask],
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        let _ = (images, masks, out);
        Err(StitchError::render(format!(
            "blend strategy '{}' does not support per-frame masks",
            self.name()
        )))
    }

    fn name(&self) -> &'static str;
}

pub(crate) fn check_blend_inputs(images: &[ImageBuf], cameras: usize) -> StitchResult<()> {
    if images.len() != cameras {
        return Err(StitchError::validation(format!(
            "blend prepared for {cameras} cameras, got {} images",
            images.len()
        )));
    }
    let Some(first) = images.first() else {
        return Err(StitchError::validation("blend needs at least one image"));
    };
    if let Some((i, im)) = images
        .iter()
        .enumerate()
        .find(|(_, im)| im.size() != first.size() || im.format != first.format)
    {
        return Err(StitchError::validation(format!(
            "blend image {i} is {}x{} {:?}, expected {}x{} {:?}",
            im.width, im.height, im.format, first.width, first.height, first.format
        )));
    }
    Ok(())
}
