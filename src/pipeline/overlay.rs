use crate::foundation::core::{ImageBuf, PixelFormat};
use crate::foundation::error::{StitchError, StitchResult};

/// Straight-alpha RGBA logo composited onto every output frame by the post-process stage.
///
/// The logo is clipped to the frame; pixels outside it are left untouched.
#[derive(Clone, Debug)]
pub struct LogoOverlay {
    logo: ImageBuf,
    x: u32,
    y: u32,
}

impl LogoOverlay {
    pub fn new(logo: ImageBuf, x: u32, y: u32) -> StitchResult<Self> {
        if logo.format != PixelFormat::Rgba8 {
            return Err(StitchError::validation(format!(
                "logo must be Rgba8, got {:?}",
                logo.format
            )));
        }
        Ok(Self { logo, x, y })
    }

    pub fn logo(&self) -> &ImageBuf {
        &self.logo
    }

    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Output frames must carry colour for the logo to land on.
    pub fn check_target(&self, format: PixelFormat) -> StitchResult<()> {
        match format {
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => Ok(()),
            PixelFormat::Gray8 => Err(StitchError::validation(
                "logo overlay needs Rgb8 or Rgba8 output frames",
            )),
        }
    }

    pub fn apply(&self, frame: &mut ImageBuf) -> StitchResult<()> {
        self.check_target(frame.format)?;
        if self.x >= frame.width || self.y >= frame.height {
            return Ok(());
        }
        let w = (self.logo.width).min(frame.width - self.x) as usize;
        let h = (self.logo.height).min(frame.height - self.y) as usize;
        let ch = frame.channels();
        let frame_row = frame.row_bytes();
        let logo_row = self.logo.row_bytes();

        for ly in 0..h {
            let src = &self.logo.data[ly * logo_row..][..w * 4];
            let off = (self.y as usize + ly) * frame_row + self.x as usize * ch;
            let dst = &mut frame.data[off..][..w * ch];
            for (d, s) in dst.chunks_exact_mut(ch).zip(src.chunks_exact(4)) {
                let a = u32::from(s[3]);
                if a == 0 {
                    continue;
                }
                for c in 0..3 {
                    d[c] = over(d[c], s[c], a);
                }
            }
        }
        Ok(())
    }
}

#[inline]
fn over(dst: u8, src: u8, a: u32) -> u8 {
    ((u32::from(dst) * (255 - a) + u32::from(src) * a + 254) / 255) as u8
}
