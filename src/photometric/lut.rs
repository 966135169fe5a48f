use crate::foundation::core::ImageBuf;
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::saturate_u8;

/// 256-entry intensity mapping.
#[derive(Clone, PartialEq, Eq)]
pub struct Lut(pub [u8; 256]);

impl Lut {
    pub fn identity() -> Self {
        let mut t = [0u8; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = i as u8;
        }
        Self(t)
    }

    /// `lut[i] = clamp(round(i * slope + intercept))`.
    pub fn linear(slope: f64, intercept: f64) -> Self {
        let mut t = [0u8; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = saturate_u8(i as f64 * slope + intercept);
        }
        Self(t)
    }

    pub fn get(&self, v: u8) -> u8 {
        self.0[v as usize]
    }

    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(i, &v)| i == v as usize)
    }

    pub fn is_monotonic(&self) -> bool {
        self.0.windows(2).all(|p| p[0] <= p[1])
    }
}

impl Default for Lut {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Debug for Lut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lut")
            .field("lo", &&self.0[..4])
            .field("mid", &self.0[128])
            .field("hi", &&self.0[252..])
            .finish()
    }
}

/// Tone correction for one camera: one LUT shared by every color channel, or one per channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelLuts {
    Uniform(Lut),
    PerChannel([Lut; 3]),
}

impl ChannelLuts {
    pub fn identity() -> Self {
        Self::Uniform(Lut::identity())
    }

    pub fn is_identity(&self) -> bool {
        match self {
            Self::Uniform(l) => l.is_identity(),
            Self::PerChannel(ls) => ls.iter().all(Lut::is_identity),
        }
    }

    fn lut_for(&self, channel: usize) -> &Lut {
        match self {
            Self::Uniform(l) => l,
            Self::PerChannel(ls) => &ls[channel.min(2)],
        }
    }

    /// Remap `src` into `dst` (re-shaped to match). Alpha is copied unchanged.
    pub fn apply_into(&self, src: &ImageBuf, dst: &mut ImageBuf) -> StitchResult<()> {
        let channels = src.channels();
        let color = src.format.color_channels();
        if matches!(self, Self::PerChannel(_)) && color != 3 {
            return Err(StitchError::validation(format!(
                "per-channel LUTs need a color image, got {:?}",
                src.format
            )));
        }
        dst.reshape(src.width, src.height, src.format);
        for (d, s) in dst
            .data
            .chunks_exact_mut(channels)
            .zip(src.data.chunks_exact(channels))
        {
            for c in 0..channels {
                d[c] = if c < color {
                    self.lut_for(c).get(s[c])
                } else {
                    s[c]
                };
            }
        }
        Ok(())
    }

    pub fn apply(&self, src: &ImageBuf) -> StitchResult<ImageBuf> {
        let mut dst = ImageBuf::new(0, 0, src.format);
        self.apply_into(src, &mut dst)?;
        Ok(dst)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/photometric/lut.rs"]
mod tests;
