use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::luma_u8;

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> StitchResult<Self> {
        if den == 0 {
            return Err(StitchError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(StitchError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Timestamp in microseconds of frame `idx`.
    pub fn frame_timestamp_us(self, idx: u64) -> i64 {
        let us = (idx as u128) * 1_000_000u128 * u128::from(self.den) / u128::from(self.num);
        us as i64
    }
}

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }
}

/// Interleaved 8-bit pixel layouts understood by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    /// Straight (non-premultiplied) alpha.
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }

    /// Channels that carry color and take part in tone correction (alpha excluded).
    pub fn color_channels(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 | Self::Rgba8 => 3,
        }
    }
}

/// Borrowed, possibly strided view of a decoded frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `width * channels`.
    pub stride: usize,
    pub format: PixelFormat,
    /// Presentation timestamp in microseconds.
    pub timestamp_us: i64,
    pub data: &'a [u8],
}

/// Owned, tightly packed image buffer.
///
/// Used for camera frames, reprojected intermediates and output frames. Rows are contiguous with
/// stride `width * channels`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBuf {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl ImageBuf {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = (width as usize) * (height as usize) * format.channels();
        Self {
            width,
            height,
            format,
            data: vec![0u8; len],
        }
    }

    /// Image with every pixel set to `px` (`px.len()` must equal the channel count).
    pub fn filled(width: u32, height: u32, format: PixelFormat, px: &[u8]) -> StitchResult<Self> {
        if px.len() != format.channels() {
            return Err(StitchError::validation(format!(
                "fill pixel has {} channels, format {:?} needs {}",
                px.len(),
                format,
                format.channels()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data: px.repeat((width as usize) * (height as usize)),
        })
    }

    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> StitchResult<Self> {
        let expected = (width as usize) * (height as usize) * format.channels();
        if data.len() != expected {
            return Err(StitchError::validation(format!(
                "image data length {} does not match {width}x{height} {:?} ({expected})",
                data.len(),
                format
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn row_bytes(&self) -> usize {
        (self.width as usize) * self.channels()
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels();
        let i = ((y as usize) * (self.width as usize) + x as usize) * c;
        &self.data[i..i + c]
    }

    /// Re-shape in place, reusing the allocation when possible. Contents become unspecified.
    pub fn reshape(&mut self, width: u32, height: u32, format: PixelFormat) {
        let len = (width as usize) * (height as usize) * format.channels();
        self.width = width;
        self.height = height;
        self.format = format;
        self.data.resize(len, 0);
    }

    /// Deep-copy a strided view into this buffer, re-shaping it to match.
    pub fn copy_from_view(&mut self, view: &FrameView<'_>) -> StitchResult<()> {
        let row = (view.width as usize) * view.format.channels();
        if view.stride < row {
            return Err(StitchError::validation(format!(
                "frame stride {} is smaller than row size {row}",
                view.stride
            )));
        }
        let needed = if view.height == 0 {
            0
        } else {
            view.stride * (view.height as usize - 1) + row
        };
        if view.data.len() < needed {
            return Err(StitchError::validation(format!(
                "frame data holds {} bytes, {needed} required",
                view.data.len()
            )));
        }

        self.reshape(view.width, view.height, view.format);
        for (dst, src) in self
            .data
            .chunks_exact_mut(row.max(1))
            .zip(view.data.chunks(view.stride.max(1)))
        {
            dst.copy_from_slice(&src[..row]);
        }
        Ok(())
    }

    /// Luminance plane (Gray8). Gray input is copied as-is.
    pub fn to_gray(&self) -> ImageBuf {
        let data = match self.format {
            PixelFormat::Gray8 => self.data.clone(),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => self
                .data
                .chunks_exact(self.channels())
                .map(|px| luma_u8(px[0], px[1], px[2]))
                .collect(),
        };
        ImageBuf {
            width: self.width,
            height: self.height,
            format: PixelFormat::Gray8,
            data,
        }
    }

    /// Extract one channel as a Gray8 plane.
    pub fn channel_plane(&self, channel: usize) -> StitchResult<ImageBuf> {
        let c = self.channels();
        if channel >= c {
            return Err(StitchError::validation(format!(
                "channel {channel} out of range for {:?}",
                self.format
            )));
        }
        Ok(ImageBuf {
            width: self.width,
            height: self.height,
            format: PixelFormat::Gray8,
            data: self.data.iter().skip(channel).step_by(c).copied().collect(),
        })
    }
}

/// Binary single-channel coverage map (values are 0 or 255).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize)],
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![255u8; (width as usize) * (height as usize)],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                data.push(if f(x, y) { 255 } else { 0 });
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Build from raw bytes; any non-zero byte counts as set.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> StitchResult<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return Err(StitchError::validation(format!(
                "mask data length {} does not match {width}x{height}",
                data.len()
            )));
        }
        let data = data.into_iter().map(|v| if v != 0 { 255 } else { 0 }).collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub(crate) fn from_plane(width: u32, height: u32, plane: &[u8]) -> Self {
        Self {
            width,
            height,
            data: plane.iter().map(|&v| if v != 0 { 255 } else { 0 }).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[(y as usize) * (self.width as usize) + x as usize] != 0
    }

    pub fn is_set(&self, idx: usize) -> bool {
        self.data[idx] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.data[(y as usize) * (self.width as usize) + x as usize] = if on { 255 } else { 0 };
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    pub fn and(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && b)
    }

    pub fn or(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a || b)
    }

    pub fn not(&self) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| if v != 0 { 0 } else { 255 }).collect(),
        }
    }

    fn zip_with(&self, other: &Mask, f: impl Fn(bool, bool) -> bool) -> Mask {
        debug_assert_eq!(self.size(), other.size());
        Mask {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| if f(a != 0, b != 0) { 255 } else { 0 })
                .collect(),
        }
    }
}

/// Per-output-pixel source coordinates for reprojecting one camera.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleMap {
    width: u32,
    height: u32,
    coords: Vec<[f32; 2]>,
}

impl SampleMap {
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [f32; 2]) -> Self {
        let mut coords = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                coords.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            coords,
        }
    }

    pub fn from_raw(width: u32, height: u32, coords: Vec<[f32; 2]>) -> StitchResult<Self> {
        if coords.len() != (width as usize) * (height as usize) {
            return Err(StitchError::validation(format!(
                "sample map length {} does not match {width}x{height}",
                coords.len()
            )));
        }
        Ok(Self {
            width,
            height,
            coords,
        })
    }

    /// Map that samples a same-sized source at pixel centers.
    pub fn identity(width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |x, y| [x as f32, y as f32])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn row(&self, y: u32) -> &[[f32; 2]] {
        let w = self.width as usize;
        let start = (y as usize) * w;
        &self.coords[start..start + w]
    }
}

/// Opaque audio payload passed through the pipeline untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioPacket {
    pub timestamp_us: i64,
    pub data: Vec<u8>,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
