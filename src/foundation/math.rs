/// Fixed-point unit for two-way blend weights.
pub const BLEND_SHIFT: u32 = 10;
/// `1 << BLEND_SHIFT`.
pub const BLEND_UNIT: i32 = 1 << BLEND_SHIFT;

pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// BT.601 luma in 8.8 fixed point.
pub(crate) fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    ((77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b) + 128) >> 8) as u8
}

/// Round to nearest and clamp into `0..=255`.
pub(crate) fn saturate_u8(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
