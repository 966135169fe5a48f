use super::*;
use crate::foundation::core::PixelFormat;

fn ramp(w: u32, h: u32) -> ImageBuf {
    let data = (0..w * h).map(|i| ((i % w) * 10 + (i / w)) as u8).collect();
    ImageBuf::from_raw(w, h, PixelFormat::Gray8, data).unwrap()
}

#[test]
fn identity_map_copies_exactly() {
    let src = ramp(8, 5);
    let mut out = ImageBuf::new(0, 0, PixelFormat::Gray8);
    reproject(&src, &SampleMap::identity(8, 5), &mut out).unwrap();
    assert_eq!(out, src);
}

#[test]
fn half_pixel_offsets_average_neighbours() {
    let src = ImageBuf::from_raw(2, 1, PixelFormat::Gray8, vec![100, 200]).unwrap();
    let mut px = [0u8];
    assert!(sample_bilinear(&src, 0.5, 0.0, &mut px));
    assert_eq!(px[0], 150);
    assert!(sample_bilinear(&src, 0.25, 0.0, &mut px));
    assert_eq!(px[0], 125);
}

#[test]
fn border_is_clamped_within_half_a_pixel() {
    let src = ImageBuf::from_raw(2, 1, PixelFormat::Gray8, vec![100, 200]).unwrap();
    let mut px = [7u8];
    assert!(sample_bilinear(&src, -0.4, 0.2, &mut px));
    assert_eq!(px[0], 100);
    assert!(sample_bilinear(&src, 1.5, 0.0, &mut px));
    assert_eq!(px[0], 200);
    assert!(!sample_bilinear(&src, 1.6, 0.0, &mut px));
    assert!(!sample_bilinear(&src, f32::NAN, 0.0, &mut px));
    assert_eq!(px[0], 200);
}

#[test]
fn outside_samples_become_black() {
    let src = ImageBuf::filled(4, 4, PixelFormat::Rgb8, &[9, 8, 7]).unwrap();
    let map = SampleMap::from_fn(3, 1, |x, _| [x as f32 * 4.0, 1.0]);
    let mut out = ImageBuf::new(0, 0, PixelFormat::Rgb8);
    reproject(&src, &map, &mut out).unwrap();
    assert_eq!(out.pixel(0, 0), &[9, 8, 7]);
    assert_eq!(out.pixel(1, 0), &[0, 0, 0]);
    assert_eq!(out.pixel(2, 0), &[0, 0, 0]);
}

#[test]
fn parallel_matches_serial() {
    let src = ramp(16, 12);
    let map = SampleMap::from_fn(20, 10, |x, y| [x as f32 * 0.7 + 0.3, y as f32 * 1.1 - 0.2]);
    let mut a = ImageBuf::new(0, 0, PixelFormat::Gray8);
    let mut b = ImageBuf::new(0, 0, PixelFormat::Gray8);
    reproject(&src, &map, &mut a).unwrap();
    reproject_par(&src, &map, &mut b).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.size(), map.size());
}
