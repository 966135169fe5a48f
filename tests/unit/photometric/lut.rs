use super::*;
use crate::foundation::core::PixelFormat;

#[test]
fn linear_lut_clamps() {
    let l = Lut::linear(2.0, 10.0);
    assert_eq!(l.get(0), 10);
    assert_eq!(l.get(100), 210);
    assert_eq!(l.get(200), 255);
    assert!(l.is_monotonic());
}

#[test]
fn uniform_lut_skips_alpha() {
    let img = ImageBuf::filled(2, 2, PixelFormat::Rgba8, &[10, 20, 30, 40]).unwrap();
    let out = ChannelLuts::Uniform(Lut::linear(1.0, 5.0)).apply(&img).unwrap();
    assert_eq!(out.pixel(1, 1), &[15, 25, 35, 40]);
}

#[test]
fn per_channel_luts_route_by_channel() {
    let img = ImageBuf::filled(1, 1, PixelFormat::Rgb8, &[10, 10, 10]).unwrap();
    let luts = ChannelLuts::PerChannel([
        Lut::linear(1.0, 1.0),
        Lut::linear(1.0, 2.0),
        Lut::linear(1.0, 3.0),
    ]);
    assert_eq!(luts.apply(&img).unwrap().data, vec![11, 12, 13]);

    let gray = ImageBuf::filled(1, 1, PixelFormat::Gray8, &[10]).unwrap();
    assert!(luts.apply(&gray).is_err());
}

#[test]
fn identity_detection() {
    assert!(ChannelLuts::identity().is_identity());
    assert!(!ChannelLuts::Uniform(Lut::linear(1.0, 1.0)).is_identity());
}
