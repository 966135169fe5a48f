use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    assert_eq!(Fps::new(30, 1).unwrap().frame_timestamp_us(30), 1_000_000);
    assert_eq!(Fps::new(30000, 1001).unwrap().frame_timestamp_us(30), 1_001_000);
}

#[test]
fn copy_from_view_drops_row_padding() {
    // 2x2 RGB with 2 bytes of padding per row.
    let raw = [
        1u8, 2, 3, 4, 5, 6, 0, 0, //
        7, 8, 9, 10, 11, 12, 0, 0,
    ];
    let view = FrameView {
        width: 2,
        height: 2,
        stride: 8,
        format: PixelFormat::Rgb8,
        timestamp_us: 0,
        data: &raw,
    };
    let mut img = ImageBuf::new(1, 1, PixelFormat::Gray8);
    img.copy_from_view(&view).unwrap();
    assert_eq!(img.format, PixelFormat::Rgb8);
    assert_eq!(img.data, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
}

#[test]
fn copy_from_view_rejects_short_buffers() {
    let raw = [0u8; 10];
    let view = FrameView {
        width: 2,
        height: 2,
        stride: 6,
        format: PixelFormat::Rgb8,
        timestamp_us: 0,
        data: &raw,
    };
    let mut img = ImageBuf::new(2, 2, PixelFormat::Rgb8);
    assert!(img.copy_from_view(&view).is_err());
}

#[test]
fn mask_set_operations() {
    let a = Mask::from_fn(4, 1, |x, _| x < 3);
    let b = Mask::from_fn(4, 1, |x, _| x > 0);
    assert_eq!(a.and(&b).count(), 2);
    assert_eq!(a.or(&b).count(), 4);
    assert_eq!(a.not().count(), 1);
    assert!(Mask::new(3, 3).is_empty());
}

#[test]
fn channel_plane_and_gray() {
    let img = ImageBuf::filled(2, 1, PixelFormat::Rgb8, &[10, 20, 30]).unwrap();
    assert_eq!(img.channel_plane(1).unwrap().data, vec![20, 20]);
    assert!(img.channel_plane(3).is_err());
    let gray = img.to_gray();
    assert_eq!(gray.format, PixelFormat::Gray8);
    assert_eq!(gray.data.len(), 2);
}
