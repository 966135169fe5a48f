use super::*;
use crate::foundation::core::PixelFormat;

fn band(w: u32, h: u32, from: u32, to: u32) -> Mask {
    Mask::from_fn(w, h, |x, _| x >= from && x < to)
}

fn overlapping_pair() -> (Mask, Mask) {
    (band(100, 20, 0, 55), band(100, 20, 45, 100))
}

#[test]
fn mixed_weights_sum_to_unit_and_owners_are_pure() {
    let (a, b) = overlapping_pair();
    let seam = SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 5 }).unwrap();
    for y in 0..20 {
        for x in 0..100 {
            let (wa, wb) = seam.weights_at(x, y);
            assert_eq!(wa + wb, BLEND_UNIT, "({x},{y})");
            match seam.class_at(x, y) {
                PixelClass::OwnerA => assert_eq!(wa, BLEND_UNIT),
                PixelClass::OwnerB => assert_eq!(wb, BLEND_UNIT),
                PixelClass::Mixed => assert!(wa > 0 && wb > 0),
            }
        }
    }
}

#[test]
fn every_pixel_has_exactly_one_class() {
    let (a, b) = overlapping_pair();
    let seam = SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 5 }).unwrap();
    let c = seam.counts();
    assert_eq!(c.owner_a + c.owner_b + c.mixed, 100 * 20);
    assert!(c.mixed > 0);
    assert_eq!(seam.class_at(0, 10), PixelClass::OwnerA);
    assert_eq!(seam.class_at(99, 10), PixelClass::OwnerB);
    assert_eq!(seam.class_at(20, 3), PixelClass::OwnerA);
    assert_eq!(seam.class_at(70, 3), PixelClass::OwnerB);
}

#[test]
fn transition_stays_inside_the_overlap() {
    let (a, b) = overlapping_pair();
    let seam = SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 20 }).unwrap();
    for x in 0..100 {
        let class = seam.class_at(x, 7);
        if x < 45 {
            assert_eq!(class, PixelClass::OwnerA, "x={x}");
        }
        if x >= 55 {
            assert_eq!(class, PixelClass::OwnerB, "x={x}");
        }
    }
}

#[test]
fn smart_mode_shrinks_radius_to_fit_the_overlap() {
    let (a, b) = overlapping_pair();
    let seam = SeamBlender::prepare(
        &a,
        &b,
        SeamMode::Smart {
            initial_radius: SeamMode::SMART_INITIAL_RADIUS,
        },
    )
    .unwrap();
    let r = seam.radius();
    assert!((2..=6).contains(&r), "radius {r}");
    assert_eq!(r % 2, 0);
    assert!(seam.counts().mixed > 0);
}

#[test]
fn uncovered_pixels_default_to_camera_a() {
    let a = band(40, 4, 0, 15);
    let b = band(40, 4, 25, 40);
    let seam = SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 3 }).unwrap();
    assert_eq!(seam.class_at(20, 1), PixelClass::OwnerA);
    assert_eq!(seam.weights_at(20, 1), (BLEND_UNIT, 0));
}

#[test]
fn blend_interpolates_between_cameras() {
    let (a, b) = overlapping_pair();
    let seam = SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 5 }).unwrap();
    let ia = ImageBuf::filled(100, 20, PixelFormat::Rgb8, &[100, 100, 100]).unwrap();
    let ib = ImageBuf::filled(100, 20, PixelFormat::Rgb8, &[140, 140, 140]).unwrap();
    let out = seam.blend(&ia, &ib).unwrap();
    assert_eq!(out.pixel(0, 5), &[100, 100, 100]);
    assert_eq!(out.pixel(99, 5), &[140, 140, 140]);
    let row: Vec<u8> = (0..100).map(|x| out.pixel(x, 5)[0]).collect();
    assert!(row.windows(2).all(|p| p[0] <= p[1]));
    assert!(row.iter().all(|&v| (99..=140).contains(&v)));
}

#[test]
fn fused_path_matches_separate_blend_with_identity_maps() {
    let (a, b) = overlapping_pair();
    let seam = SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 5 }).unwrap();
    let ia = ImageBuf::from_raw(
        100,
        20,
        PixelFormat::Gray8,
        (0..2000).map(|i| (i % 97) as u8).collect(),
    )
    .unwrap();
    let ib = ImageBuf::filled(100, 20, PixelFormat::Gray8, &[200]).unwrap();
    let map = SampleMap::identity(100, 20);

    let expected = seam.blend(&ia, &ib).unwrap();
    let mut serial = ImageBuf::new(0, 0, PixelFormat::Gray8);
    let mut parallel = ImageBuf::new(0, 0, PixelFormat::Gray8);
    seam.reproject_and_blend(&ia, &ib, &map, &map, &mut serial)
        .unwrap();
    seam.reproject_and_blend_par(&ia, &ib, &map, &map, &mut parallel)
        .unwrap();
    assert_eq!(serial, expected);
    assert_eq!(parallel, expected);
}

#[test]
fn bad_inputs_are_rejected() {
    let (a, b) = overlapping_pair();
    assert!(SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 0 }).is_err());
    assert!(SeamBlender::prepare(&a, &band(50, 20, 0, 10), SeamMode::Fast { radius: 3 }).is_err());

    let seam = SeamBlender::prepare(&a, &b, SeamMode::Fast { radius: 3 }).unwrap();
    let small = ImageBuf::new(10, 10, PixelFormat::Gray8);
    let full = ImageBuf::new(100, 20, PixelFormat::Gray8);
    assert!(seam.blend(&small, &full).is_err());
    let rgb = ImageBuf::new(100, 20, PixelFormat::Rgb8);
    assert!(seam.blend(&full, &rgb).is_err());
}
