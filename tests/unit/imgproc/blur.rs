use super::*;

#[test]
fn radius_0_is_identity() {
    let src = vec![1u8, 2, 3, 4, 5, 6];
    let out = blur_plane(&src, 3, 2, 0, 1.0).unwrap();
    assert_eq!(out, src);
}

#[test]
fn constant_plane_is_identity() {
    let src = vec![200u8; 7 * 5];
    let out = blur_plane(&src, 7, 5, 3, 1.0).unwrap();
    assert_eq!(out, src);
}

#[test]
fn kernel_sums_to_one() {
    for (r, s) in [(1u32, 0.33f32), (4, 1.3), (20, 6.67)] {
        let k = gaussian_kernel_q16(r, s).unwrap();
        assert_eq!(k.len(), (2 * r + 1) as usize);
        assert_eq!(k.iter().map(|&v| u64::from(v)).sum::<u64>(), 65536);
    }
}

#[test]
fn rejects_bad_sigma_and_len() {
    assert!(blur_plane(&[0u8; 4], 2, 2, 1, 0.0).is_err());
    assert!(blur_plane(&[0u8; 3], 2, 2, 1, 1.0).is_err());
}

#[test]
fn step_edge_becomes_a_ramp() {
    let (w, h) = (40u32, 2u32);
    let src: Vec<u8> = (0..h)
        .flat_map(|_| (0..w).map(|x| if x < 20 { 255 } else { 0 }))
        .collect();
    let out = blur_mask_plane(&src, w, h, 6).unwrap();
    let row = &out[..w as usize];
    assert_eq!(row[0], 255);
    assert_eq!(row[39], 0);
    assert!(row[19] > 128 && row[19] < 255);
    assert!(row[20] > 0 && row[20] < 128);
    assert!(row.windows(2).all(|p| p[0] >= p[1]));
}
