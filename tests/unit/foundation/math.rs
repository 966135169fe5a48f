use super::*;

#[test]
fn mul_div255_hits_exact_endpoints() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(255, 0), 0);
    assert_eq!(mul_div255_u16(128, 255), 128);
}

#[test]
fn luma_of_gray_is_identity() {
    for v in [0u8, 1, 17, 128, 200, 255] {
        assert_eq!(luma_u8(v, v, v), v);
    }
}

#[test]
fn saturate_rounds_and_clamps() {
    assert_eq!(saturate_u8(-3.0), 0);
    assert_eq!(saturate_u8(254.6), 255);
    assert_eq!(saturate_u8(300.0), 255);
    assert_eq!(saturate_u8(10.49), 10);
    assert_eq!(saturate_u8(f64::NAN), 0);
}
