use super::*;

fn band(w: u32, h: u32, from: u32, to: u32) -> Mask {
    Mask::from_fn(w, h, |x, _| x >= from && x < to)
}

#[test]
fn unique_masks_partition_the_overlap() {
    let a = band(100, 4, 0, 55);
    let b = band(100, 4, 45, 100);
    let u = unique_masks(&[a.clone(), b.clone()]).unwrap();
    assert!(u[0].and(&u[1]).is_empty());
    assert_eq!(u[0].or(&u[1]), a.or(&b));
    assert!(u[0].get(49, 0));
    assert!(u[1].get(50, 0));
}

#[test]
fn validate_rejects_mismatched_sizes() {
    assert!(validate_masks(&[]).is_err());
    assert!(validate_masks(&[Mask::new(4, 4), Mask::new(4, 5)]).is_err());
}

#[test]
fn extended_masks_stay_inside_coverage() {
    let a = band(100, 6, 0, 55);
    let b = band(100, 6, 45, 100);
    let ext = extended_masks(&[a.clone(), b.clone()], 20).unwrap();
    // Overlap is 10px wide, so the unique halves can only grow by 5px.
    assert!(ext.radius < 20);
    for (e, m) in ext.masks.iter().zip([&a, &b]) {
        assert!(e.and(&m.not()).is_empty());
    }
    assert!(!ext.masks[0].and(&ext.masks[1]).is_empty());
}

#[test]
fn overlap_masks_are_pairwise_unions() {
    let a = band(10, 1, 0, 6);
    let b = band(10, 1, 4, 10);
    let c = band(10, 1, 8, 10);
    let o = overlap_masks(&[a, b, c]).unwrap();
    assert_eq!(o[0].count(), 2);
    assert_eq!(o[1].count(), 4);
    assert_eq!(o[2].count(), 2);
}

#[test]
fn linear_weights_sum_to_one_on_coverage() {
    let a = band(60, 3, 0, 35);
    let b = band(60, 3, 25, 60);
    let w = linear_blend_weights(&[a, b], 6).unwrap();
    for idx in 0..(60 * 3) {
        let s = w[0][idx] + w[1][idx];
        assert!((s - 1.0).abs() < 1e-5, "idx {idx} sum {s}");
    }
    assert_eq!(w[1][0], 0.0);
    assert!(w[0][30] > 0.0 && w[1][30] > 0.0);
}
