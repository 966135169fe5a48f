use super::*;

fn gray(w: u32, h: u32, v: u8) -> ImageBuf {
    ImageBuf::filled(w, h, PixelFormat::Gray8, &[v]).unwrap()
}

fn band(w: u32, h: u32, from: u32, to: u32) -> Mask {
    Mask::from_fn(w, h, |x, _| x >= from && x < to)
}

#[test]
fn smoothness_model_pulls_exposures_together() {
    let images = [gray(40, 4, 100), gray(40, 4, 140)];
    let masks = [band(40, 4, 0, 25), band(40, 4, 15, 40)];
    let solve = GainSolver::new(GainSolverOpts::new(GainModel::Smoothness))
        .solve(&images, &masks)
        .unwrap();
    let GainSolve::Solved(g) = solve else {
        panic!("expected a solved system");
    };
    // Closed form for one overlap pixel: [[300,-280],[-280,492]] g = [100,100].
    assert!((g[0] - 77200.0 / 69200.0).abs() < 1e-9);
    assert!((g[1] - 58000.0 / 69200.0).abs() < 1e-9);
}

#[test]
fn observation_model_solves_to_positive_gains() {
    let images = [gray(20, 2, 100), gray(20, 2, 140)];
    let masks = [band(20, 2, 0, 12), band(20, 2, 8, 20)];
    let solve = GainSolver::new(GainSolverOpts::new(GainModel::SmoothnessWithObservation))
        .solve(&images, &masks)
        .unwrap();
    let g = solve.gains();
    assert!(!solve.is_degenerate());
    assert!(g.iter().all(|v| *v > 0.0));
    assert_ne!(
        g,
        GainSolver::new(GainSolverOpts::new(GainModel::Smoothness))
            .solve(&images, &masks)
            .unwrap()
            .gains()
    );
}

#[test]
fn disjoint_cameras_degrade_to_identity() {
    let images = [gray(20, 2, 50), gray(20, 2, 200)];
    let masks = [band(20, 2, 0, 10), band(20, 2, 10, 20)];
    let solve = GainSolver::new(GainSolverOpts::new(GainModel::Smoothness))
        .solve(&images, &masks)
        .unwrap();
    assert_eq!(solve, GainSolve::Degenerate { cameras: 2 });
    assert_eq!(solve.gains(), vec![1.0, 1.0]);
}

#[test]
fn mismatched_inputs_are_rejected() {
    let solver = GainSolver::new(GainSolverOpts::new(GainModel::Smoothness));
    let masks = [band(8, 2, 0, 5), band(8, 2, 3, 8)];
    assert!(solver.solve(&[gray(8, 2, 1)], &masks[..1]).is_err());
    assert!(solver.solve(&[gray(8, 2, 1), gray(9, 2, 1)], &masks).is_err());
    let rgb = ImageBuf::new(8, 2, PixelFormat::Rgb8);
    assert!(solver.solve(&[gray(8, 2, 1), rgb], &masks).is_err());
}

#[test]
fn per_channel_solve_treats_channels_independently() {
    let a = ImageBuf::filled(30, 2, PixelFormat::Rgb8, &[100, 120, 120]).unwrap();
    let b = ImageBuf::filled(30, 2, PixelFormat::Rgb8, &[140, 120, 120]).unwrap();
    let masks = [band(30, 2, 0, 18), band(30, 2, 12, 30)];
    let g = GainSolver::new(GainSolverOpts::new(GainModel::Smoothness))
        .solve_per_channel(&[a, b], &masks)
        .unwrap();
    assert!(g[0][0] > 1.0 && g[1][0] < 1.0);
    assert!((g[0][1] - g[1][1]).abs() < 1e-9);
}

#[test]
fn rescale_pins_reference() {
    let mut g = vec![1.2, 0.8, 0.95];
    rescale(&mut g, 1).unwrap();
    assert!((g[1] - 1.0).abs() < 1e-12);
    assert!((g[0] - 1.5).abs() < 1e-12);
    assert!(rescale(&mut g, 3).is_err());
}

#[test]
fn reference_is_brightest_camera() {
    let images = [gray(4, 1, 90), gray(4, 1, 180), gray(4, 1, 120)];
    let masks = [Mask::full(4, 1), Mask::full(4, 1), Mask::full(4, 1)];
    assert_eq!(reference_camera(&images, &masks).unwrap(), 1);
}

#[test]
fn lut_is_monotonic_with_fixed_endpoints_for_brightening_gains() {
    for k in [1.0, 1.01, 1.1156, 1.5, 2.0, 3.0, 7.5] {
        let lut = gain_lut(k).unwrap();
        assert!(lut.is_monotonic(), "gain {k}");
        assert_eq!(lut.get(0), 0, "gain {k}");
        assert_eq!(lut.get(255), 255, "gain {k}");
    }
}

#[test]
fn bezier_lut_tracks_the_gain_near_black() {
    let lut = gain_lut(2.0).unwrap();
    // Slope at the origin is the gain.
    assert!((i32::from(lut.get(4)) - 8).abs() <= 1);
    let dark = gain_lut(0.5).unwrap();
    assert!((i32::from(dark.get(10)) - 5).abs() <= 1);
    assert!(dark.is_monotonic());
}

#[test]
fn lut_rejects_non_positive_gain() {
    assert!(gain_lut(0.0).is_err());
    assert!(gain_lut(f64::NAN).is_err());
}

#[test]
fn gain_correction_builds_one_lut_per_camera() {
    let images = [
        ImageBuf::filled(60, 4, PixelFormat::Rgb8, &[100, 100, 100]).unwrap(),
        ImageBuf::filled(60, 4, PixelFormat::Rgb8, &[140, 140, 140]).unwrap(),
    ];
    let masks = [band(60, 4, 0, 36), band(60, 4, 24, 60)];
    let mut corr = GainCorrection::new(GainModel::Smoothness);
    corr.fix_reference = true;
    let luts = corr.luts(&images, &masks).unwrap();
    assert_eq!(luts.len(), 2);
    // Camera 1 is the brighter one and stays untouched.
    assert!(luts[1].is_identity());
    let ChannelLuts::Uniform(l0) = &luts[0] else {
        panic!("expected a uniform lut");
    };
    assert!(l0.get(100) > 100);
}
