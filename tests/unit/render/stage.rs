use super::*;
use crate::imgproc::masks::validate_masks;
use crate::photometric::gain::GainModel;
use crate::photometric::lut::Lut;
use crate::render::geometry::{GeometryProvider, StripGeometry};

fn strips(cameras: usize, dst: Size) -> Vec<CameraGeometry> {
    StripGeometry::new(10)
        .camera_geometry(&vec![Size::new(50, 50); cameras], dst)
        .unwrap()
}

fn gray(v: u8) -> ImageBuf {
    ImageBuf::filled(50, 50, PixelFormat::Gray8, &[v]).unwrap()
}

fn opts(blend: BlendChoice, backend: ExecBackend) -> RenderOpts {
    RenderOpts {
        backend,
        ..RenderOpts::new(blend)
    }
}

#[test]
fn equirect_aspect_is_enforced() {
    assert!(check_equirect_size(Size::new(100, 50)).is_ok());
    assert!(check_equirect_size(Size::new(101, 50)).is_err());
    assert!(check_equirect_size(Size::new(100, 40)).is_err());
    assert!(check_equirect_size(Size::new(0, 0)).is_err());

    let odd = strips(2, Size::new(90, 50));
    assert!(
        RenderStage::prepare(odd.clone(), RenderOpts::new(BlendChoice::Linear { radius: 4 }))
            .is_err()
    );
    let relaxed = RenderOpts {
        require_equirect_aspect: false,
        ..RenderOpts::new(BlendChoice::Linear { radius: 4 })
    };
    assert!(RenderStage::prepare(odd, relaxed).is_ok());
}

#[test]
fn seam_blend_needs_two_cameras() {
    let err = RenderStage::prepare(
        strips(3, Size::new(120, 60)),
        RenderOpts::new(BlendChoice::Seam(SeamMode::Fast { radius: 5 })),
    )
    .unwrap_err();
    assert!(err.to_string().contains("exactly 2 cameras"));
}

#[test]
fn serial_and_parallel_seam_renders_agree() {
    let (a, b) = (gray(100), gray(140));
    let mut outputs = Vec::new();
    for backend in [ExecBackend::Serial, ExecBackend::Parallel { threads: Some(3) }] {
        let mut stage = RenderStage::prepare(
            strips(2, Size::new(100, 50)),
            opts(BlendChoice::Seam(SeamMode::Fast { radius: 5 }), backend),
        )
        .unwrap();
        let out = stage.render(&[&a, &b], &[0, 0]).unwrap();
        assert_eq!(out.size(), Size::new(100, 50));
        assert_eq!(out.pixel(2, 25), &[100]);
        assert_eq!(out.pixel(97, 25), &[140]);
        assert_eq!(stage.frames_rendered(), 1);
        outputs.push(out);
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn linear_blend_handles_many_cameras() {
    let frames = [gray(60), gray(120), gray(180)];
    let refs: Vec<&ImageBuf> = frames.iter().collect();
    let mut stage = RenderStage::prepare(
        strips(3, Size::new(120, 60)),
        opts(BlendChoice::Linear { radius: 3 }, ExecBackend::Serial),
    )
    .unwrap();
    let out = stage.render(&refs, &[0, 0, 0]).unwrap();
    assert_eq!(out.pixel(5, 30), &[60]);
    assert_eq!(out.pixel(60, 30), &[120]);
    assert_eq!(out.pixel(115, 30), &[180]);
}

#[test]
fn supplied_luts_are_applied_per_camera() {
    let mut o = opts(BlendChoice::Seam(SeamMode::Fast { radius: 5 }), ExecBackend::Serial);
    o.correction = Correction::Luts(vec![
        ChannelLuts::Uniform(Lut::linear(1.0, 20.0)),
        ChannelLuts::identity(),
    ]);
    let mut stage = RenderStage::prepare(strips(2, Size::new(100, 50)), o).unwrap();
    let out = stage.render(&[&gray(100), &gray(140)], &[0, 0]).unwrap();
    assert_eq!(out.pixel(2, 10), &[120]);
    assert_eq!(out.pixel(97, 10), &[140]);
}

#[test]
fn malformed_luts_are_skipped() {
    let mut o = opts(BlendChoice::Linear { radius: 4 }, ExecBackend::Serial);
    o.correction = Correction::Luts(vec![ChannelLuts::Uniform(Lut::linear(2.0, 0.0))]);
    let mut stage = RenderStage::prepare(strips(2, Size::new(100, 50)), o).unwrap();
    assert!(stage.luts().is_none());
    let out = stage.render(&[&gray(100), &gray(140)], &[0, 0]).unwrap();
    assert_eq!(out.pixel(2, 10), &[100]);

    let mut o = opts(BlendChoice::Linear { radius: 4 }, ExecBackend::Serial);
    o.correction = Correction::Luts(vec![
        ChannelLuts::PerChannel([Lut::linear(2.0, 0.0), Lut::identity(), Lut::identity()]),
        ChannelLuts::identity(),
    ]);
    let mut stage = RenderStage::prepare(strips(2, Size::new(100, 50)), o).unwrap();
    let out = stage.render(&[&gray(100), &gray(140)], &[0, 0]).unwrap();
    assert_eq!(out.pixel(2, 10), &[100]);
}

#[test]
fn auto_gain_is_derived_once_from_the_first_frame() {
    let mut o = opts(BlendChoice::Seam(SeamMode::Fast { radius: 5 }), ExecBackend::Serial);
    o.correction = Correction::AutoGain(GainCorrection::new(GainModel::Smoothness));
    let mut stage = RenderStage::prepare(strips(2, Size::new(100, 50)), o).unwrap();
    assert!(stage.luts().is_none());
    let out = stage.render(&[&gray(100), &gray(140)], &[0, 0]).unwrap();
    let luts = stage.luts().unwrap().to_vec();
    assert_eq!(luts.len(), 2);
    assert!(out.pixel(2, 10)[0] > 100);
    assert!(out.pixel(97, 10)[0] < 140);

    stage.render(&[&gray(10), &gray(250)], &[1, 1]).unwrap();
    assert_eq!(stage.luts().unwrap(), &luts[..]);
}

#[test]
fn auto_histogram_falls_back_to_identity_on_flat_frames() {
    let mut o = opts(BlendChoice::Linear { radius: 4 }, ExecBackend::Serial);
    o.correction = Correction::AutoHistogram(RansacOpts {
        seed: Some(7),
        ..RansacOpts::default()
    });
    let mut stage = RenderStage::prepare(strips(2, Size::new(100, 50)), o).unwrap();
    stage.render(&[&gray(100), &gray(140)], &[0, 0]).unwrap();
    let luts = stage.luts().unwrap();
    assert_eq!(luts.len(), 2);
    assert!(luts.iter().all(ChannelLuts::is_identity));
}

#[test]
fn custom_masks_override_inside_their_interval() {
    let mut custom = CustomMasks::new(2);
    custom.add(0, 0, 1_000, Mask::new(100, 50)).unwrap();
    let mut o = opts(BlendChoice::Linear { radius: 2 }, ExecBackend::Serial);
    o.custom_masks = Some(custom);
    let mut stage = RenderStage::prepare(strips(2, Size::new(100, 50)), o).unwrap();
    let (a, b) = (gray(100), gray(140));

    let masked = stage.render(&[&a, &b], &[500, 500]).unwrap();
    assert_eq!(masked.pixel(2, 10), &[0]);
    assert_eq!(masked.pixel(97, 10), &[140]);

    let normal = stage.render(&[&a, &b], &[1_000, 1_000]).unwrap();
    assert_eq!(normal.pixel(2, 10), &[100]);
}

/// Returns camera 0 for prepared blends and camera 1 for per-frame masks.
struct PickCamera;

impl BlendStrategy for PickCamera {
    fn prepare(&mut self, masks: &[Mask], _levels: u32, _min_side: u32) -> StitchResult<()> {
        validate_masks(masks).map(|_| ())
    }

    fn blend(&mut self, images: &[ImageBuf], out: &mut ImageBuf) -> StitchResult<()> {
        *out = images[0].clone();
        Ok(())
    }

    fn blend_with_masks(
        &mut self,
        images: &[ImageBuf],
        _masks: &[Mask],
        out: &mut ImageBuf,
    ) -> StitchResult<()> {
        *out = images[1].clone();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pick-camera"
    }
}

#[test]
fn external_strategy_gets_unique_masks() {
    let mut custom = CustomMasks::new(2);
    custom.add(1, 100, 200, Mask::full(100, 50)).unwrap();
    let mut o = opts(
        BlendChoice::External {
            strategy: Box::new(PickCamera),
            levels: 4,
            min_side: 2,
        },
        ExecBackend::Serial,
    );
    o.custom_masks = Some(custom);
    let mut stage = RenderStage::prepare(strips(2, Size::new(100, 50)), o).unwrap();
    let Compositor::External(_) = &stage.compositor else {
        panic!("expected external compositor");
    };
    assert!(stage.default_masks[0].and(&stage.default_masks[1]).is_empty());

    let (a, b) = (gray(100), gray(140));
    let plain = stage.render(&[&a, &b], &[0, 0]).unwrap();
    assert_eq!(plain.pixel(2, 2), &[100]);
    let custom = stage.render(&[&a, &b], &[150, 150]).unwrap();
    assert_eq!(custom.pixel(97, 2), &[140]);
}

#[test]
fn frame_count_and_format_are_checked() {
    let mut stage = RenderStage::prepare(
        strips(2, Size::new(100, 50)),
        opts(BlendChoice::Linear { radius: 2 }, ExecBackend::Serial),
    )
    .unwrap();
    assert!(stage.render(&[&gray(1)], &[0]).is_err());
    assert!(stage.render(&[&gray(1), &gray(1)], &[0]).is_err());
    let rgb = ImageBuf::new(50, 50, PixelFormat::Rgb8);
    assert!(stage.render(&[&gray(1), &rgb], &[0, 0]).is_err());
    assert_eq!(stage.frames_rendered(), 0);
}

#[test]
fn zero_threads_is_rejected() {
    assert!(
        RenderStage::prepare(
            strips(2, Size::new(100, 50)),
            opts(
                BlendChoice::Linear { radius: 2 },
                ExecBackend::Parallel { threads: Some(0) }
            ),
        )
        .is_err()
    );
}
