use super::*;

use crate::decode::source::InMemorySource;
use crate::encode::sink::InMemorySink;
use crate::foundation::core::{Fps, PixelFormat};
use crate::render::geometry::StripGeometry;
use crate::render::stage::{BlendChoice, ExecBackend};

fn fps() -> Fps {
    Fps::new(25, 1).unwrap()
}

fn info(frames: Option<u64>) -> SourceInfo {
    SourceInfo {
        width: 8,
        height: 4,
        format: PixelFormat::Rgb8,
        fps: fps(),
        frame_count: frames,
        has_audio: false,
    }
}

fn source(value: u8, frames: usize) -> Box<dyn FrameSource> {
    let img = ImageBuf::filled(8, 4, PixelFormat::Rgb8, &[value; 3]).unwrap();
    Box::new(InMemorySource::from_frames(fps(), std::iter::repeat_n(img, frames)).unwrap())
}

fn output() -> OutputSpec {
    let mut out = OutputSpec::new(Size::new(16, 8), BlendChoice::Linear { radius: 2 });
    out.render.backend = ExecBackend::Serial;
    out
}

#[test]
fn expected_frames_takes_shortest_source_and_budget() {
    assert_eq!(expected_frames(&[info(Some(10)), info(Some(7))], None), Some(7));
    assert_eq!(expected_frames(&[info(Some(10)), info(Some(7))], Some(3)), Some(3));
    assert_eq!(expected_frames(&[info(Some(10)), info(None)], None), None);
    assert_eq!(expected_frames(&[info(None)], Some(5)), Some(5));
}

#[test]
fn sources_must_agree_on_format_and_rate() {
    assert!(check_sources(&[]).is_err());
    let mut gray = info(None);
    gray.format = PixelFormat::Gray8;
    assert!(check_sources(&[info(None), gray]).is_err());
    let mut slow = info(None);
    slow.fps = Fps::new(24, 1).unwrap();
    assert!(check_sources(&[info(None), slow]).is_err());
    let mut empty = info(None);
    empty.width = 0;
    assert!(check_sources(&[empty]).is_err());
    assert_eq!(check_sources(&[info(Some(2)), info(None)]).unwrap(), info(Some(2)));
}

#[test]
fn panic_payloads_are_readable() {
    let s: Box<dyn Any + Send> = Box::new("boom");
    assert_eq!(panic_message(s.as_ref()), "boom");
    let s: Box<dyn Any + Send> = Box::new(String::from("bang"));
    assert_eq!(panic_message(s.as_ref()), "bang");
    let s: Box<dyn Any + Send> = Box::new(42u32);
    assert_eq!(panic_message(s.as_ref()), "non-string panic payload");
}

#[test]
fn first_async_error_wins() {
    let shared = Shared::new(&TaskConfig::default());
    shared.record_error("render", "first".to_string());
    shared.record_error("encode", "second".to_string());
    assert!(shared.is_canceled());
    assert_eq!(shared.error_slot().take().as_deref(), Some("render: first"));
    assert!(shared.decoded.is_stopped());
}

#[test]
fn runs_to_completion_and_returns_buffers() {
    let sink = InMemorySink::new();
    let mut task = PipelineTask::new(TaskConfig::default());
    task.init(
        vec![source(50, 6), source(150, 6)],
        Box::new(sink.clone()),
        &StripGeometry::new(4),
        None,
        output(),
    )
    .unwrap();
    assert_eq!(task.state(), TaskState::Initialized);
    assert_eq!(task.expected_frames(), Some(6));
    task.start().unwrap();
    assert_eq!(task.wait_for_completion(), TaskState::Completed);
    assert_eq!(task.wait_for_completion(), TaskState::Completed);

    let rec = sink.recording();
    assert!(rec.ended);
    assert_eq!(rec.video.len(), 6);
    assert_eq!(task.progress(), 100);
    let stats = task.pool_stats();
    assert_eq!(stats.camera.outstanding, 0);
    assert_eq!(stats.output.outstanding, 0);
    assert!(stats.camera.allocated >= 2);
}

#[test]
fn init_twice_is_rejected() {
    let mut task = PipelineTask::new(TaskConfig::default());
    task.init(
        vec![source(1, 1)],
        Box::new(InMemorySink::new()),
        &StripGeometry::new(0),
        None,
        output(),
    )
    .unwrap();
    let again = task.init(
        vec![source(1, 1)],
        Box::new(InMemorySink::new()),
        &StripGeometry::new(0),
        None,
        output(),
    );
    assert!(again.is_err());
    assert!(task.last_sync_error_message().is_some());
}

#[test]
fn zero_queue_depth_fails_init() {
    let cfg = TaskConfig {
        render_queue_depth: 0,
        ..TaskConfig::default()
    };
    let mut task = PipelineTask::new(cfg);
    let err = task
        .init(
            vec![source(1, 1)],
            Box::new(InMemorySink::new()),
            &StripGeometry::new(0),
            None,
            output(),
        )
        .unwrap_err();
    assert!(err.to_string().contains("render queue depth"));
    assert_eq!(task.state(), TaskState::Created);
}
