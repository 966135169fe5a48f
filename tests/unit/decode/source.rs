use super::*;

fn fps30() -> Fps {
    Fps::new(30, 1).unwrap()
}

#[test]
fn video_frames_carry_rate_based_timestamps() {
    let mut src = InMemorySource::from_frames(
        fps30(),
        (0..3).map(|v| ImageBuf::filled(4, 2, PixelFormat::Gray8, &[v]).unwrap()),
    )
    .unwrap();
    let info = src.info();
    assert_eq!((info.width, info.height), (4, 2));
    assert_eq!(info.frame_count, Some(3));
    assert!(!info.has_audio);

    let mut seen = Vec::new();
    while let Some(frame) = src.read().unwrap() {
        let MediaFrame::Video(v) = frame else {
            panic!("unexpected audio");
        };
        seen.push((v.timestamp_us, v.data[0]));
    }
    assert_eq!(seen, vec![(0, 0), (33_333, 1), (66_666, 2)]);
    assert_eq!(src.frames_read(), 3);
}

#[test]
fn audio_interleaves_in_push_order() {
    let mut src = InMemorySource::new(fps30());
    src.push_video(ImageBuf::new(2, 2, PixelFormat::Rgb8)).unwrap();
    src.push_audio(AudioPacket {
        timestamp_us: 10,
        data: vec![1, 2],
    });
    src.push_video(ImageBuf::new(2, 2, PixelFormat::Rgb8)).unwrap();
    assert!(src.info().has_audio);

    let kinds: Vec<&str> = std::iter::from_fn(|| {
        src.read().unwrap().map(|f| match f {
            MediaFrame::Video(_) => "v",
            MediaFrame::Audio { .. } => "a",
        })
    })
    .collect();
    assert_eq!(kinds, ["v", "a", "v"]);
}

#[test]
fn mismatched_frames_are_rejected() {
    let mut src = InMemorySource::new(fps30());
    src.push_video(ImageBuf::new(2, 2, PixelFormat::Rgb8)).unwrap();
    assert!(src.push_video(ImageBuf::new(4, 2, PixelFormat::Rgb8)).is_err());
    assert!(src.push_video(ImageBuf::new(2, 2, PixelFormat::Gray8)).is_err());
}
