//! End-to-end synchronization scenarios through a `SynchronizingBuffer`.

use grafton_playout::{
    AudioFrame, Error, Rational, SyncFrame, SynchronizingBuffer, VideoFormat, VideoFormatType,
    VideoFrame,
};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn buffer_25p() -> SynchronizingBuffer {
    SynchronizingBuffer::builder(VideoFormat::new(VideoFormatType::V1080p2500))
        .audio_channels(2)
        .sample_rate(48000)
        .playing(true)
        .build()
        .unwrap()
}

fn video(pts: i64) -> Arc<VideoFrame> {
    Arc::new(VideoFrame::builder().resolution(1920, 1080).pts(pts).build().unwrap())
}

fn audio(pts: i64, samples: usize, value: f32) -> Arc<AudioFrame> {
    Arc::new(
        AudioFrame::builder()
            .channels(2)
            .samples(samples)
            .pts(pts)
            .data(vec![value; samples * 2])
            .build()
            .unwrap(),
    )
}

/// 25 fps with 1920 samples per frame plays out ten frames with no padding
#[test]
fn test_steady_state_25p() {
    init_tracing();
    let mut buffer = buffer_25p();
    let tb = Rational::new(1, 25);

    for i in 0..10 {
        buffer.push_video(video(i), tb).unwrap();
        buffer.push_audio(audio(i * 1920, 1920, 0.1)).unwrap();
    }
    assert!(buffer.ready());

    let frames: Vec<SyncFrame> = (0..10).map(|_| buffer.pull_sync(1920)).collect();
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.time(), i as i64 * 40_000, "frame {i}");
        assert_eq!(frame.audio().num_samples, 1920);
        assert!(
            frame.audio().data().iter().all(|s| *s == 0.1),
            "frame {i} was padded"
        );
        assert_eq!(frame.audio().time(), Some(i as i64 * 40_000));
    }
    assert_eq!(buffer.video_queue_len(), 0);
    assert_eq!(buffer.audio_samples_count(), 0);
}

/// Audio delivered in blocks unrelated to the frame size is re-sliced exactly
#[test]
fn test_irregular_audio_blocks() {
    init_tracing();
    let mut buffer = buffer_25p();
    let tb = Rational::new(1, 25);
    for i in 0..4 {
        buffer.push_video(video(i), tb).unwrap();
    }
    let mut pts = 0;
    for block in [1000usize, 3000, 1024, 2656] {
        buffer.push_audio(audio(pts, block, 0.3)).unwrap();
        pts += block as i64;
    }
    assert_eq!(buffer.audio_samples_count(), 7680);

    for _ in 0..4 {
        let frame = buffer.pull_sync(1920);
        assert!(frame.audio().data().iter().all(|s| *s == 0.3));
    }
    assert_eq!(buffer.audio_samples_count(), 0);
}

/// Starved audio is padded with silence to the requested length
#[test]
fn test_audio_underrun_padding() {
    init_tracing();
    let mut buffer = buffer_25p();
    buffer.push_video(video(0), Rational::new(1, 25)).unwrap();
    buffer.push_audio(audio(0, 1000, 1.0)).unwrap();

    let frame = buffer.pull_sync(1920);
    let data = frame.audio().data();
    assert_eq!(frame.audio().num_samples, 1920);
    assert!(data[..2000].iter().all(|s| *s == 1.0));
    assert!(data[2000..].iter().all(|s| *s == 0.0));
}

/// A timeline jump in audio resets the FIFO to the new position
#[test]
fn test_audio_discontinuity_resets() {
    init_tracing();
    let mut buffer = buffer_25p();
    buffer.push_audio(audio(0, 1920, 0.2)).unwrap();
    buffer.push_audio(audio(48000 * 5, 1920, 0.7)).unwrap();
    assert_eq!(buffer.audio_samples_count(), 1920);

    buffer.push_video(video(125), Rational::new(1, 25)).unwrap();
    let frame = buffer.pull_sync(1920);
    assert_eq!(frame.time(), 5_000_000);
    assert_eq!(frame.audio().time(), Some(5_000_000));
    assert!(frame.audio().data().iter().all(|s| *s == 0.7));
}

/// Pause holds the picture, resumes where it left off
#[test]
fn test_pause_and_resume() {
    init_tracing();
    let mut buffer = buffer_25p();
    let tb = Rational::new(1, 25);
    for i in 0..3 {
        buffer.push_video(video(i), tb).unwrap();
        buffer.push_audio(audio(i * 1920, 1920, 0.5)).unwrap();
    }

    assert_eq!(buffer.pull_sync(1920).time(), 0);
    buffer.set_is_playing(false);
    for _ in 0..3 {
        let frame = buffer.pull_sync(1920);
        assert_eq!(frame.time(), 0);
        assert!(frame.audio().is_silent());
    }
    assert_eq!(buffer.video_queue_len(), 2);

    buffer.set_is_playing(true);
    let frame = buffer.pull_sync(1920);
    assert_eq!(frame.time(), 40_000);
    assert!(frame.audio().data().iter().all(|s| *s == 0.5));
}

/// Flush drains what is buffered, then reports EOF and refuses pushes
#[test]
fn test_flush_drain_and_seek() {
    init_tracing();
    let mut buffer = buffer_25p();
    let tb = Rational::new(1, 25);
    for i in 0..2 {
        buffer.push_video(video(i), tb).unwrap();
        buffer.push_audio(audio(i * 1920, 1920, 0.5)).unwrap();
    }
    buffer.flush();
    assert!(buffer.ready());
    assert!(buffer.full());
    assert!(!buffer.is_eof());
    assert!(matches!(buffer.push_video(video(2), tb), Err(Error::BufferFlushed)));
    assert!(matches!(
        buffer.push_audio(audio(3840, 1920, 0.5)),
        Err(Error::BufferFlushed)
    ));

    buffer.pull_sync(1920);
    buffer.pull_sync(1920);
    assert!(buffer.is_eof());
    // Drained buffer keeps repeating the last picture.
    assert_eq!(buffer.pull_sync(1920).time(), 40_000);

    buffer.seek(10_000_000);
    assert!(!buffer.is_eof());
    assert!(!buffer.ready());
    let frame = buffer.pull_sync(1920);
    assert_eq!(frame.time(), 10_000_000);
    buffer.push_video(video(250), tb).unwrap();
    assert_eq!(buffer.video_queue_len(), 1);
}

/// An over-long video backlog is discarded instead of growing without bound
#[test]
fn test_video_backlog_bounded() {
    init_tracing();
    let mut buffer = buffer_25p();
    let tb = Rational::new(1, 25);
    let capacity = buffer.video_queue_capacity();
    assert_eq!(capacity, 250);

    for i in 0..capacity as i64 {
        buffer.push_video(video(i), tb).unwrap();
    }
    assert_eq!(buffer.video_queue_len(), capacity);
    buffer.push_video(video(capacity as i64), tb).unwrap();
    assert_eq!(buffer.video_queue_len(), 1);
    assert_eq!(buffer.pull_sync(1920).time(), 10_000_000);
}
