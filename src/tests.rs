//! Cross-module tests for the grafton-playout library.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use crate::{
    buffered_source::BufferedSource,
    channel::{Channel, ChannelOptions, SourceState},
    clock::SampleCounter,
    device::{InputSource, OutputDevice},
    format::{PixelFormat, VideoFormat, VideoFormatType},
    frames::{AudioFrame, VideoFrame},
    level::LevelMode,
    preview::PreviewOutput,
    synchronizing_buffer::SynchronizingBuffer,
    time::Rational,
};

fn push_frames(source: &BufferedSource, format: &VideoFormat, count: i64, samples: usize) {
    let tb = format.frame_duration();
    for i in 0..count {
        let video = VideoFrame::builder()
            .resolution(format.width(), format.height())
            .pixel_format(PixelFormat::Yuv422)
            .pts(i)
            .build()
            .unwrap();
        source.push_video(Arc::new(video), tb).unwrap();
        let audio = AudioFrame::builder()
            .channels(2)
            .samples(samples)
            .pts(i * samples as i64)
            .data(vec![0.5; samples * 2])
            .build()
            .unwrap();
        source.push_audio(Arc::new(audio)).unwrap();
    }
}

/// The 29.97 sample cadence drains a buffer fed in 1601/1602 blocks without underrun
#[test]
fn test_ntsc_cadence_through_buffer() {
    let format = VideoFormat::new(VideoFormatType::V1080p2997);
    let mut buffer = SynchronizingBuffer::builder(format)
        .audio_channels(2)
        .playing(true)
        .build()
        .unwrap();
    let mut producer = SampleCounter::new(48000, format.frame_rate());
    let mut consumer = SampleCounter::new(48000, format.frame_rate());

    for i in 0..10 {
        let video = VideoFrame::builder().resolution(1920, 1080).pts(i).build().unwrap();
        buffer
            .push_video(Arc::new(video), format.frame_duration())
            .unwrap();
        let samples = producer.samples_required();
        let audio = AudioFrame::builder()
            .channels(2)
            .samples(samples)
            .pts(producer.samples())
            .data(vec![0.25; samples * 2])
            .build()
            .unwrap();
        buffer.push_audio(Arc::new(audio)).unwrap();
        producer.advance(samples);
    }

    for _ in 0..10 {
        let samples = consumer.samples_required();
        let frame = buffer.pull_sync(samples);
        assert_eq!(frame.audio().num_samples, samples);
        assert!(frame.audio().data().iter().all(|s| *s == 0.25));
        consumer.advance(samples);
    }
    assert_eq!(consumer.samples(), producer.samples());
    assert_eq!(buffer.audio_samples_count(), 0);
}

/// Ticks served by hand reach the preview output with the source's frames
#[test]
fn test_channel_to_preview() {
    let options = ChannelOptions::builder("cross")
        .video_format(VideoFormatType::V1080p2500)
        .level_mode(LevelMode::Peak)
        .build()
        .unwrap();
    let channel = Channel::new(&options).unwrap();
    let preview = Arc::new(PreviewOutput::new("monitor").unwrap());
    let output: Arc<dyn OutputDevice> = preview.clone();
    channel.add_output(&output).unwrap();

    let levels = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&levels);
    channel.set_audio_volume_callback(Some(Arc::new(move |values: &[f64]| {
        sink.lock().unwrap().push(values.to_vec());
    })));

    let source = Arc::new(BufferedSource::new("clip", &options).unwrap());
    push_frames(&source, &options.format(), 5, 1920);
    source.play();
    channel.load(source.clone()).unwrap();
    assert_eq!(channel.source_state(), SourceState::Playing);

    for _ in 0..3 {
        channel.request_frame(1920);
    }
    channel.sync_outputs().unwrap();
    preview.sync().unwrap();

    assert_eq!(preview.frames_received(), 3);
    assert_eq!(preview.last_frame().map(|f| f.time()), Some(80_000));
    assert_eq!(levels.lock().unwrap().as_slice(), &vec![vec![0.5, 0.5]; 3][..]);
    assert_eq!(source.buffered_video_frames(), 2);
}

/// Preload keeps the current source on air until the new one is ready
#[test]
fn test_preload_switches_on_ready_tick() {
    let options = ChannelOptions::builder("switch")
        .video_format(VideoFormatType::V1080p2500)
        .build()
        .unwrap();
    let channel = Channel::new(&options).unwrap();
    let first = Arc::new(BufferedSource::new("first", &options).unwrap());
    push_frames(&first, &options.format(), 10, 1920);
    first.play();
    channel.load(first.clone()).unwrap();

    let second = Arc::new(BufferedSource::new("second", &options).unwrap());
    second.play();
    let loaded = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&loaded);
    second.set_loaded_callback(Some(Arc::new(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    })));
    channel.preload(second.clone()).unwrap();
    assert_eq!(channel.source_state(), SourceState::Loading);

    channel.request_frame(1920);
    assert_eq!(first.buffered_video_frames(), 9);

    push_frames(&second, &options.format(), 3, 1920);
    assert_eq!(channel.source_state(), SourceState::Ready);
    channel.request_frame(1920);

    assert_eq!(first.buffered_video_frames(), 9);
    assert_eq!(second.buffered_video_frames(), 2);
    assert_eq!(loaded.load(Ordering::SeqCst), 1);
    assert!(!first.is_added_to_channel(channel.info()));
    assert!(second.is_added_to_channel(channel.info()));
    assert_eq!(channel.source_state(), SourceState::Playing);
}

#[test]
fn test_rational_video_time_base() {
    let options = ChannelOptions::builder("tb")
        .video_format(VideoFormatType::V1080p2500)
        .build()
        .unwrap();
    let channel = Channel::new(&options).unwrap();
    let source = Arc::new(BufferedSource::new("clip", &options).unwrap());
    let video = VideoFrame::builder()
        .resolution(1920, 1080)
        .pixel_format(PixelFormat::Yuv422)
        .pts(90_000)
        .build()
        .unwrap();
    source
        .push_video(Arc::new(video), Rational::new(1, 90_000))
        .unwrap();
    source.play();
    channel.load(source).unwrap();

    let preview = Arc::new(PreviewOutput::new("p").unwrap());
    let output: Arc<dyn OutputDevice> = preview.clone();
    channel.add_output(&output).unwrap();
    channel.request_frame(1920);
    channel.sync_outputs().unwrap();
    preview.sync().unwrap();
    assert_eq!(preview.last_frame().map(|f| f.time()), Some(1_000_000));
}
