//! Capture-style input source.
//!
//! A capture card delivers frames in real time and cannot be buffered ahead,
//! so a `LiveSource` keeps only the most recent picture and a short audio
//! FIFO. Every pull returns the latest captured picture (black until the
//! first capture) together with whatever audio arrived since the last pull.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::{debug, trace, warn};

use crate::{
    audio_fifo::AudioFifo,
    channel::ChannelOptions,
    device::{
        ChannelId, ChannelInfo, EventCallback, InputSource, SourceCallbacks, TimeCallback,
    },
    format::{FieldOrder, PixelFormat, VideoFormat},
    frames::{AudioFrame, VideoFrame},
    sync_frame::SyncFrame,
    time::{rescale, Rational, TIME_BASE},
    Error, Result,
};

/// Microseconds of captured audio held between pulls.
const LIVE_AUDIO_BUFFER: i64 = 100_000;

/// SMPTE timecode as delivered by capture hardware.
///
/// Drop-frame counting is not compensated: the frame number uses the
/// nominal (rounded up) frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl Timecode {
    pub fn new(hours: u8, minutes: u8, seconds: u8, frames: u8) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            frames,
        }
    }

    /// Frames since midnight at `frame_rate`.
    pub fn frame_number(&self, frame_rate: Rational) -> i64 {
        let nominal = (frame_rate.num + frame_rate.den - 1) / frame_rate.den;
        let seconds = (i64::from(self.hours) * 60 + i64::from(self.minutes)) * 60
            + i64::from(self.seconds);
        seconds * nominal + i64::from(self.frames)
    }

    /// Presentation time in microseconds at `frame_rate`.
    pub fn time(&self, frame_rate: Rational) -> i64 {
        rescale(
            self.frame_number(frame_rate),
            TIME_BASE * frame_rate.den,
            frame_rate.num,
        )
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

struct LiveState {
    fifo: AudioFifo,
    last_video: Option<(Arc<VideoFrame>, i64)>,
    black: Arc<VideoFrame>,
    frames_captured: i64,
}

/// An [`InputSource`] fed by a real-time capture device.
pub struct LiveSource {
    name: String,
    format: VideoFormat,
    pixel_format: PixelFormat,
    audio_channels: usize,
    sample_rate: u32,
    state: Mutex<LiveState>,
    playing: AtomicBool,
    callbacks: SourceCallbacks,
    channels: Mutex<BTreeSet<ChannelId>>,
}

impl fmt::Debug for LiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("LiveSource")
            .field("name", &self.name)
            .field("format", &self.format.format_type())
            .field("playing", &self.is_playing())
            .field("frames_captured", &state.frames_captured)
            .field("audio_samples", &state.fifo.samples_count())
            .finish()
    }
}

impl LiveSource {
    /// A playing source matching the channel configured by `options`.
    pub fn new<S: Into<String>>(name: S, options: &ChannelOptions) -> Result<Self> {
        let format = options.format();
        let fifo = AudioFifo::new(
            options.audio_channels,
            options.sample_rate,
            0,
            LIVE_AUDIO_BUFFER,
        )?;
        Ok(Self {
            name: name.into(),
            format,
            pixel_format: options.pixel_format,
            audio_channels: options.audio_channels,
            sample_rate: options.sample_rate,
            state: Mutex::new(LiveState {
                fifo,
                last_video: None,
                black: Arc::new(VideoFrame::black(&format, options.pixel_format)),
                frames_captured: 0,
            }),
            playing: AtomicBool::new(true),
            callbacks: SourceCallbacks::default(),
            channels: Mutex::new(BTreeSet::new()),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a captured picture and return its presentation time.
    ///
    /// The time comes from `timecode` when the hardware provides one and
    /// from the running capture count otherwise. The frame's pts is set to
    /// its frame number.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFrame`] if the picture doesn't match the format.
    pub fn capture_video(&self, mut frame: VideoFrame, timecode: Option<Timecode>) -> Result<i64> {
        if frame.width != self.format.width()
            || frame.height != self.format.height()
            || frame.pixel_format != self.pixel_format
        {
            return Err(Error::InvalidFrame(format!(
                "Captured {}x{} {:?} frame doesn't match {}",
                frame.width,
                frame.height,
                frame.pixel_format,
                self.format.format_type()
            )));
        }

        let frame_rate = self.format.frame_rate();
        let mut state = self.lock_state();
        let frame_number = timecode.map_or(state.frames_captured, |tc| tc.frame_number(frame_rate));
        let time = rescale(frame_number, TIME_BASE * frame_rate.den, frame_rate.num);
        frame.pts = Some(frame_number);
        state.frames_captured += 1;
        state.last_video = Some((Arc::new(frame), time));
        trace!(source = %self.name, time, "video captured");
        Ok(time)
    }

    /// Append captured audio. A block that overruns the short FIFO or
    /// breaks continuity resets it.
    pub fn capture_audio(&self, frame: &AudioFrame) {
        let mut state = self.lock_state();
        if state.fifo.try_push(frame) {
            return;
        }
        let time = frame.time().unwrap_or_else(|| state.fifo.time_max());
        warn!(
            source = %self.name,
            buffered = state.fifo.samples_count(),
            time,
            "capture audio overrun, resetting"
        );
        state.fifo.reset(time);
        if !state.fifo.try_push(frame) {
            debug!(
                source = %self.name,
                samples = frame.num_samples,
                channels = frame.num_channels,
                "captured audio block rejected"
            );
        }
    }

    pub fn frames_captured(&self) -> i64 {
        self.lock_state().frames_captured
    }

    pub fn buffered_audio_samples(&self) -> usize {
        self.lock_state().fifo.samples_count()
    }
}

impl InputSource for LiveSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pull_sync(&self, _channel: &ChannelInfo, audio_sample_count: usize) -> SyncFrame {
        let playing = self.is_playing();
        let frame = {
            let mut state = self.lock_state();
            // Drained either way so a paused source doesn't build latency.
            let captured = state.fifo.pull(audio_sample_count);
            let audio = if playing {
                captured
            } else {
                AudioFrame::silence(audio_sample_count, self.audio_channels, self.sample_rate)
            };
            let (video, time) = match &state.last_video {
                Some((video, time)) => (Arc::clone(video), *time),
                None => (Arc::clone(&state.black), 0),
            };
            SyncFrame::new(Arc::new(audio), video, time)
        };
        if playing {
            self.callbacks.frame_played(frame.time());
        }
        frame
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn add_to_channel(&self, channel: &ChannelInfo) -> Result<()> {
        if channel.format.format_type() != self.format.format_type()
            || channel.audio_channels != self.audio_channels
            || channel.sample_rate != self.sample_rate
        {
            return Err(Error::InvalidConfiguration(format!(
                "Live source {} captures {} and cannot feed {} running {}",
                self.name,
                self.format.format_type(),
                channel.id,
                channel.format.format_type()
            )));
        }
        let added = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.id);
        if added {
            debug!(source = %self.name, channel = %channel.id, "live source added to channel");
            self.callbacks.loaded();
        }
        Ok(())
    }

    fn remove_from_channel(&self, channel: &ChannelInfo) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&channel.id);
    }

    fn is_added_to_channel(&self, channel: &ChannelInfo) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&channel.id)
    }

    fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Release);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn width(&self) -> u32 {
        self.format.width()
    }

    fn height(&self) -> u32 {
        self.format.height()
    }

    fn field_order(&self) -> FieldOrder {
        self.format.field_order()
    }

    fn audio_channel_count(&self) -> usize {
        self.audio_channels
    }

    fn has_alpha_channel(&self) -> bool {
        self.pixel_format.has_alpha()
    }

    fn set_frame_played_callback(&self, callback: Option<TimeCallback>) {
        self.callbacks.set_frame_played(callback);
    }

    fn set_stopped_callback(&self, callback: Option<EventCallback>) {
        self.callbacks.set_stopped(callback);
    }

    fn set_loaded_callback(&self, callback: Option<EventCallback>) {
        self.callbacks.set_loaded(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VideoFormatType;

    fn options() -> ChannelOptions {
        ChannelOptions::builder("live")
            .video_format(VideoFormatType::V720p5000)
            .pixel_format(PixelFormat::Yuv422)
            .audio_channels(2)
            .build()
            .unwrap()
    }

    fn info(options: &ChannelOptions) -> ChannelInfo {
        ChannelInfo {
            id: ChannelId::next(),
            format: options.format(),
            pixel_format: options.pixel_format,
            audio_channels: options.audio_channels,
            sample_rate: options.sample_rate,
        }
    }

    fn picture() -> VideoFrame {
        VideoFrame::builder()
            .resolution(1280, 720)
            .pixel_format(PixelFormat::Yuv422)
            .build()
            .unwrap()
    }

    #[test]
    fn test_timecode_frame_number() {
        let tc = Timecode::new(1, 0, 0, 10);
        assert_eq!(tc.frame_number(Rational::new(25, 1)), 90_010);
        assert_eq!(tc.frame_number(Rational::new(30000, 1001)), 108_010);
        assert_eq!(Timecode::new(0, 0, 2, 0).time(Rational::new(25, 1)), 2_000_000);
        assert_eq!(tc.to_string(), "01:00:00:10");
    }

    /// Black is returned until the first capture, then the latest picture repeats
    #[test]
    fn test_last_video_or_black() {
        let options = options();
        let channel = info(&options);
        let source = LiveSource::new("cam", &options).unwrap();
        assert!(source.is_ready());

        let first = source.pull_sync(&channel, 960);
        assert_eq!(first.video().width, 1280);
        assert_eq!(first.time(), 0);
        assert!(first.audio().is_silent());

        assert_eq!(source.capture_video(picture(), None).unwrap(), 0);
        assert_eq!(source.capture_video(picture(), None).unwrap(), 20_000);
        let a = source.pull_sync(&channel, 960);
        let b = source.pull_sync(&channel, 960);
        assert_eq!(a.time(), 20_000);
        assert!(Arc::ptr_eq(a.video(), b.video()));
        assert_eq!(a.video().pts, Some(1));
    }

    #[test]
    fn test_timecode_stamps_capture() {
        let source = LiveSource::new("cam", &options()).unwrap();
        let time = source
            .capture_video(picture(), Some(Timecode::new(0, 0, 1, 5)))
            .unwrap();
        assert_eq!(time, 1_100_000);
    }

    #[test]
    fn test_rejects_mismatched_picture() {
        let source = LiveSource::new("cam", &options()).unwrap();
        assert!(matches!(
            source.capture_video(VideoFrame::default(), None),
            Err(Error::InvalidFrame(_))
        ));
        assert_eq!(source.frames_captured(), 0);
    }

    /// An overrun resets the short FIFO instead of growing latency
    #[test]
    fn test_audio_overrun_resets() {
        let source = LiveSource::new("cam", &options()).unwrap();
        let block = |pts: i64| {
            AudioFrame::builder()
                .channels(2)
                .samples(2400)
                .pts(pts)
                .build()
                .unwrap()
        };
        source.capture_audio(&block(0));
        source.capture_audio(&block(2400));
        assert_eq!(source.buffered_audio_samples(), 4800);
        source.capture_audio(&block(4800));
        assert_eq!(source.buffered_audio_samples(), 2400);
    }

    #[test]
    fn test_seek_unsupported() {
        let source = LiveSource::new("cam", &options()).unwrap();
        assert!(matches!(source.seek(0), Err(Error::SeekUnsupported(_))));
    }

    #[test]
    fn test_loaded_on_add() {
        let options = options();
        let channel = info(&options);
        let source = LiveSource::new("cam", &options).unwrap();
        let loaded = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&loaded);
        source.set_loaded_callback(Some(Arc::new(move || seen.store(true, Ordering::SeqCst))));
        source.add_to_channel(&channel).unwrap();
        assert!(loaded.load(Ordering::SeqCst));
        assert!(source.is_added_to_channel(&channel));
    }
}
