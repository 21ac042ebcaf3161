//! Per-source jitter buffer turning irregular pushes into one frame per pull.
//!
//! A decoder or capture thread pushes decoded video and audio whenever it has
//! them; the channel tick pulls exactly one [`SyncFrame`] per frame interval.
//! The buffer bounds memory by dropping the video queue when it grows past
//! about ten seconds and by resetting the audio FIFO on overflow, and it
//! implements play/pause, seek and end-of-stream semantics.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use grafton_playout::{
//!     AudioFrame, Rational, SynchronizingBuffer, VideoFormat, VideoFormatType, VideoFrame,
//! };
//!
//! # fn main() -> Result<(), grafton_playout::Error> {
//! let format = VideoFormat::new(VideoFormatType::V1080p2500);
//! let mut buffer = SynchronizingBuffer::builder(format)
//!     .audio_channels(2)
//!     .playing(true)
//!     .build()?;
//!
//! let video = VideoFrame::builder().resolution(1920, 1080).pts(0).build()?;
//! buffer.push_video(Arc::new(video), Rational::new(1, 25))?;
//! let audio = AudioFrame::builder().channels(2).samples(1920).pts(0).build()?;
//! buffer.push_audio(Arc::new(audio))?;
//!
//! let frame = buffer.pull_sync(1920);
//! assert_eq!(frame.time(), 0);
//! assert_eq!(frame.audio().num_samples, 1920);
//! # Ok(())
//! # }
//! ```

use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use tracing::{debug, trace};

use crate::{
    audio_fifo::AudioFifo,
    format::{PixelFormat, VideoFormat},
    frames::{AudioFrame, VideoFrame},
    sync_frame::SyncFrame,
    time::{pts_to_time, rescale, Rational, TIME_BASE},
    Error, Result,
};

/// Default audio sample rate of a channel.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Seconds of video the queue may hold before it is dropped.
const VIDEO_QUEUE_SECONDS: i64 = 10;

/// Seconds of audio the FIFO may hold.
const AUDIO_FIFO_SECONDS: i64 = 10;

/// Jitter buffer for one input source.
///
/// Not internally synchronized: the owner serializes pushes and pulls (for
/// example with a `Mutex`), which also gives the ordering guarantee that a
/// pull observes every push completed before it.
pub struct SynchronizingBuffer {
    format: VideoFormat,
    pixel_format: PixelFormat,
    sample_rate: u32,
    audio_channels: usize,
    duration: i64,
    is_playing: bool,
    is_flushed: bool,
    sync: i64,
    video_queue: VecDeque<(Arc<VideoFrame>, Rational)>,
    fifo: Option<AudioFifo>,
    last_video: Option<(Arc<VideoFrame>, Rational)>,
    black: Arc<VideoFrame>,
}

impl fmt::Debug for SynchronizingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizingBuffer")
            .field("format", &self.format.format_type())
            .field("audio_channels", &self.audio_channels)
            .field("is_playing", &self.is_playing)
            .field("is_flushed", &self.is_flushed)
            .field("sync", &self.sync)
            .field("video_queue_len", &self.video_queue.len())
            .field("audio_samples", &self.audio_samples_count())
            .field("has_last_video", &self.last_video.is_some())
            .finish()
    }
}

impl SynchronizingBuffer {
    /// Create a builder for a buffer delivering frames in `format`.
    pub fn builder(format: VideoFormat) -> SynchronizingBufferBuilder {
        SynchronizingBufferBuilder::new(format)
    }

    /// Queue a decoded picture.
    ///
    /// `time_base` is the unit of the frame's pts; it is recorded with the
    /// frame because a source may change it mid-stream. When the queue already
    /// holds [`video_queue_capacity`](Self::video_queue_capacity) frames it is
    /// emptied before the new frame is added.
    ///
    /// # Errors
    ///
    /// [`Error::BufferFlushed`] after [`flush`](Self::flush), and
    /// [`Error::InvalidConfiguration`] for an unusable time base. The buffer is
    /// unchanged in both cases.
    pub fn push_video(&mut self, frame: Arc<VideoFrame>, time_base: Rational) -> Result<()> {
        if self.is_flushed {
            return Err(Error::BufferFlushed);
        }
        if !time_base.is_valid() {
            return Err(Error::InvalidConfiguration(format!(
                "Invalid video time base: {time_base}"
            )));
        }
        trace!(time = ?frame.time(time_base), "push video");
        if self.video_queue.len() >= self.video_queue_capacity() {
            debug!(
                dropped = self.video_queue.len(),
                "video queue overflow, flushing"
            );
            self.video_queue.clear();
        }
        self.video_queue.push_back((frame, time_base));
        Ok(())
    }

    /// Append decoded audio, creating the FIFO on first use.
    ///
    /// A block the FIFO refuses (overflow or timeline gap) resets the FIFO to
    /// the block's time and is pushed again; the producer is never blocked.
    /// Audio pushed into a buffer built without audio channels is ignored.
    ///
    /// # Errors
    ///
    /// [`Error::BufferFlushed`] after [`flush`](Self::flush), and
    /// [`Error::InvalidFrame`] if the block's channel count or sample rate
    /// doesn't match the buffer.
    pub fn push_audio(&mut self, frame: Arc<AudioFrame>) -> Result<()> {
        if self.is_flushed {
            return Err(Error::BufferFlushed);
        }
        if self.audio_channels == 0 {
            return Ok(());
        }
        if frame.num_channels != self.audio_channels || frame.sample_rate != self.sample_rate {
            return Err(Error::InvalidFrame(format!(
                "Audio block has {} channels at {} Hz, buffer expects {} channels at {} Hz",
                frame.num_channels, frame.sample_rate, self.audio_channels, self.sample_rate
            )));
        }

        let time = frame.time().unwrap_or(self.sync);
        if self.fifo.is_none() {
            self.fifo = Some(AudioFifo::new(
                self.audio_channels,
                self.sample_rate,
                time,
                AUDIO_FIFO_SECONDS * TIME_BASE,
            )?);
        }
        let Some(fifo) = self.fifo.as_mut() else {
            return Ok(());
        };

        if !fifo.try_push(&frame) {
            debug!(
                buffered = fifo.samples_count(),
                time, "audio FIFO overflow or discontinuity, resetting"
            );
            fifo.reset(time);
            if !fifo.try_push(&frame) {
                debug!(
                    samples = frame.num_samples,
                    "audio block larger than FIFO capacity, dropped"
                );
            }
        }
        Ok(())
    }

    /// Produce the next synchronized frame.
    ///
    /// While playing, the front of the video queue is popped (the last frame
    /// is repeated when the queue is empty) and `audio_sample_count` samples
    /// are pulled from the FIFO. While paused nothing is consumed: the last
    /// delivered picture is repeated with silence. Before any picture has
    /// been delivered a black frame stamped with the synchronization anchor
    /// is used.
    pub fn pull_sync(&mut self, audio_sample_count: usize) -> SyncFrame {
        let audio = match (self.is_playing, self.fifo.as_mut()) {
            (true, Some(fifo)) => fifo.pull(audio_sample_count),
            _ => AudioFrame::silence(audio_sample_count, self.audio_channels, self.sample_rate),
        };

        if self.is_playing || self.last_video.is_none() {
            if let Some(front) = self.video_queue.front() {
                self.last_video = Some(front.clone());
            }
        }
        if self.is_playing {
            self.video_queue.pop_front();
        }

        let (video, time) = match &self.last_video {
            Some((frame, time_base)) => (
                Arc::clone(frame),
                frame
                    .pts
                    .map_or(self.sync, |pts| pts_to_time(pts, *time_base)),
            ),
            None => (Arc::clone(&self.black), self.sync),
        };

        trace!(
            video_time = time,
            audio_time = ?audio.time(),
            "pull sync"
        );
        SyncFrame::new(Arc::new(audio), video, time)
    }

    /// Whether pulling can start without immediately starving.
    ///
    /// A flushed buffer is always ready. While playing, video must be queued
    /// and the FIFO (if any) must hold more than one frame interval of
    /// samples. While paused, any picture to show is enough.
    pub fn ready(&self) -> bool {
        if self.is_flushed {
            return true;
        }
        if self.is_playing {
            !self.video_queue.is_empty()
                && self
                    .fifo
                    .as_ref()
                    .map_or(true, |fifo| fifo.samples_count() as i64 > self.samples_per_frame())
        } else {
            self.last_video.is_some() || !self.video_queue.is_empty()
        }
    }

    /// Whether the target duration is buffered in both media types.
    ///
    /// Producers poll this to throttle decoding that runs faster than real time.
    pub fn full(&self) -> bool {
        if self.is_flushed {
            return true;
        }
        let frame_rate = self.format.frame_rate();
        let video_target = rescale(self.duration, frame_rate.num, frame_rate.den * TIME_BASE);
        let audio_target = rescale(self.duration, i64::from(self.sample_rate), TIME_BASE);
        self.video_queue.len() as i64 >= video_target
            && self
                .fifo
                .as_ref()
                .map_or(true, |fifo| fifo.samples_count() as i64 > audio_target)
    }

    pub fn set_is_playing(&mut self, is_playing: bool) {
        self.is_playing = is_playing;
        debug!(is_playing, "synchronizing buffer play state changed");
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Drop everything buffered and re-anchor at `time` (microseconds).
    pub fn seek(&mut self, time: i64) {
        if let Some(fifo) = self.fifo.as_mut() {
            fifo.reset(time);
        }
        self.video_queue.clear();
        self.last_video = None;
        self.is_flushed = false;
        self.sync = time;
        debug!(time, "synchronizing buffer seek");
    }

    /// Mark the end of input. Buffered content stays drainable.
    pub fn flush(&mut self) {
        self.is_flushed = true;
        debug!("synchronizing buffer flushed");
    }

    pub fn is_flushed(&self) -> bool {
        self.is_flushed
    }

    /// Flushed and fully drained.
    pub fn is_eof(&self) -> bool {
        self.is_flushed
            && self.video_queue.is_empty()
            && self.fifo.as_ref().map_or(true, |fifo| fifo.samples_count() == 0)
    }

    /// Set the synchronization anchor used to stamp synthesized frames.
    pub fn set_synchro(&mut self, time: i64) {
        self.sync = time;
        debug!(time, "synchronizing buffer sync set");
    }

    pub fn synchro(&self) -> i64 {
        self.sync
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn audio_channels(&self) -> usize {
        self.audio_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn video_queue_len(&self) -> usize {
        self.video_queue.len()
    }

    /// Queue length at which the next push empties the queue (about ten seconds).
    pub fn video_queue_capacity(&self) -> usize {
        let frame_rate = self.format.frame_rate();
        (frame_rate.num * VIDEO_QUEUE_SECONDS / frame_rate.den).max(1) as usize
    }

    pub fn audio_samples_count(&self) -> usize {
        self.fifo.as_ref().map_or(0, AudioFifo::samples_count)
    }

    fn samples_per_frame(&self) -> i64 {
        let frame_rate = self.format.frame_rate();
        rescale(i64::from(self.sample_rate), frame_rate.den, frame_rate.num)
    }
}

/// Builder for configuring a [`SynchronizingBuffer`].
#[derive(Debug, Clone)]
pub struct SynchronizingBufferBuilder {
    format: VideoFormat,
    pixel_format: Option<PixelFormat>,
    audio_channels: Option<usize>,
    sample_rate: Option<u32>,
    playing: Option<bool>,
    duration: Option<Duration>,
    initial_sync: Option<i64>,
}

impl SynchronizingBufferBuilder {
    pub fn new(format: VideoFormat) -> Self {
        Self {
            format,
            pixel_format: None,
            audio_channels: None,
            sample_rate: None,
            playing: None,
            duration: None,
            initial_sync: None,
        }
    }

    /// Pixel format of the black placeholder frame (default BGRA)
    #[must_use]
    pub fn pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = Some(pixel_format);
        self
    }

    /// Number of audio channels; zero disables audio (default 2)
    #[must_use]
    pub fn audio_channels(mut self, channels: usize) -> Self {
        self.audio_channels = Some(channels);
        self
    }

    /// Audio sample rate (default 48000)
    #[must_use]
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Initial play state (default paused)
    #[must_use]
    pub fn playing(mut self, playing: bool) -> Self {
        self.playing = Some(playing);
        self
    }

    /// Target buffered duration reported by `full()` (default 1 second)
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Initial synchronization anchor in microseconds (default 0)
    #[must_use]
    pub fn initial_sync(mut self, time: i64) -> Self {
        self.initial_sync = Some(time);
        self
    }

    /// Build the buffer
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate or duration is zero, or the channel
    /// count exceeds the supported maximum.
    pub fn build(self) -> Result<SynchronizingBuffer> {
        let sample_rate = self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let audio_channels = self.audio_channels.unwrap_or(2);
        let duration = self.duration.unwrap_or(Duration::from_secs(1));
        let pixel_format = self.pixel_format.unwrap_or(PixelFormat::Bgra);

        if sample_rate == 0 {
            return Err(Error::InvalidConfiguration(
                "Sample rate must be greater than zero".into(),
            ));
        }
        if audio_channels > crate::frames::MAX_AUDIO_CHANNELS {
            return Err(Error::InvalidConfiguration(format!(
                "Too many audio channels: {audio_channels}"
            )));
        }
        if duration.is_zero() {
            return Err(Error::InvalidConfiguration(
                "Buffer duration must be greater than zero".into(),
            ));
        }

        let duration = i64::try_from(duration.as_micros()).map_err(|_| {
            Error::InvalidConfiguration(format!("Buffer duration too large: {duration:?}"))
        })?;

        Ok(SynchronizingBuffer {
            black: Arc::new(VideoFrame::black(&self.format, pixel_format)),
            format: self.format,
            pixel_format,
            sample_rate,
            audio_channels,
            duration,
            is_playing: self.playing.unwrap_or(false),
            is_flushed: false,
            sync: self.initial_sync.unwrap_or(0),
            video_queue: VecDeque::new(),
            fifo: None,
            last_video: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VideoFormatType;

    const TB: Rational = Rational::new(1, 25);

    fn video(pts: i64) -> Arc<VideoFrame> {
        Arc::new(
            VideoFrame::builder()
                .resolution(16, 9)
                .pts(pts)
                .build()
                .unwrap(),
        )
    }

    fn audio(pts: i64, samples: usize, value: f32) -> Arc<AudioFrame> {
        Arc::new(
            AudioFrame::builder()
                .channels(2)
                .data(vec![value; samples * 2])
                .pts(pts)
                .build()
                .unwrap(),
        )
    }

    fn buffer(playing: bool) -> SynchronizingBuffer {
        SynchronizingBuffer::builder(VideoFormat::new(VideoFormatType::V1080p2500))
            .audio_channels(2)
            .playing(playing)
            .build()
            .unwrap()
    }

    /// The video queue never grows past its capacity; overflow leaves one frame
    #[test]
    fn test_video_queue_bounded() {
        let mut buf = buffer(true);
        let cap = buf.video_queue_capacity();
        assert_eq!(cap, 250);
        for i in 0..cap as i64 {
            buf.push_video(video(i), TB).unwrap();
            assert!(buf.video_queue_len() <= cap);
        }
        assert_eq!(buf.video_queue_len(), cap);
        buf.push_video(video(cap as i64), TB).unwrap();
        assert_eq!(buf.video_queue_len(), 1);
    }

    /// Paused pulls repeat the last frame and consume no audio
    #[test]
    fn test_pause_holds_last_frame() {
        let mut buf = buffer(true);
        for i in 0..3 {
            buf.push_video(video(i), TB).unwrap();
            buf.push_audio(audio(i * 1920, 1920, 0.25)).unwrap();
        }
        let first = buf.pull_sync(1920);
        assert_eq!(first.time(), 0);
        let samples_before = buf.audio_samples_count();

        buf.set_is_playing(false);
        for _ in 0..5 {
            let held = buf.pull_sync(1920);
            assert!(Arc::ptr_eq(held.video(), first.video()));
            assert_eq!(held.time(), 0);
            assert!(held.audio().is_silent());
            assert_eq!(held.audio().num_samples, 1920);
        }
        assert_eq!(buf.audio_samples_count(), samples_before);
        assert_eq!(buf.video_queue_len(), 2);
    }

    /// While paused with nothing delivered yet, the queue front is shown without popping
    #[test]
    fn test_paused_shows_first_frame() {
        let mut buf = buffer(false);
        buf.push_video(video(7), TB).unwrap();
        assert!(buf.ready());
        let frame = buf.pull_sync(1920);
        assert_eq!(frame.time(), 280_000);
        assert_eq!(buf.video_queue_len(), 1);
    }

    /// Playing underrun repeats the last frame
    #[test]
    fn test_underrun_holds_last_frame() {
        let mut buf = buffer(true);
        buf.push_video(video(4), TB).unwrap();
        let a = buf.pull_sync(1920);
        let b = buf.pull_sync(1920);
        assert!(Arc::ptr_eq(a.video(), b.video()));
        assert_eq!(b.time(), 160_000);
    }

    /// Without any picture a black frame stamped with the anchor is delivered
    #[test]
    fn test_black_when_no_video() {
        let mut buf = SynchronizingBuffer::builder(VideoFormat::new(VideoFormatType::V1080p2500))
            .initial_sync(5_000_000)
            .build()
            .unwrap();
        let frame = buf.pull_sync(1920);
        assert_eq!(frame.time(), 5_000_000);
        assert_eq!(frame.video().width, 1920);
        assert_eq!(frame.video().height, 1080);
        assert_eq!(frame.audio().num_samples, 1920);
    }

    /// Seek discards pre-seek content and adopts the new anchor
    #[test]
    fn test_seek_resets_anchor() {
        let mut buf = buffer(true);
        for i in 0..10 {
            buf.push_video(video(i), TB).unwrap();
            buf.push_audio(audio(i * 1920, 1920, 0.5)).unwrap();
        }
        buf.pull_sync(1920);
        buf.flush();

        buf.seek(2_000_000);
        assert!(!buf.is_flushed());
        assert_eq!(buf.video_queue_len(), 0);
        assert_eq!(buf.audio_samples_count(), 0);

        let frame = buf.pull_sync(1920);
        assert_eq!(frame.time(), 2_000_000);
        assert!(frame.audio().is_silent());

        buf.push_video(video(50), TB).unwrap();
        assert_eq!(buf.pull_sync(1920).time(), 2_000_000);
    }

    /// EOF requires flush and fully drained queues
    #[test]
    fn test_eof() {
        let mut buf = buffer(true);
        assert!(!buf.is_eof());
        buf.push_video(video(0), TB).unwrap();
        buf.push_audio(audio(0, 1920, 0.5)).unwrap();
        buf.flush();
        assert!(!buf.is_eof());
        assert!(buf.ready());
        assert!(buf.full());

        buf.pull_sync(1000);
        assert!(!buf.is_eof(), "audio still buffered");
        buf.pull_sync(1000);
        assert!(buf.is_eof());
    }

    /// Pushing after flush is rejected without side effects
    #[test]
    fn test_push_after_flush_rejected() {
        let mut buf = buffer(true);
        buf.push_video(video(0), TB).unwrap();
        buf.flush();
        assert!(matches!(buf.push_video(video(1), TB), Err(Error::BufferFlushed)));
        assert!(matches!(
            buf.push_audio(audio(0, 1920, 0.5)),
            Err(Error::BufferFlushed)
        ));
        assert_eq!(buf.video_queue_len(), 1);
        assert_eq!(buf.audio_samples_count(), 0);
    }

    /// Ready while playing needs more than one frame of audio
    #[test]
    fn test_ready_threshold() {
        let mut buf = buffer(true);
        assert!(!buf.ready());
        buf.push_video(video(0), TB).unwrap();
        assert!(buf.ready(), "no audio pushed yet, video alone suffices");
        buf.push_audio(audio(0, 1920, 0.5)).unwrap();
        assert!(!buf.ready(), "exactly one frame of audio is not enough");
        buf.push_audio(audio(1920, 1, 0.5)).unwrap();
        assert!(buf.ready());
    }

    /// Full needs the target duration of both video and audio
    #[test]
    fn test_full() {
        let mut buf = SynchronizingBuffer::builder(VideoFormat::new(VideoFormatType::V1080p2500))
            .audio_channels(2)
            .duration(Duration::from_millis(200))
            .build()
            .unwrap();
        for i in 0..5 {
            buf.push_video(video(i), TB).unwrap();
        }
        assert!(buf.full(), "no audio yet");
        for i in 0..5 {
            buf.push_audio(audio(i * 1920, 1920, 0.5)).unwrap();
        }
        assert!(!buf.full(), "9600 samples is not more than 200ms");
        buf.push_audio(audio(9600, 10, 0.5)).unwrap();
        assert!(buf.full());
    }

    /// A discontinuous audio push resets the FIFO to the new timeline
    #[test]
    fn test_audio_discontinuity_resets() {
        let mut buf = buffer(true);
        buf.push_audio(audio(0, 1920, 0.5)).unwrap();
        buf.push_audio(audio(480_000, 960, 0.5)).unwrap();
        assert_eq!(buf.audio_samples_count(), 960);
    }

    #[test]
    fn test_audio_layout_mismatch() {
        let mut buf = buffer(true);
        let mono = Arc::new(AudioFrame::builder().channels(1).samples(10).build().unwrap());
        assert!(matches!(buf.push_audio(mono), Err(Error::InvalidFrame(_))));
    }

    /// Audio is ignored when the buffer has no audio channels
    #[test]
    fn test_video_only_buffer() {
        let mut buf = SynchronizingBuffer::builder(VideoFormat::new(VideoFormatType::V1080p2500))
            .audio_channels(0)
            .playing(true)
            .build()
            .unwrap();
        buf.push_audio(audio(0, 1920, 0.5)).unwrap();
        assert_eq!(buf.audio_samples_count(), 0);
        buf.push_video(video(0), TB).unwrap();
        assert!(buf.ready());
    }

    /// Each queued frame keeps the time base it was pushed with
    #[test]
    fn test_time_base_per_push() {
        let mut buf = buffer(true);
        buf.push_video(video(1), TB).unwrap();
        buf.push_video(video(90_000), Rational::new(1, 90_000)).unwrap();
        assert_eq!(buf.pull_sync(0).time(), 40_000);
        assert_eq!(buf.pull_sync(0).time(), 1_000_000);
    }
}
