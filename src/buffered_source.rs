//! Push-driven input source backed by a [`SynchronizingBuffer`].
//!
//! `BufferedSource` is the boundary an external decoder feeds: a decoding
//! thread pushes frames with [`push_video`](BufferedSource::push_video) and
//! [`push_audio`](BufferedSource::push_audio), throttles itself on
//! [`is_full`](BufferedSource::is_full), and calls
//! [`flush`](BufferedSource::flush) at end of stream. The channel tick pulls
//! from the other side through the [`InputSource`] trait.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::{debug, info};

use crate::{
    channel::ChannelOptions,
    device::{
        ChannelId, ChannelInfo, EventCallback, InputSource, SourceCallbacks, TimeCallback,
    },
    format::FieldOrder,
    frames::{AudioFrame, VideoFrame},
    sync_frame::SyncFrame,
    synchronizing_buffer::SynchronizingBuffer,
    time::Rational,
    Error, Result,
};

/// Start and length of the stream being decoded, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamInfo {
    pub video_start: i64,
    /// `None` for streams of unknown length.
    pub video_duration: Option<i64>,
    /// `None` for streams without audio or of unknown length.
    pub audio_duration: Option<i64>,
}

/// An [`InputSource`] fed by an external producer.
pub struct BufferedSource {
    name: String,
    buffer: Mutex<SynchronizingBuffer>,
    callbacks: SourceCallbacks,
    channels: Mutex<BTreeSet<ChannelId>>,
    stream_info: Mutex<StreamInfo>,
    looped: Mutex<Option<EventCallback>>,
    is_loop: AtomicBool,
    loaded_notified: AtomicBool,
    stopped_notified: AtomicBool,
}

impl fmt::Debug for BufferedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedSource")
            .field("name", &self.name)
            .field("buffer", &*self.lock_buffer())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl BufferedSource {
    /// A paused source whose buffer matches the channel configured by `options`.
    pub fn new<S: Into<String>>(name: S, options: &ChannelOptions) -> Result<Self> {
        let buffer = SynchronizingBuffer::builder(options.format())
            .pixel_format(options.pixel_format)
            .audio_channels(options.audio_channels)
            .sample_rate(options.sample_rate)
            .build()?;
        Ok(Self::with_buffer(name, buffer))
    }

    /// Wrap a pre-configured buffer.
    pub fn with_buffer<S: Into<String>>(name: S, buffer: SynchronizingBuffer) -> Self {
        Self {
            name: name.into(),
            buffer: Mutex::new(buffer),
            callbacks: SourceCallbacks::default(),
            channels: Mutex::new(BTreeSet::new()),
            stream_info: Mutex::new(StreamInfo::default()),
            looped: Mutex::new(None),
            is_loop: AtomicBool::new(false),
            loaded_notified: AtomicBool::new(false),
            stopped_notified: AtomicBool::new(false),
        }
    }

    fn lock_buffer(&self) -> MutexGuard<'_, SynchronizingBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a decoded picture whose pts is expressed in `time_base`.
    ///
    /// # Errors
    ///
    /// [`Error::BufferFlushed`] after [`flush`](Self::flush) until the next seek.
    pub fn push_video(&self, frame: Arc<VideoFrame>, time_base: Rational) -> Result<()> {
        self.lock_buffer().push_video(frame, time_base)?;
        self.notify_loaded_once();
        Ok(())
    }

    /// Queue decoded audio.
    ///
    /// # Errors
    ///
    /// [`Error::BufferFlushed`] after [`flush`](Self::flush) until the next seek.
    pub fn push_audio(&self, frame: Arc<AudioFrame>) -> Result<()> {
        self.lock_buffer().push_audio(frame)?;
        self.notify_loaded_once();
        Ok(())
    }

    /// Signal end of stream; what is buffered still plays out.
    pub fn flush(&self) {
        self.lock_buffer().flush();
        self.notify_loaded_once();
    }

    /// Whether the producer should pause decoding.
    pub fn is_full(&self) -> bool {
        self.lock_buffer().full()
    }

    pub fn is_eof(&self) -> bool {
        self.lock_buffer().is_eof()
    }

    pub fn buffered_video_frames(&self) -> usize {
        self.lock_buffer().video_queue_len()
    }

    pub fn buffered_audio_samples(&self) -> usize {
        self.lock_buffer().audio_samples_count()
    }

    pub fn set_stream_info(&self, info: StreamInfo) {
        *self.stream_info.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }

    fn stream_info(&self) -> StreamInfo {
        *self.stream_info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn video_start(&self) -> i64 {
        self.stream_info().video_start
    }

    pub fn video_duration(&self) -> Option<i64> {
        self.stream_info().video_duration
    }

    pub fn audio_duration(&self) -> Option<i64> {
        self.stream_info().audio_duration
    }

    /// Stamp synthesized frames with `time` until real pictures arrive.
    pub fn set_synchro(&self, time: i64) {
        self.lock_buffer().set_synchro(time);
    }

    /// Restart from [`video_start`](Self::video_start) at end of stream
    /// instead of stopping.
    ///
    /// When the drained buffer loops it is re-anchored at the start and the
    /// callback set with [`set_looped_callback`](Self::set_looped_callback)
    /// fires; the producer rewinds its decoder from there.
    pub fn set_is_loop(&self, is_loop: bool) {
        self.is_loop.store(is_loop, Ordering::Release);
        debug!(source = %self.name, is_loop, "source loop mode changed");
    }

    pub fn is_loop(&self) -> bool {
        self.is_loop.load(Ordering::Acquire)
    }

    /// Called when the source loops back to its start.
    pub fn set_looped_callback(&self, callback: Option<EventCallback>) {
        *self.looped.lock().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify_loaded_once(&self) {
        if self.loaded_notified.load(Ordering::Acquire) || !self.lock_buffer().ready() {
            return;
        }
        if !self.loaded_notified.swap(true, Ordering::AcqRel) {
            debug!(source = %self.name, "source loaded");
            self.callbacks.loaded();
        }
    }
}

impl InputSource for BufferedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pull_sync(&self, _channel: &ChannelInfo, audio_sample_count: usize) -> SyncFrame {
        let is_loop = self.is_loop();
        let video_start = self.video_start();
        let (frame, playing, eof) = {
            let mut buffer = self.lock_buffer();
            let frame = buffer.pull_sync(audio_sample_count);
            let playing = buffer.is_playing();
            let eof = buffer.is_eof();
            if playing && eof && is_loop {
                buffer.seek(video_start);
            }
            (frame, playing, eof)
        };

        if playing {
            self.callbacks.frame_played(frame.time());
            if eof && is_loop {
                info!(source = %self.name, start = video_start, "source looped");
                let looped = self
                    .looped
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(looped) = looped {
                    looped();
                }
            } else if eof && !self.stopped_notified.swap(true, Ordering::AcqRel) {
                info!(source = %self.name, "source reached end of stream");
                self.callbacks.stopped();
            }
        }
        frame
    }

    fn is_ready(&self) -> bool {
        let ready = self.lock_buffer().ready();
        if ready {
            self.notify_loaded_once();
        }
        ready
    }

    fn add_to_channel(&self, channel: &ChannelInfo) -> Result<()> {
        {
            let buffer = self.lock_buffer();
            if buffer.format().format_type() != channel.format.format_type()
                || buffer.pixel_format() != channel.pixel_format
                || buffer.audio_channels() != channel.audio_channels
                || buffer.sample_rate() != channel.sample_rate
            {
                return Err(Error::InvalidConfiguration(format!(
                    "Source {} is configured for {} and cannot feed {} running {}",
                    self.name,
                    buffer.format().format_type(),
                    channel.id,
                    channel.format.format_type()
                )));
            }
        }
        let added = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.id);
        if added {
            debug!(source = %self.name, channel = %channel.id, "source added to channel");
        }
        Ok(())
    }

    fn remove_from_channel(&self, channel: &ChannelInfo) {
        let removed = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&channel.id);
        if removed {
            debug!(source = %self.name, channel = %channel.id, "source removed from channel");
        }
    }

    fn is_added_to_channel(&self, channel: &ChannelInfo) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&channel.id)
    }

    fn play(&self) {
        self.stopped_notified.store(false, Ordering::Release);
        self.lock_buffer().set_is_playing(true);
    }

    fn pause(&self) {
        self.lock_buffer().set_is_playing(false);
    }

    fn is_playing(&self) -> bool {
        self.lock_buffer().is_playing()
    }

    fn width(&self) -> u32 {
        self.lock_buffer().format().width()
    }

    fn height(&self) -> u32 {
        self.lock_buffer().format().height()
    }

    fn field_order(&self) -> FieldOrder {
        self.lock_buffer().format().field_order()
    }

    fn audio_channel_count(&self) -> usize {
        self.lock_buffer().audio_channels()
    }

    fn has_alpha_channel(&self) -> bool {
        self.lock_buffer().pixel_format().has_alpha()
    }

    fn seek(&self, time: i64) -> Result<()> {
        self.lock_buffer().seek(time);
        self.loaded_notified.store(false, Ordering::Release);
        self.stopped_notified.store(false, Ordering::Release);
        info!(source = %self.name, time, "source seek");
        Ok(())
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
