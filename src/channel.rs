//! Channel orchestration: one frame clock, at most one active source, many outputs.
//!
//! A [`Channel`] is created with a fixed video format. The output device
//! designated as frame clock drives it: on every clock tick the channel pulls
//! one [`SyncFrame`] from the active source (or synthesizes black and silence
//! when nothing is loaded) and pushes it to every attached output, the clock
//! device included.
//!
//! The clock device receives its frame inline on its own tick. Every other
//! output is fed through a FIFO [`Executor`] queue owned by the channel, so a
//! device that blocks in `push` delays only itself. A queue holding more than
//! [`MAX_QUEUED_FRAMES`] undelivered frames drops new ones.
//!
//! # Thread Safety
//!
//! The active source, the pending (preloaded) source, the output set and the
//! clock binding are the only state shared between control calls and the
//! tick. They live behind a single mutex that is held only while swapping
//! `Arc`s, never while calling into a source or a device, so a tick observes
//! either the old or the new configuration and never a partial one.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use grafton_playout::{
//!     BufferedSource, Channel, ChannelOptions, InputSource, OutputDevice, PixelFormat, TimerOutput,
//!     VideoFormatType,
//! };
//!
//! # fn main() -> Result<(), grafton_playout::Error> {
//! let options = ChannelOptions::builder("Channel 1")
//!     .video_format(VideoFormatType::V1080i5000)
//!     .pixel_format(PixelFormat::Yuv422)
//!     .audio_channels(2)
//!     .build()?;
//! let channel = Channel::new(&options)?;
//!
//! let clock: Arc<dyn OutputDevice> = Arc::new(TimerOutput::builder("clock").build()?);
//! channel.set_frame_clock(&clock)?;
//! channel.add_output(&clock)?;
//!
//! let source = Arc::new(BufferedSource::new("clip", &options)?);
//! channel.load(source.clone())?;
//! source.play();
//! // ... a decoder pushes frames into `source` ...
//! channel.clear();
//! channel.remove_output(&clock)?;
//! # Ok(())
//! # }
//! ```

use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use crate::{
    clock::FrameRequestedCallback,
    device::{same_object, ChannelId, ChannelInfo, InputSource, OutputDevice},
    executor::Executor,
    format::{PixelFormat, VideoFormat, VideoFormatType},
    frames::{AudioFrame, VideoFrame, MAX_AUDIO_CHANNELS},
    level::{AudioLevel, AudioVolumeCallback, LevelMode},
    sync_frame::SyncFrame,
    synchronizing_buffer::DEFAULT_SAMPLE_RATE,
    time::{rescale, TIME_BASE},
    Error, Result,
};

/// State of a channel's source slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Nothing loaded; the channel outputs black and silence.
    Empty,
    /// A preloaded source is still buffering.
    Loading,
    /// A preloaded source is ready and takes over on the next tick.
    Ready,
    Playing,
    Paused,
}

/// Undelivered frames an output queue may hold before new frames are dropped.
pub const MAX_QUEUED_FRAMES: usize = 8;

/// Delivery queue of one attached output.
struct OutputQueue {
    channel: Arc<str>,
    executor: Executor,
    queued: Arc<AtomicUsize>,
}

impl OutputQueue {
    fn new(channel: &Arc<str>, device: &dyn OutputDevice) -> Result<Self> {
        Ok(Self {
            channel: Arc::clone(channel),
            executor: Executor::new(format!("{channel}/{}", device.name()))?,
            queued: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn push(&self, device: &Arc<dyn OutputDevice>, frame: &SyncFrame) {
        if self.queued.fetch_add(1, Ordering::AcqRel) >= MAX_QUEUED_FRAMES {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            warn!(
                channel = %self.channel,
                output = device.name(),
                time = frame.time(),
                "output is not keeping up, frame dropped"
            );
            return;
        }
        let channel = Arc::clone(&self.channel);
        let device_for_task = Arc::clone(device);
        let frame = frame.clone();
        let queued = Arc::clone(&self.queued);
        let queued_task = self.executor.begin_invoke(move || {
            deliver(&channel, device_for_task.as_ref(), &frame);
            queued.fetch_sub(1, Ordering::AcqRel);
        });
        if let Err(e) = queued_task {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            debug!(channel = %self.channel, output = device.name(), error = %e, "output queue closed");
        }
    }

    /// Wait for every frame queued so far.
    fn sync(&self) -> Result<()> {
        self.executor.invoke(|| ())
    }
}

impl Drop for OutputQueue {
    fn drop(&mut self) {
        // A tick may drop the last reference; never join a blocked device there.
        self.executor.shutdown();
    }
}

#[derive(Clone)]
struct Attached {
    device: Arc<dyn OutputDevice>,
    queue: Arc<OutputQueue>,
}

fn deliver(channel: &str, output: &dyn OutputDevice, frame: &SyncFrame) {
    match panic::catch_unwind(AssertUnwindSafe(|| output.push(frame))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(channel, output = output.name(), error = %e, "push failed");
        }
        Err(_) => {
            error!(channel, output = output.name(), "output panicked during push");
        }
    }
}

#[derive(Clone, Default)]
struct State {
    outputs: Arc<Vec<Attached>>,
    clock: Option<Arc<dyn OutputDevice>>,
    active: Option<Arc<dyn InputSource>>,
    pending: Option<Arc<dyn InputSource>>,
}

struct Inner {
    name: Arc<str>,
    info: ChannelInfo,
    level_mode: LevelMode,
    state: Mutex<State>,
    volume_callback: Mutex<Option<AudioVolumeCallback>>,
    black: OnceCell<Arc<VideoFrame>>,
    ticks: AtomicU64,
}

/// Clock-driven orchestrator of one playout channel.
pub struct Channel {
    inner: Arc<Inner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("id", &self.inner.info.id)
            .field("format", &self.inner.info.format.format_type())
            .field("pixel_format", &self.inner.info.pixel_format)
            .field("audio_channels", &self.inner.info.audio_channels)
            .field("outputs", &state.outputs.len())
            .field("has_clock", &state.clock.is_some())
            .field("has_source", &state.active.is_some())
            .finish()
    }
}

impl Channel {
    /// Create a channel with the fixed format described by `options`.
    pub fn new(options: &ChannelOptions) -> Result<Self> {
        let info = ChannelInfo {
            id: ChannelId::next(),
            format: VideoFormat::new(options.video_format),
            pixel_format: options.pixel_format,
            audio_channels: options.audio_channels,
            sample_rate: options.sample_rate,
        };
        info!(
            channel = %options.name,
            id = %info.id,
            format = %options.video_format,
            "channel created"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                name: Arc::from(options.name.as_str()),
                info,
                level_mode: options.level_mode,
                state: Mutex::new(State::default()),
                volume_callback: Mutex::new(None),
                black: OnceCell::new(),
                ticks: AtomicU64::new(0),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> ChannelId {
        self.inner.info.id
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.inner.info
    }

    pub fn format(&self) -> &VideoFormat {
        &self.inner.info.format
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.inner.info.pixel_format
    }

    pub fn audio_channels_count(&self) -> usize {
        self.inner.info.audio_channels
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.inner.info.sample_rate
    }

    /// Number of ticks served so far.
    pub fn frames_delivered(&self) -> u64 {
        self.inner.ticks.load(Ordering::Acquire)
    }

    pub fn outputs_count(&self) -> usize {
        self.inner.lock_state().outputs.len()
    }

    pub fn has_frame_clock(&self) -> bool {
        self.inner.lock_state().clock.is_some()
    }

    /// Attach an output device.
    ///
    /// The device is assigned to the channel synchronously; if it is the
    /// current frame clock its ticks start driving the channel.
    ///
    /// # Errors
    ///
    /// [`Error::OutputAlreadyAttached`] if the device is already attached and
    /// [`Error::AssignmentRejected`] if the device refuses the assignment.
    pub fn add_output(&self, device: &Arc<dyn OutputDevice>) -> Result<()> {
        if self.contains_output(device) {
            return Err(Error::OutputAlreadyAttached(device.name().to_string()));
        }
        if !device.assign_to_channel(&self.inner.info)? {
            return Err(Error::AssignmentRejected(device.name().to_string()));
        }
        let queue = match OutputQueue::new(&self.inner.name, device.as_ref()) {
            Ok(queue) => Arc::new(queue),
            Err(e) => {
                device.release_channel();
                return Err(e);
            }
        };

        {
            let mut state = self.inner.lock_state();
            if !state.outputs.iter().any(|o| same_object(&o.device, device)) {
                let mut outputs = state.outputs.as_ref().clone();
                outputs.push(Attached {
                    device: Arc::clone(device),
                    queue,
                });
                state.outputs = Arc::new(outputs);
            }
        }
        info!(channel = %self.inner.name, output = device.name(), "output attached");
        Ok(())
    }

    /// Detach an output device.
    ///
    /// # Errors
    ///
    /// [`Error::OutputNotAttached`] if the device isn't attached, which is
    /// also what a repeated call returns, and [`Error::ClockInUse`] if it is
    /// the frame clock while other outputs are still attached. Neither error
    /// changes the output set, so callers treating detach as idempotent can
    /// ignore `OutputNotAttached`.
    ///
    /// Frames already queued for the device may still be delivered after it
    /// is released; it rejects them as unattached.
    pub fn remove_output(&self, device: &Arc<dyn OutputDevice>) -> Result<()> {
        let (was_clock, _removed) = {
            let mut state = self.inner.lock_state();
            let Some(position) = state
                .outputs
                .iter()
                .position(|o| same_object(&o.device, device))
            else {
                return Err(Error::OutputNotAttached(device.name().to_string()));
            };
            let is_clock = state
                .clock
                .as_ref()
                .is_some_and(|clock| same_object(clock, device));
            if is_clock && state.outputs.len() > 1 {
                warn!(
                    channel = %self.inner.name,
                    output = device.name(),
                    "refusing to detach the frame clock while other outputs are attached"
                );
                return Err(Error::ClockInUse(device.name().to_string()));
            }

            let mut outputs = state.outputs.as_ref().clone();
            let removed = outputs.remove(position);
            state.outputs = Arc::new(outputs);
            if is_clock {
                state.clock = None;
            }
            (is_clock, removed)
        };

        if was_clock {
            self.inner.unbind_clock(device.as_ref());
        }
        device.release_channel();
        info!(channel = %self.inner.name, output = device.name(), "output detached");
        Ok(())
    }

    /// Make `device` the frame clock, unbinding the previous clock.
    ///
    /// The device may be attached before or after this call; it only starts
    /// ticking once it is assigned to the channel.
    ///
    /// # Errors
    ///
    /// [`Error::ClockBoundElsewhere`] if the device already clocks another
    /// channel, or the device's own error if it cannot act as a clock. The
    /// current clock stays bound in both cases.
    pub fn set_frame_clock(&self, device: &Arc<dyn OutputDevice>) -> Result<()> {
        let is_current = self
            .inner
            .lock_state()
            .clock
            .as_ref()
            .is_some_and(|clock| same_object(clock, device));
        if is_current {
            return Ok(());
        }
        device.set_frame_requested_callback(
            &self.inner.info,
            Some(self.frame_requested_callback()),
        )?;

        let previous = self.inner.lock_state().clock.replace(Arc::clone(device));
        if let Some(previous) = previous {
            if !same_object(&previous, device) {
                self.inner.unbind_clock(previous.as_ref());
            }
        }
        info!(channel = %self.inner.name, clock = device.name(), "frame clock assigned");
        Ok(())
    }

    /// Attach `source` without putting it on air.
    ///
    /// The source replaces the active one on the first tick at which it
    /// reports ready; until then the current source keeps playing.
    pub fn preload(&self, source: Arc<dyn InputSource>) -> Result<()> {
        source.add_to_channel(&self.inner.info)?;
        let replaced = self.inner.lock_state().pending.replace(Arc::clone(&source));
        if let Some(old) = replaced {
            if !same_object(&old, &source) {
                old.remove_from_channel(&self.inner.info);
            }
        }
        debug!(channel = %self.inner.name, source = source.name(), "source preloading");
        Ok(())
    }

    /// Put `source` on air immediately, tearing down the previous one.
    pub fn load(&self, source: Arc<dyn InputSource>) -> Result<()> {
        source.add_to_channel(&self.inner.info)?;
        let (old_active, old_pending) = {
            let mut state = self.inner.lock_state();
            let old_pending = state.pending.take();
            let old_active = state.active.replace(Arc::clone(&source));
            (old_active, old_pending)
        };
        for old in [old_active, old_pending].into_iter().flatten() {
            if !same_object(&old, &source) {
                old.remove_from_channel(&self.inner.info);
            }
        }
        info!(channel = %self.inner.name, source = source.name(), "source loaded");
        Ok(())
    }

    /// Take the active and pending sources off the channel. Idempotent.
    pub fn clear(&self) {
        let (active, pending) = {
            let mut state = self.inner.lock_state();
            (state.active.take(), state.pending.take())
        };
        let had_source = active.is_some() || pending.is_some();
        for source in [active, pending].into_iter().flatten() {
            source.remove_from_channel(&self.inner.info);
        }
        if had_source {
            info!(channel = %self.inner.name, "channel cleared");
        }
    }

    pub fn source_state(&self) -> SourceState {
        let (active, pending) = {
            let state = self.inner.lock_state();
            (state.active.clone(), state.pending.clone())
        };
        match (pending, active) {
            (Some(pending), _) if pending.is_ready() => SourceState::Ready,
            (Some(_), _) => SourceState::Loading,
            (None, Some(active)) if active.is_playing() => SourceState::Playing,
            (None, Some(_)) => SourceState::Paused,
            (None, None) => SourceState::Empty,
        }
    }

    /// The source currently on air.
    pub fn active_source(&self) -> Option<Arc<dyn InputSource>> {
        self.inner.lock_state().active.clone()
    }

    /// Register the per-tick audio level callback (one value per audio channel).
    pub fn set_audio_volume_callback(&self, callback: Option<AudioVolumeCallback>) {
        *self
            .inner
            .volume_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = callback;
    }

    /// Serve one tick by hand, as the frame clock would.
    pub fn request_frame(&self, audio_sample_count: usize) {
        self.inner.request_frame(audio_sample_count);
    }

    /// Wait until every frame queued for the attached outputs has been handed
    /// to its device.
    ///
    /// # Errors
    ///
    /// An executor error if an output queue has stopped.
    pub fn sync_outputs(&self) -> Result<()> {
        let outputs = Arc::clone(&self.inner.lock_state().outputs);
        for output in outputs.iter() {
            output.queue.sync()?;
        }
        Ok(())
    }

    fn contains_output(&self, device: &Arc<dyn OutputDevice>) -> bool {
        self.inner
            .lock_state()
            .outputs
            .iter()
            .any(|o| same_object(&o.device, device))
    }

    fn frame_requested_callback(&self) -> FrameRequestedCallback {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Arc::new(move |audio_sample_count| {
            if let Some(inner) = weak.upgrade() {
                inner.request_frame(audio_sample_count);
            }
        })
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.set_audio_volume_callback(None);
        let state = std::mem::take(&mut *self.inner.lock_state());
        if let Some(clock) = &state.clock {
            self.inner.unbind_clock(clock.as_ref());
        }
        for output in state.outputs.iter() {
            output.device.release_channel();
        }
        for source in [state.active, state.pending].into_iter().flatten() {
            source.remove_from_channel(&self.inner.info);
        }
        debug!(channel = %self.inner.name, "channel dropped");
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unbind_clock(&self, device: &dyn OutputDevice) {
        if let Err(e) = device.set_frame_requested_callback(&self.info, None) {
            warn!(channel = %self.name, clock = device.name(), error = %e, "clock unbind failed");
        }
    }

    fn request_frame(&self, audio_sample_count: usize) {
        self.promote_pending();

        let (source, outputs, clock) = {
            let state = self.lock_state();
            (
                state.active.clone(),
                Arc::clone(&state.outputs),
                state.clock.clone(),
            )
        };

        let frame = match source {
            Some(source) => source.pull_sync(&self.info, audio_sample_count),
            None => self.placeholder(audio_sample_count),
        };
        self.ticks.fetch_add(1, Ordering::AcqRel);

        let volume_callback = self
            .volume_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = volume_callback {
            let level = AudioLevel::measure(frame.audio());
            callback(level.values(self.level_mode));
        }

        for output in outputs.iter() {
            let is_clock = clock
                .as_ref()
                .is_some_and(|clock| same_object(clock, &output.device));
            if is_clock {
                deliver(&self.name, output.device.as_ref(), &frame);
            } else {
                output.queue.push(&output.device, &frame);
            }
        }
    }

    fn promote_pending(&self) {
        let Some(pending) = self.lock_state().pending.clone() else {
            return;
        };
        if !pending.is_ready() {
            return;
        }
        let retired = {
            let mut state = self.lock_state();
            let still_pending = state
                .pending
                .as_ref()
                .is_some_and(|current| same_object(current, &pending));
            // Replaced or cleared while readiness was checked.
            if !still_pending {
                return;
            }
            state.pending = None;
            state.active.replace(Arc::clone(&pending))
        };
        if let Some(old) = retired {
            if !same_object(&old, &pending) {
                old.remove_from_channel(&self.info);
            }
        }
        info!(channel = %self.name, source = pending.name(), "preloaded source on air");
    }

    fn placeholder(&self, audio_sample_count: usize) -> SyncFrame {
        let video = self
            .black
            .get_or_init(|| Arc::new(VideoFrame::black(&self.info.format, self.info.pixel_format)));
        let audio = AudioFrame::silence(
            audio_sample_count,
            self.info.audio_channels,
            self.info.sample_rate,
        );
        let frame_rate = self.info.format.frame_rate();
        let ticks = self.ticks.load(Ordering::Acquire) as i64;
        let time = rescale(ticks, TIME_BASE * frame_rate.den, frame_rate.num);
        SyncFrame::new(Arc::new(audio), Arc::clone(video), time)
    }
}

/// Fixed configuration of a [`Channel`].
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub name: String,
    pub video_format: VideoFormatType,
    pub pixel_format: PixelFormat,
    pub audio_channels: usize,
    pub sample_rate: u32,
    pub level_mode: LevelMode,
}

impl ChannelOptions {
    /// Create a builder for configuring channel options
    pub fn builder<S: Into<String>>(name: S) -> ChannelOptionsBuilder {
        ChannelOptionsBuilder::new(name)
    }

    pub fn format(&self) -> VideoFormat {
        VideoFormat::new(self.video_format)
    }
}

/// Builder for configuring [`ChannelOptions`] with ergonomic method chaining
#[derive(Debug, Clone)]
pub struct ChannelOptionsBuilder {
    name: String,
    video_format: Option<VideoFormatType>,
    pixel_format: Option<PixelFormat>,
    audio_channels: Option<usize>,
    sample_rate: Option<u32>,
    level_mode: Option<LevelMode>,
}

impl ChannelOptionsBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            video_format: None,
            pixel_format: None,
            audio_channels: None,
            sample_rate: None,
            level_mode: None,
        }
    }

    /// Video format (default 1080i50)
    #[must_use]
    pub fn video_format(mut self, format: VideoFormatType) -> Self {
        self.video_format = Some(format);
        self
    }

    /// Pixel format of frames on the channel (default YUV 4:2:2)
    #[must_use]
    pub fn pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = Some(pixel_format);
        self
    }

    /// Number of audio channels (default 2)
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

    /// Level reported to the audio volume callback (default peak)
    #[must_use]
    pub fn level_mode(mut self, mode: LevelMode) -> Self {
        self.level_mode = Some(mode);
        self
    }

    /// Build the `ChannelOptions`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty or contains only whitespace
    /// - The audio channel count is outside 1..=63
    /// - The sample rate is zero
    pub fn build(self) -> Result<ChannelOptions> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "Channel name cannot be empty or contain only whitespace".into(),
            ));
        }

        let audio_channels = self.audio_channels.unwrap_or(2);
        if audio_channels == 0 || audio_channels > MAX_AUDIO_CHANNELS {
            return Err(Error::InvalidConfiguration(format!(
                "Audio channel count must be between 1 and {MAX_AUDIO_CHANNELS}, got {audio_channels}"
            )));
        }

        let sample_rate = self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        if sample_rate == 0 {
            return Err(Error::InvalidConfiguration(
                "Sample rate must be greater than zero".into(),
            ));
        }

        Ok(ChannelOptions {
            name: self.name,
            video_format: self.video_format.unwrap_or(VideoFormatType::V1080i5000),
            pixel_format: self.pixel_format.unwrap_or(PixelFormat::Yuv422),
            audio_channels,
            sample_rate,
            level_mode: self.level_mode.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = ChannelOptions::builder("A").build().unwrap();
        assert_eq!(options.video_format, VideoFormatType::V1080i5000);
        assert_eq!(options.pixel_format, PixelFormat::Yuv422);
        assert_eq!(options.audio_channels, 2);
        assert_eq!(options.sample_rate, 48000);
        assert_eq!(options.level_mode, LevelMode::Peak);
    }

    #[test]
    fn test_options_validation() {
        assert!(ChannelOptions::builder("  ").build().is_err());
        assert!(ChannelOptions::builder("A").audio_channels(0).build().is_err());
        assert!(ChannelOptions::builder("A").audio_channels(64).build().is_err());
        assert!(ChannelOptions::builder("A").sample_rate(0).build().is_err());
    }

    /// Without a source the channel synthesizes black and silence on its own timeline
    #[test]
    fn test_placeholder_frames() {
        let options = ChannelOptions::builder("A")
            .video_format(VideoFormatType::V720p5000)
            .pixel_format(PixelFormat::Bgra)
            .build()
            .unwrap();
        let channel = Channel::new(&options).unwrap();
        assert_eq!(channel.source_state(), SourceState::Empty);

        let first = channel.inner.placeholder(960);
        assert_eq!(first.time(), 0);
        assert_eq!(first.video().width, 1280);
        assert_eq!(first.audio().num_samples, 960);
        assert!(first.audio().is_silent());

        channel.request_frame(960);
        let second = channel.inner.placeholder(960);
        assert_eq!(second.time(), 20_000);
        assert!(Arc::ptr_eq(first.video(), second.video()), "black frame is cached");
        assert_eq!(channel.frames_delivered(), 1);
    }

    #[test]
    fn test_channels_have_distinct_ids() {
        let options = ChannelOptions::builder("A").build().unwrap();
        let a = Channel::new(&options).unwrap();
        let b = Channel::new(&options).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.info().format.format_type(), VideoFormatType::V1080i5000);
    }
}
