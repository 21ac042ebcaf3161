//! Capability contracts for input sources and output devices.
//!
//! Concrete kinds (file decoders, capture cards, network senders, previews)
//! implement [`InputSource`] or [`OutputDevice`] and are plugged into a
//! [`Channel`](crate::Channel) as trait objects; the channel never knows
//! which kind it is driving.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::{
    clock::FrameRequestedCallback,
    format::{FieldOrder, PixelFormat, VideoFormat},
    sync_frame::SyncFrame,
    Error, Result,
};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a channel, used by sources to track which channels they feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// The fixed format of a channel, handed to sources and outputs on attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub format: VideoFormat,
    pub pixel_format: PixelFormat,
    pub audio_channels: usize,
    pub sample_rate: u32,
}

/// A device that consumes synchronized frames.
///
/// # Contract
///
/// - [`push`](Self::push) must not block the caller: implementations hand the
///   frame to their own execution context and return.
/// - A device designated as frame clock calls the callback installed with
///   [`set_frame_requested_callback`](Self::set_frame_requested_callback) once
///   per frame interval, from its own execution context. It serves one
///   channel; [`ClockBinding`](crate::clock::ClockBinding) tracks the owner.
pub trait OutputDevice: Send + Sync {
    /// Human readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Start serving `channel`. Returns `false` if the device is already running.
    fn assign_to_channel(&self, channel: &ChannelInfo) -> Result<bool>;

    /// Stop serving the current channel. Idempotent.
    fn release_channel(&self);

    /// Deliver one frame.
    fn push(&self, frame: &SyncFrame) -> Result<()>;

    /// Install the frame clock callback of `channel`, or clear it with `None`.
    ///
    /// A device clocks one channel at a time; clearing on behalf of a channel
    /// that doesn't own the clock leaves it untouched.
    ///
    /// # Errors
    ///
    /// [`Error::ClockBoundElsewhere`] if another channel owns the clock, or a
    /// configuration error if the device cannot act as a clock.
    fn set_frame_requested_callback(
        &self,
        channel: &ChannelInfo,
        callback: Option<FrameRequestedCallback>,
    ) -> Result<()>;

    fn is_playing(&self) -> bool;
}

/// Callback receiving a presentation time in microseconds.
pub type TimeCallback = Arc<dyn Fn(i64) + Send + Sync>;

/// Callback without arguments.
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// A producer of synchronized frames feeding one or more channels.
pub trait InputSource: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the next frame for `channel` carrying `audio_sample_count` samples.
    fn pull_sync(&self, channel: &ChannelInfo, audio_sample_count: usize) -> SyncFrame;

    /// Whether the source has buffered enough to start pulling.
    fn is_ready(&self) -> bool;

    fn add_to_channel(&self, channel: &ChannelInfo) -> Result<()>;
    fn remove_from_channel(&self, channel: &ChannelInfo);
    fn is_added_to_channel(&self, channel: &ChannelInfo) -> bool;

    fn play(&self);
    fn pause(&self);
    fn is_playing(&self) -> bool;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn field_order(&self) -> FieldOrder;
    fn audio_channel_count(&self) -> usize;
    fn has_alpha_channel(&self) -> bool;

    /// Jump to `time` (microseconds).
    ///
    /// # Errors
    ///
    /// [`Error::SeekUnsupported`] by default; sources that can seek override this.
    fn seek(&self, time: i64) -> Result<()> {
        let _ = time;
        Err(Error::SeekUnsupported(self.name().to_string()))
    }

    fn set_frame_played_callback(&self, callback: Option<TimeCallback>);
    fn set_stopped_callback(&self, callback: Option<EventCallback>);
    fn set_loaded_callback(&self, callback: Option<EventCallback>);
}

/// Replaceable notification callbacks shared by source implementations.
#[derive(Default)]
pub struct SourceCallbacks {
    frame_played: Mutex<Option<TimeCallback>>,
    stopped: Mutex<Option<EventCallback>>,
    loaded: Mutex<Option<EventCallback>>,
}

impl fmt::Debug for SourceCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCallbacks")
            .field("frame_played_set", &lock(&self.frame_played).is_some())
            .field("stopped_set", &lock(&self.stopped).is_some())
            .field("loaded_set", &lock(&self.loaded).is_some())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SourceCallbacks {
    pub fn set_frame_played(&self, callback: Option<TimeCallback>) {
        *lock(&self.frame_played) = callback;
    }

    pub fn set_stopped(&self, callback: Option<EventCallback>) {
        *lock(&self.stopped) = callback;
    }

    pub fn set_loaded(&self, callback: Option<EventCallback>) {
        *lock(&self.loaded) = callback;
    }

    // Callbacks are cloned out so they run without the lock held.

    pub fn frame_played(&self, time: i64) {
        let callback = lock(&self.frame_played).clone();
        if let Some(callback) = callback {
            callback(time);
        }
    }

    pub fn stopped(&self) {
        let callback = lock(&self.stopped).clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn loaded(&self) {
        let callback = lock(&self.loaded).clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Whether two trait objects point at the same device.
pub(crate) fn same_object<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_channel_ids_are_unique() {
        let a = ChannelId::next();
        let b = ChannelId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    /// Callbacks can be replaced and cleared
    #[test]
    fn test_source_callbacks() {
        let callbacks = SourceCallbacks::default();
        callbacks.frame_played(1);

        let last = Arc::new(AtomicI64::new(0));
        let seen = Arc::clone(&last);
        callbacks.set_frame_played(Some(Arc::new(move |t| seen.store(t, Ordering::SeqCst))));
        callbacks.frame_played(40_000);
        assert_eq!(last.load(Ordering::SeqCst), 40_000);

        callbacks.set_frame_played(None);
        callbacks.frame_played(80_000);
        assert_eq!(last.load(Ordering::SeqCst), 40_000);
    }

    #[test]
    fn test_same_object() {
        let a: Arc<dyn Fn() + Send + Sync> = Arc::new(|| ());
        let b = Arc::clone(&a);
        let c: Arc<dyn Fn() + Send + Sync> = Arc::new(|| ());
        assert!(same_object(&a, &b));
        assert!(!same_object(&a, &c));
    }
}
