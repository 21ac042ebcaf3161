//! Preview output: keeps the latest frame for monitoring and snapshots.
//!
//! A `PreviewOutput` never drives a channel. Pushed frames are handed to its
//! own [`Executor`], so a slow frame-played callback (a UI repaint, a
//! thumbnail writer) delays only the preview and never the channel tick.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::{debug, warn};

#[cfg(feature = "image-encoding")]
use crate::frames::ImageFormat;
use crate::{
    clock::FrameRequestedCallback,
    device::{ChannelInfo, OutputDevice, TimeCallback},
    executor::Executor,
    sync_frame::SyncFrame,
    Error, Result,
};

#[derive(Default)]
struct PreviewState {
    channel: Option<ChannelInfo>,
    last: Option<SyncFrame>,
}

struct Shared {
    name: String,
    state: Mutex<PreviewState>,
    frame_played: Mutex<Option<TimeCallback>>,
    frames: AtomicU64,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, PreviewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Non-clock output retaining the most recent frame.
///
/// # Example
///
/// ```
/// use grafton_playout::PreviewOutput;
///
/// # fn main() -> Result<(), grafton_playout::Error> {
/// let preview = PreviewOutput::new("monitor")?;
/// assert!(preview.last_frame().is_none());
/// assert!(preview.snapshot_png()?.is_none());
/// # Ok(())
/// # }
/// ```
pub struct PreviewOutput {
    shared: Arc<Shared>,
    executor: Executor,
}

impl fmt::Debug for PreviewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewOutput")
            .field("name", &self.shared.name)
            .field("assigned", &self.shared.lock_state().channel.is_some())
            .field("frames_received", &self.frames_received())
            .finish()
    }
}

impl PreviewOutput {
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "Output name cannot be empty or contain only whitespace".into(),
            ));
        }
        let executor = Executor::new(format!("preview-{name}"))?;
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(PreviewState::default()),
                frame_played: Mutex::new(None),
                frames: AtomicU64::new(0),
            }),
            executor,
        })
    }

    /// Called on the preview thread with the time of every received frame.
    pub fn set_frame_played_callback(&self, callback: Option<TimeCallback>) {
        *self
            .shared
            .frame_played
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = callback;
    }

    pub fn last_frame(&self) -> Option<SyncFrame> {
        self.shared.lock_state().last.clone()
    }

    pub fn frames_received(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Wait until every frame pushed so far has been processed.
    pub fn sync(&self) -> Result<()> {
        self.executor.invoke(|| ())
    }

    /// The latest picture as PNG, or `None` before the first frame.
    pub fn snapshot_png(&self) -> Result<Option<Vec<u8>>> {
        self.last_frame()
            .map(|frame| frame.video().encode_png())
            .transpose()
    }

    /// The latest picture as JPEG at `quality` (1-100).
    #[cfg(feature = "image-encoding")]
    pub fn snapshot_jpeg(&self, quality: u8) -> Result<Option<Vec<u8>>> {
        self.last_frame()
            .map(|frame| frame.video().encode_jpeg(quality))
            .transpose()
    }

    /// The latest picture as a base64 data URL.
    #[cfg(feature = "image-encoding")]
    pub fn snapshot_data_url(&self, format: ImageFormat) -> Result<Option<String>> {
        self.last_frame()
            .map(|frame| frame.video().encode_data_url(format))
            .transpose()
    }
}

impl OutputDevice for PreviewOutput {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn assign_to_channel(&self, channel: &ChannelInfo) -> Result<bool> {
        let mut state = self.shared.lock_state();
        if state.channel.is_some() {
            return Ok(false);
        }
        state.channel = Some(*channel);
        debug!(output = %self.shared.name, channel = %channel.id, "preview assigned");
        Ok(true)
    }

    fn release_channel(&self) {
        let mut state = self.shared.lock_state();
        if state.channel.take().is_some() {
            state.last = None;
            debug!(output = %self.shared.name, "preview released");
        }
    }

    fn push(&self, frame: &SyncFrame) -> Result<()> {
        if self.shared.lock_state().channel.is_none() {
            return Err(Error::OutputNotAttached(self.shared.name.clone()));
        }
        let shared = Arc::clone(&self.shared);
        let frame = frame.clone();
        self.executor.begin_invoke(move || {
            let time = frame.time();
            {
                let mut state = shared.lock_state();
                if state.channel.is_none() {
                    return;
                }
                state.last = Some(frame);
            }
            shared.frames.fetch_add(1, Ordering::AcqRel);
            let callback = shared
                .frame_played
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(callback) = callback {
                callback(time);
            }
        })
    }

    fn set_frame_requested_callback(
        &self,
        _channel: &ChannelInfo,
        callback: Option<FrameRequestedCallback>,
    ) -> Result<()> {
        if callback.is_some() {
            warn!(output = %self.shared.name, "preview output cannot act as a frame clock");
            return Err(Error::InvalidConfiguration(format!(
                "Preview output {} cannot act as a frame clock",
                self.shared.name
            )));
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.shared.lock_state().channel.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::ChannelId,
        format::{PixelFormat, VideoFormat, VideoFormatType},
        frames::{AudioFrame, VideoFrame},
    };
    use std::sync::atomic::AtomicI64;

    fn info() -> ChannelInfo {
        ChannelInfo {
            id: ChannelId::next(),
            format: VideoFormat::new(VideoFormatType::Pal),
            pixel_format: PixelFormat::Yuv422,
            audio_channels: 2,
            sample_rate: 48000,
        }
    }

    fn frame(time: i64) -> SyncFrame {
        let format = VideoFormat::new(VideoFormatType::Pal);
        SyncFrame::new(
            Arc::new(AudioFrame::silence(1920, 2, 48000)),
            Arc::new(VideoFrame::black(&format, PixelFormat::Yuv422)),
            time,
        )
    }

    /// Pushes are processed on the preview thread and the last frame is kept
    #[test]
    fn test_keeps_last_frame() {
        let preview = PreviewOutput::new("p").unwrap();
        let played = Arc::new(AtomicI64::new(-1));
        let seen = Arc::clone(&played);
        preview.set_frame_played_callback(Some(Arc::new(move |t| seen.store(t, Ordering::SeqCst))));

        assert!(preview.assign_to_channel(&info()).unwrap());
        assert!(!preview.assign_to_channel(&info()).unwrap());
        for i in 0..3 {
            preview.push(&frame(i * 40_000)).unwrap();
        }
        preview.sync().unwrap();

        assert_eq!(preview.frames_received(), 3);
        assert_eq!(played.load(Ordering::SeqCst), 80_000);
        assert_eq!(preview.last_frame().map(|f| f.time()), Some(80_000));
    }

    #[test]
    fn test_snapshot_png() {
        let preview = PreviewOutput::new("p").unwrap();
        preview.assign_to_channel(&info()).unwrap();
        preview.push(&frame(0)).unwrap();
        preview.sync().unwrap();

        let png = preview.snapshot_png().unwrap().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_release_clears() {
        let preview = PreviewOutput::new("p").unwrap();
        assert!(matches!(preview.push(&frame(0)), Err(Error::OutputNotAttached(_))));
        preview.assign_to_channel(&info()).unwrap();
        preview.push(&frame(0)).unwrap();
        preview.sync().unwrap();
        preview.release_channel();
        assert!(preview.last_frame().is_none());
        assert!(!preview.is_playing());
    }

    #[test]
    fn test_cannot_be_frame_clock() {
        let preview = PreviewOutput::new("p").unwrap();
        let info = info();
        assert!(matches!(
            preview.set_frame_requested_callback(&info, Some(Arc::new(|_| {}))),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(preview.set_frame_requested_callback(&info, None).is_ok());
    }

    #[cfg(feature = "image-encoding")]
    #[test]
    fn test_snapshot_data_url() {
        let preview = PreviewOutput::new("p").unwrap();
        preview.assign_to_channel(&info()).unwrap();
        preview.push(&frame(0)).unwrap();
        preview.sync().unwrap();
        let url = preview
            .snapshot_data_url(ImageFormat::Jpeg(80))
            .unwrap()
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }
}
