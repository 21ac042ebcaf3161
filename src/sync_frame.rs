//! The synchronized audio/video unit delivered once per clock tick.

use std::{fmt, sync::Arc};

use crate::frames::{AudioFrame, VideoFrame};

/// One time-coherent pair of audio and video, stamped with a presentation time.
///
/// A `SyncFrame` is built by a synchronizing buffer (or synthesized by the
/// channel) once per tick and handed to every attached output. It is never
/// mutated after construction; cloning only bumps the reference counts of
/// the underlying frames.
///
/// Both members are always present. When a source is starved the audio is
/// silence and the video is the last delivered picture or a black frame.
#[derive(Clone)]
pub struct SyncFrame {
    audio: Arc<AudioFrame>,
    video: Arc<VideoFrame>,
    time: i64,
}

impl SyncFrame {
    /// `time` is in the global time base (microseconds).
    pub fn new(audio: Arc<AudioFrame>, video: Arc<VideoFrame>, time: i64) -> Self {
        Self { audio, video, time }
    }

    pub fn audio(&self) -> &Arc<AudioFrame> {
        &self.audio
    }

    pub fn video(&self) -> &Arc<VideoFrame> {
        &self.video
    }

    /// Presentation time in microseconds.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Whether both frames are shared with `other` (same picture, same audio block).
    pub fn shares_frames_with(&self, other: &SyncFrame) -> bool {
        Arc::ptr_eq(&self.audio, &other.audio) && Arc::ptr_eq(&self.video, &other.video)
    }
}

impl fmt::Debug for SyncFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncFrame")
            .field("time", &self.time)
            .field("audio_samples", &self.audio.num_samples)
            .field("audio_channels", &self.audio.num_channels)
            .field("video", &format_args!("{}x{}", self.video.width, self.video.height))
            .field("video_pts", &self.video.pts)
            .finish()
    }
}
