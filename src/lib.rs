//! Real-time audio/video playout core for broadcast channels.
//!
//! This crate synchronizes decoded audio and video coming from input sources
//! and delivers them, one time-coherent frame per clock tick, to a set of
//! output devices. One output acts as the channel's frame clock; every other
//! output is fed from that cadence.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use grafton_playout::{
//!     AudioFrame, BufferedSource, Channel, ChannelOptions, InputSource, OutputDevice,
//!     PreviewOutput, Rational, VideoFormatType, VideoFrame,
//! };
//!
//! # fn main() -> Result<(), grafton_playout::Error> {
//! let options = ChannelOptions::builder("Channel 1")
//!     .video_format(VideoFormatType::V1080p2500)
//!     .build()?;
//! let channel = Channel::new(&options)?;
//!
//! let preview: Arc<dyn OutputDevice> = Arc::new(PreviewOutput::new("monitor")?);
//! channel.add_output(&preview)?;
//!
//! let source = Arc::new(BufferedSource::new("clip", &options)?);
//! let video = VideoFrame::builder()
//!     .resolution(1920, 1080)
//!     .pixel_format(options.pixel_format)
//!     .pts(0)
//!     .build()?;
//! source.push_video(Arc::new(video), Rational::new(1, 25))?;
//! source.push_audio(Arc::new(AudioFrame::builder().channels(2).samples(1920).pts(0).build()?))?;
//! source.play();
//! channel.load(source)?;
//!
//! // A frame clock normally drives this; here one tick is served by hand.
//! channel.request_frame(1920);
//! # Ok(())
//! # }
//! ```
//!
//! # Core Concepts
//!
//! ## Time
//!
//! All presentation times are expressed in one global time base of
//! microseconds ([`TIME_BASE`]). Media timestamps carry their own
//! [`Rational`] time base and are converted with [`rescale`], which rounds to
//! nearest.
//!
//! ## Synchronizing Buffer
//!
//! Each buffered source owns a [`SynchronizingBuffer`]: a bounded video queue
//! plus a sample-accurate [`AudioFifo`]. Producers push irregularly; the
//! channel tick pulls exactly one [`SyncFrame`] per frame interval. The
//! buffer never fails a pull: underruns are padded with silence and the last
//! picture (or black).
//!
//! ## Channels, Sources and Outputs
//!
//! A [`Channel`] has a fixed [`VideoFormat`], at most one active
//! [`InputSource`] and any number of [`OutputDevice`]s. Sources can be
//! preloaded and take over on the first tick at which they are ready.
//!
//! # Thread Safety
//!
//! Every device runs its callbacks on its own single-threaded [`Executor`],
//! so callbacks of one device never run concurrently while distinct devices
//! run in parallel. All public types are `Send + Sync` where they are shared.
//!
//! # Features
//!
//! - `image-encoding`: JPEG and data-URL snapshots
//! - `tokio`: async wrappers in the `tokio` module

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

// Internal modules
mod error;

// Public modules
pub mod async_runtime;
pub mod audio_fifo;
pub mod buffered_source;
pub mod channel;
pub mod clock;
pub mod completion;
pub mod device;
pub mod executor;
pub mod format;
pub mod frames;
pub mod level;
pub mod live_source;
pub mod preview;
pub mod registry;
pub mod sync_frame;
pub mod synchronizing_buffer;
pub mod time;
pub mod timer_output;

#[cfg(feature = "tokio")]
pub use async_runtime::tokio;
#[cfg(feature = "image-encoding")]
pub use frames::ImageFormat;
pub use {
    audio_fifo::{AudioFifo, CONTINUITY_TOLERANCE},
    buffered_source::{BufferedSource, StreamInfo},
    channel::{Channel, ChannelOptions, ChannelOptionsBuilder, SourceState, MAX_QUEUED_FRAMES},
    clock::{ClockBinding, FrameRequestedCallback, SampleCounter},
    device::{
        ChannelId, ChannelInfo, EventCallback, InputSource, OutputDevice, SourceCallbacks,
        TimeCallback,
    },
    error::*,
    executor::Executor,
    format::{FieldOrder, PixelFormat, VideoFormat, VideoFormatType},
    frames::{
        AudioFrame, AudioFrameBuilder, VideoFrame, VideoFrameBuilder, MAX_AUDIO_CHANNELS,
    },
    level::{AudioLevel, AudioVolumeCallback, LevelMode},
    live_source::{LiveSource, Timecode},
    preview::PreviewOutput,
    registry::{DeviceRegistry, OutputFactory},
    sync_frame::SyncFrame,
    synchronizing_buffer::{SynchronizingBuffer, SynchronizingBufferBuilder, DEFAULT_SAMPLE_RATE},
    time::{rescale, rescale_q, Rational, TIME_BASE},
    timer_output::{FrameSink, OutputStats, TimerOutput, TimerOutputBuilder},
};

/// Alias for Result with our Error type
pub type Result<T> = std::result::Result<T, crate::error::Error>;

// Tests
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
