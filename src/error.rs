//! Error types for the grafton-playout library.

use std::time::Duration;
use thiserror::Error;

/// The main error type for playout operations.
///
/// Timing discontinuities (queue overflow, audio FIFO overflow, out-of-order
/// timestamps) are recovered locally and never surface here; they are only
/// reported through `tracing` events.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration parameters are invalid.
    ///
    /// This can occur when builder validation fails or conflicting options are set.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Frame data is invalid or does not match the buffer it is pushed into.
    #[error("Invalid frame data: {0}")]
    InvalidFrame(String),

    /// A frame was pushed into a buffer after `flush()` was called.
    ///
    /// The buffer is left untouched; call `seek()` to accept frames again.
    #[error("Buffer has been flushed and accepts no further frames")]
    BufferFlushed,

    /// The output device is already attached to the channel.
    #[error("Output device is already attached: {0}")]
    OutputAlreadyAttached(String),

    /// The output device is not attached to the channel.
    #[error("Output device is not attached: {0}")]
    OutputNotAttached(String),

    /// The output device refused to be assigned to the channel.
    ///
    /// Typically the device is already running for another channel.
    #[error("Output device refused channel assignment: {0}")]
    AssignmentRejected(String),

    /// Attempted to detach the clock device while other outputs remain attached.
    #[error("Cannot detach clock device {0} while other outputs are attached; assign a new frame clock first")]
    ClockInUse(String),

    /// The device already drives the frame clock of another channel.
    #[error("Output device {0} is already the frame clock of another channel")]
    ClockBoundElsewhere(String),

    /// The executor thread has been stopped and accepts no more tasks.
    #[error("Executor {0} is stopped")]
    ExecutorStopped(String),

    /// A task panicked on its executor thread.
    #[error("Task panicked on executor {0}")]
    TaskPanicked(String),

    /// A synchronous handshake did not complete in time.
    #[error("Operation did not complete within {0:?}")]
    Timeout(Duration),

    /// The input source cannot seek.
    #[error("Seek is not supported by source: {0}")]
    SeekUnsupported(String),

    /// No device factory is registered under the given name.
    #[error("Unknown device kind: {0}")]
    UnknownDevice(String),

    /// Snapshot image encoding failed.
    #[error("Image encoding failed: {0}")]
    Encoding(String),
}
