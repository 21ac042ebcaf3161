//! Frame clock protocol: the per-tick audio sample demand.
//!
//! The device acting as a channel's frame clock calls its
//! [`FrameRequestedCallback`] once per output frame with the number of audio
//! samples the next frame must carry. Frame rates such as 30000/1001 don't
//! divide the sample rate, so the count varies tick to tick; [`SampleCounter`]
//! distributes the remainder so the running total never drifts from
//! `sample_rate * frames / frame_rate`.
//!
//! A device drives at most one channel: [`ClockBinding`] holds the callback
//! together with the channel that installed it and refuses a second channel.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    device::ChannelId,
    time::{rescale, Rational},
    Error, Result,
};

/// Called by a clock device once per frame interval with the audio sample count to pull.
pub type FrameRequestedCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// The frame clock callback slot of one output device.
#[derive(Default)]
pub struct ClockBinding {
    slot: Mutex<Option<(ChannelId, FrameRequestedCallback)>>,
}

impl fmt::Debug for ClockBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockBinding")
            .field("owner", &self.owner())
            .finish()
    }
}

impl ClockBinding {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<(ChannelId, FrameRequestedCallback)>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `callback` on behalf of `channel`, or unbind with `None`.
    ///
    /// Rebinding by the owning channel replaces the callback. Unbinding on
    /// behalf of a channel that doesn't own the binding does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::ClockBoundElsewhere`] if another channel owns the binding.
    pub fn set(
        &self,
        device: &str,
        channel: ChannelId,
        callback: Option<FrameRequestedCallback>,
    ) -> Result<()> {
        let mut slot = self.lock();
        match callback {
            Some(callback) => {
                if let Some((owner, _)) = slot.as_ref() {
                    if *owner != channel {
                        return Err(Error::ClockBoundElsewhere(device.to_string()));
                    }
                }
                *slot = Some((channel, callback));
            }
            None => {
                if slot.as_ref().is_some_and(|(owner, _)| *owner == channel) {
                    *slot = None;
                }
            }
        }
        Ok(())
    }

    /// The channel driven by this device.
    pub fn owner(&self) -> Option<ChannelId> {
        self.lock().as_ref().map(|(owner, _)| *owner)
    }

    pub fn callback(&self) -> Option<FrameRequestedCallback> {
        self.lock().as_ref().map(|(_, callback)| Arc::clone(callback))
    }
}

/// Running rational counter of frames and audio samples delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCounter {
    sample_rate: u32,
    frame_rate: Rational,
    frames: i64,
    samples: i64,
}

impl SampleCounter {
    pub fn new(sample_rate: u32, frame_rate: Rational) -> Self {
        Self {
            sample_rate,
            frame_rate,
            frames: 0,
            samples: 0,
        }
    }

    /// Samples the next frame must carry to keep the cumulative count exact.
    pub fn samples_required(&self) -> usize {
        let due = rescale(
            self.frames + 1,
            i64::from(self.sample_rate) * self.frame_rate.den,
            self.frame_rate.num,
        );
        (due - self.samples).max(0) as usize
    }

    /// Record one delivered frame carrying `samples` audio samples.
    pub fn advance(&mut self, samples: usize) {
        self.frames += 1;
        self.samples += samples as i64;
    }

    pub fn frames(&self) -> i64 {
        self.frames
    }

    pub fn samples(&self) -> i64 {
        self.samples
    }

    pub fn reset(&mut self) {
        self.frames = 0;
        self.samples = 0;
    }
}
