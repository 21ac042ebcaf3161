//! Sample-accurate audio FIFO keyed by presentation time.
//!
//! The FIFO stores interleaved samples contiguously and anchors them to the
//! timeline with a base time plus a running sample index, so the time of any
//! sample is derived rather than stored. A push that would leave a hole in
//! the timeline, or exceed capacity, is refused without touching the content;
//! the caller decides whether to [`reset`](AudioFifo::reset) and accept the
//! discontinuity.

use std::collections::VecDeque;

use tracing::trace;

use crate::{
    frames::AudioFrame,
    time::{rescale, TIME_BASE},
    Error, Result,
};

/// Largest pts mismatch, in microseconds, still treated as contiguous.
pub const CONTINUITY_TOLERANCE: i64 = 10_000;

/// Fixed-capacity interleaved sample store.
#[derive(Debug)]
pub struct AudioFifo {
    channels: usize,
    sample_rate: u32,
    capacity: usize,
    /// Presentation time of sample index 0.
    base_time: i64,
    /// Samples (per channel) already pulled or discarded since `base_time`.
    consumed: i64,
    samples: VecDeque<f32>,
}

impl AudioFifo {
    /// Create a FIFO holding at most `capacity` microseconds of audio.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel count, sample rate or capacity is zero.
    pub fn new(channels: usize, sample_rate: u32, base_time: i64, capacity: i64) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "Audio FIFO needs channels and sample rate, got {channels} channels at {sample_rate} Hz"
            )));
        }
        let capacity = rescale(capacity, i64::from(sample_rate), TIME_BASE);
        if capacity <= 0 {
            return Err(Error::InvalidConfiguration(
                "Audio FIFO capacity must be positive".into(),
            ));
        }
        let capacity = capacity as usize;
        Ok(Self {
            channels,
            sample_rate,
            capacity,
            base_time,
            consumed: 0,
            samples: VecDeque::new(),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Capacity in samples per channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered samples per channel.
    pub fn samples_count(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Presentation time of the oldest buffered sample.
    pub fn time_min(&self) -> i64 {
        self.base_time + rescale(self.consumed, TIME_BASE, i64::from(self.sample_rate))
    }

    /// Presentation time just past the newest buffered sample.
    pub fn time_max(&self) -> i64 {
        let end = self.consumed + self.samples_count() as i64;
        self.base_time + rescale(end, TIME_BASE, i64::from(self.sample_rate))
    }

    /// Append a block, or refuse it without changing any state.
    ///
    /// A block is refused when it would exceed capacity, when its layout
    /// doesn't match the FIFO, or when its timestamp is more than
    /// [`CONTINUITY_TOLERANCE`] away from [`time_max`](Self::time_max). An
    /// empty FIFO adopts the timestamp of the block as its new anchor.
    pub fn try_push(&mut self, frame: &AudioFrame) -> bool {
        if frame.num_channels != self.channels || frame.sample_rate != self.sample_rate {
            trace!(
                channels = frame.num_channels,
                sample_rate = frame.sample_rate,
                "audio block layout doesn't match FIFO"
            );
            return false;
        }
        if self.samples_count() + frame.num_samples > self.capacity {
            return false;
        }

        if let Some(time) = frame.time() {
            if self.samples.is_empty() {
                self.base_time = time;
                self.consumed = 0;
            } else if (time - self.time_max()).abs() > CONTINUITY_TOLERANCE {
                trace!(
                    expected = self.time_max(),
                    actual = time,
                    "audio block is discontinuous"
                );
                return false;
            }
        }

        self.samples.extend(frame.data().iter().copied());
        true
    }

    /// Remove exactly `sample_count` samples per channel.
    ///
    /// When fewer are buffered the result is padded with silence, so the
    /// returned block always has `sample_count` samples. The block's pts is
    /// the FIFO position it was read from.
    pub fn pull(&mut self, sample_count: usize) -> AudioFrame {
        let pts = rescale(self.time_min(), i64::from(self.sample_rate), TIME_BASE);
        let wanted = sample_count * self.channels;
        let available = wanted.min(self.samples.len());

        let mut data: Vec<f32> = self.samples.drain(..available).collect();
        if available < wanted {
            trace!(
                requested = sample_count,
                available = available / self.channels,
                "audio FIFO underrun, padding with silence"
            );
            data.resize(wanted, 0.0);
        }
        self.consumed += sample_count as i64;

        AudioFrame::from_interleaved(data, self.channels, self.sample_rate, Some(pts))
    }

    /// Drop up to `sample_count` of the oldest samples per channel.
    pub fn discard_samples(&mut self, sample_count: usize) {
        let count = (sample_count * self.channels).min(self.samples.len());
        self.samples.drain(..count);
        self.consumed += (count / self.channels) as i64;
    }

    /// Discard everything and re-anchor the timeline at `base_time`.
    pub fn reset(&mut self, base_time: i64) {
        self.samples.clear();
        self.base_time = base_time;
        self.consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: usize, pts: Option<i64>, value: f32) -> AudioFrame {
        let mut builder = AudioFrame::builder()
            .sample_rate(48000)
            .channels(2)
            .data(vec![value; samples * 2]);
        if let Some(pts) = pts {
            builder = builder.pts(pts);
        }
        builder.build().unwrap()
    }

    fn fifo() -> AudioFifo {
        AudioFifo::new(2, 48000, 0, TIME_BASE).unwrap()
    }

    /// Storage grows with the content, not with the configured capacity
    #[test]
    fn test_storage_grows_on_demand() {
        let mut fifo = AudioFifo::new(63, 48000, 0, 10 * TIME_BASE).unwrap();
        assert_eq!(fifo.capacity(), 480_000);
        assert_eq!(fifo.samples.capacity(), 0);

        let frame = AudioFrame::builder()
            .sample_rate(48000)
            .channels(63)
            .samples(1920)
            .pts(0)
            .build()
            .unwrap();
        assert!(fifo.try_push(&frame));
        assert_eq!(fifo.samples_count(), 1920);
        assert!(fifo.samples.capacity() < fifo.capacity() * 63);
    }

    /// Pull returns the requested count for empty, partial and full buffers
    #[test]
    fn test_pull_is_fixed_size() {
        let mut fifo = fifo();
        for n in [0, 1, 480, 1920, 5000] {
            assert_eq!(fifo.pull(n).num_samples, n, "empty fifo, n={n}");
        }

        let mut fifo = self::fifo();
        assert!(fifo.try_push(&block(1000, Some(0), 0.5)));
        let pulled = fifo.pull(1920);
        assert_eq!(pulled.num_samples, 1920);
        assert_eq!(pulled.data().len(), 3840);
        assert!(pulled.data()[..2000].iter().all(|s| *s == 0.5));
        assert!(pulled.data()[2000..].iter().all(|s| *s == 0.0));
        assert_eq!(fifo.samples_count(), 0);
    }

    /// A push that would overflow is refused and leaves the fifo untouched
    #[test]
    fn test_try_push_overflow_does_not_mutate() {
        let mut fifo = AudioFifo::new(2, 48000, 0, 100_000).unwrap();
        assert_eq!(fifo.capacity(), 4800);
        assert!(fifo.try_push(&block(4000, Some(0), 1.0)));
        let before = (fifo.samples_count(), fifo.time_min(), fifo.time_max());

        assert!(!fifo.try_push(&block(1000, Some(4000), 1.0)));
        assert_eq!((fifo.samples_count(), fifo.time_min(), fifo.time_max()), before);
    }

    /// Accepted pushes keep the timeline contiguous
    #[test]
    fn test_contiguous_pushes_accepted() {
        let mut fifo = fifo();
        for i in 0..5 {
            assert!(fifo.try_push(&block(1920, Some(i * 1920), 0.1)), "push {i}");
        }
        assert_eq!(fifo.time_min(), 0);
        assert_eq!(fifo.time_max(), 200_000);
    }

    /// A block that would leave a gap is refused until the fifo is reset
    #[test]
    fn test_gap_requires_reset() {
        let mut fifo = fifo();
        assert!(fifo.try_push(&block(1920, Some(0), 0.1)));
        assert!(!fifo.try_push(&block(1920, Some(48000), 0.1)));
        assert_eq!(fifo.samples_count(), 1920);

        fifo.reset(1_000_000);
        assert_eq!(fifo.samples_count(), 0);
        assert!(fifo.try_push(&block(1920, Some(48000), 0.1)));
        assert_eq!(fifo.time_min(), 1_000_000);
        assert_eq!(fifo.time_max(), 1_040_000);
    }

    /// Time bounds advance as samples are pulled
    #[test]
    fn test_time_bounds_follow_pulls() {
        let mut fifo = fifo();
        assert!(fifo.try_push(&block(4800, Some(48000), 0.1)));
        assert_eq!(fifo.time_min(), 1_000_000);

        let pulled = fifo.pull(2400);
        assert_eq!(pulled.pts, Some(48000));
        assert_eq!(fifo.time_min(), 1_050_000);
        assert_eq!(fifo.time_max(), 1_100_000);

        fifo.discard_samples(1200);
        assert_eq!(fifo.time_min(), 1_075_000);
        assert_eq!(fifo.samples_count(), 1200);
    }

    #[test]
    fn test_untimed_blocks_append() {
        let mut fifo = fifo();
        assert!(fifo.try_push(&block(100, None, 0.1)));
        assert!(fifo.try_push(&block(100, None, 0.1)));
        assert_eq!(fifo.samples_count(), 200);
    }

    #[test]
    fn test_layout_mismatch_refused() {
        let mut fifo = fifo();
        let mono = AudioFrame::builder().channels(1).samples(10).build().unwrap();
        assert!(!fifo.try_push(&mono));
    }

    #[test]
    fn test_new_validation() {
        assert!(AudioFifo::new(0, 48000, 0, TIME_BASE).is_err());
        assert!(AudioFifo::new(2, 0, 0, TIME_BASE).is_err());
        assert!(AudioFifo::new(2, 48000, 0, 0).is_err());
    }
}
