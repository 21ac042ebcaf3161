//! Per-channel audio level metering.

use std::sync::Arc;

use crate::frames::AudioFrame;

/// Receives one level per audio channel, once per channel tick.
pub type AudioVolumeCallback = Arc<dyn Fn(&[f64]) + Send + Sync>;

/// How a block of samples is reduced to a single level per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelMode {
    /// Largest absolute sample value.
    #[default]
    Peak,
    /// Root mean square of the samples.
    Rms,
}

/// Peak and RMS of every channel of one audio block, as linear amplitudes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioLevel {
    pub peak: Vec<f64>,
    pub rms: Vec<f64>,
}

impl AudioLevel {
    /// Measure an interleaved block.
    pub fn measure(frame: &AudioFrame) -> Self {
        let channels = frame.num_channels;
        let mut peak = vec![0.0f64; channels];
        let mut sum_squares = vec![0.0f64; channels];

        if channels > 0 {
            for samples in frame.data().chunks_exact(channels) {
                for (ch, sample) in samples.iter().enumerate() {
                    let s = f64::from(*sample);
                    peak[ch] = peak[ch].max(s.abs());
                    sum_squares[ch] += s * s;
                }
            }
        }

        let n = frame.num_samples.max(1) as f64;
        let rms = sum_squares.into_iter().map(|sum| (sum / n).sqrt()).collect();
        Self { peak, rms }
    }

    /// The levels selected by `mode`.
    pub fn values(&self, mode: LevelMode) -> &[f64] {
        match mode {
            LevelMode::Peak => &self.peak,
            LevelMode::Rms => &self.rms,
        }
    }
}

/// Convert a linear amplitude to dBFS, floored at `floor`.
pub fn to_dbfs(amplitude: f64, floor: f64) -> f64 {
    if amplitude <= 0.0 {
        return floor;
    }
    (20.0 * amplitude.log10()).max(floor)
}
