//! Channel-major audio storage.

use crate::{Error, Result};

/// Multichannel sample buffer, shape `(channels, samples)`.
///
/// All channels always hold the same number of samples. The buffer carries
/// the sample rate its contents were captured at so that impulse responses
/// can be converted to the processing rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: f64,
}

impl AudioBuffer {
    /// Silent buffer of the given shape.
    pub fn new(num_channels: usize, num_samples: usize, sample_rate: f64) -> Self {
        Self {
            channels: vec![vec![0.0; num_samples]; num_channels],
            sample_rate,
        }
    }

    /// Empty buffer with no channels and no samples.
    pub fn empty(sample_rate: f64) -> Self {
        Self {
            channels: Vec::new(),
            sample_rate,
        }
    }

    /// Build from per-channel vectors. Ragged input is zero-padded to the
    /// longest channel.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: f64) -> Self {
        let len = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(len, 0.0);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: f64) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// De-interleave frames of `num_channels` samples.
    pub fn from_interleaved(data: &[f32], num_channels: usize, sample_rate: f64) -> Result<Self> {
        if num_channels == 0 || data.len() % num_channels != 0 {
            return Err(Error::InterleavedLength {
                len: data.len(),
                channels: num_channels,
            });
        }
        let frames = data.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in data.chunks_exact(num_channels) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// True when there is no channel or no sample to process.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_channels() == 0 || self.num_samples() == 0
    }

    /// Length in seconds at the buffer's own sample rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sample_rate
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    #[inline]
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Mutable channel vectors. Usable directly as a processing block.
    #[inline]
    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Peak absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.peak_in(0, self.num_samples())
    }

    /// Peak absolute sample across all channels within `[start, start + len)`.
    /// The window is clipped to the buffer.
    pub fn peak_in(&self, start: usize, len: usize) -> f32 {
        let total = self.num_samples();
        let start = start.min(total);
        let end = start.saturating_add(len).min(total);
        self.channels
            .iter()
            .flat_map(|channel| channel[start..end].iter())
            .fold(0.0f32, |peak, &sample| peak.max(sample.abs()))
    }

    /// Largest per-channel sum of squares.
    pub fn max_channel_energy(&self) -> f64 {
        self.channels
            .iter()
            .map(|channel| channel.iter().map(|&s| s as f64 * s as f64).sum::<f64>())
            .fold(0.0, f64::max)
    }

    pub fn apply_gain(&mut self, gain: f32) {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Copy of `[start, start + len)` from every channel, clipped to the buffer.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let total = self.num_samples();
        let start = start.min(total);
        let end = start.saturating_add(len).min(total);
        Self {
            channels: self
                .channels
                .iter()
                .map(|channel| channel[start..end].to_vec())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Truncate or zero-pad every channel to `num_samples`.
    pub fn resize(&mut self, num_samples: usize) {
        for channel in &mut self.channels {
            channel.resize(num_samples, 0.0);
        }
    }

    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Copy another buffer's samples into this one without reallocating.
    pub fn copy_from(&mut self, other: &AudioBuffer) -> Result<()> {
        if other.num_channels() != self.num_channels() {
            return Err(Error::ChannelMismatch {
                expected: self.num_channels(),
                actual: other.num_channels(),
            });
        }
        let len = self.num_samples().min(other.num_samples());
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst[..len].copy_from_slice(&src[..len]);
            dst[len..].fill(0.0);
        }
        Ok(())
    }
}
