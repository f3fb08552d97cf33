//! Engine configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mono or stereo only.
pub const MAX_CHANNELS: usize = 2;

/// Shape of the live signal path, fixed between `prepare` calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
    pub channels: usize,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            max_block_size: 512,
            channels: 2,
        }
    }
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, max_block_size: usize, channels: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            channels,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidSpec(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.max_block_size == 0 {
            return Err(Error::InvalidSpec("max_block_size must be non-zero".into()));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::InvalidSpec(format!(
                "channels {} unsupported (mono or stereo only)",
                self.channels
            )));
        }
        Ok(())
    }

    /// Samples in `secs` seconds, rounded to the nearest sample.
    #[inline]
    pub fn secs_to_samples(&self, secs: f64) -> usize {
        (secs * self.sample_rate).round().max(0.0) as usize
    }
}

/// Processor-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub spec: ProcessSpec,
    /// Ramp length for gain, mix and width changes.
    pub smoothing_secs: f64,
    /// Crossfade length when a new kernel replaces the running one.
    pub crossfade_secs: f64,
    /// Scale kernels to a common energy at load time.
    pub normalise_kernel: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            spec: ProcessSpec::default(),
            smoothing_secs: 0.05,
            crossfade_secs: 0.02,
            normalise_kernel: true,
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        self.spec.validate()?;
        if !(0.0..=1.0).contains(&self.smoothing_secs) {
            return Err(Error::InvalidConfig(format!(
                "smoothing_secs {} out of range (0-1 s)",
                self.smoothing_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.crossfade_secs) {
            return Err(Error::InvalidConfig(format!(
                "crossfade_secs {} out of range (0-1 s)",
                self.crossfade_secs
            )));
        }
        Ok(())
    }
}
