//! Turns an imported impulse response into a processing-ready one.
//!
//! Stages run in a fixed order, each a public function so callers and tests
//! can use them on their own:
//!
//! 1. [`resample`] to the processing rate (linear interpolation)
//! 2. [`match_channels`] onto the live channel count
//! 3. [`normalize`] by the global peak
//! 4. [`trim`] leading and trailing silence in ~10 ms blocks
//! 5. stretch to a target decay time, when one is given
//! 6. [`reverse`], when requested
//!
//! Degenerate input (no channels, no samples, silence) flows through every
//! stage without error and comes out as an empty or silent buffer, which the
//! convolution engine treats as pass-through.

use crate::stretch::{PhaseVocoder, TimeStretcher};
use coneko_core::AudioBuffer;

/// Peak a trim block must exceed to count as signal.
pub const TRIM_THRESHOLD: f32 = 0.001;

/// Added to the peak before normalising so silence never divides by zero.
pub const NORMALIZE_EPSILON: f32 = 0.01;

/// Trim block length: 10 ms, at least one sample.
#[inline]
pub fn trim_block_size(sample_rate: f64) -> usize {
    ((sample_rate / 100.0).floor() as usize).max(1)
}

/// Sample window kept by [`trim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimRange {
    pub start: usize,
    pub len: usize,
}

fn usable_rate(sample_rate: f64) -> bool {
    sample_rate.is_finite() && sample_rate > 0.0
}

/// Linear-interpolation sample-rate conversion.
///
/// Returns a copy when the rates already match. An IR with no usable rate of
/// its own is taken to be at `sample_rate` already; an unusable target leaves
/// the IR untouched.
pub fn resample(ir: &AudioBuffer, sample_rate: f64) -> AudioBuffer {
    if !usable_rate(sample_rate) {
        return ir.clone();
    }
    let source_rate = ir.sample_rate();
    if !usable_rate(source_rate) || (source_rate - sample_rate).abs() < 1e-6 || ir.is_empty() {
        let mut copy = ir.clone();
        copy.set_sample_rate(sample_rate);
        return copy;
    }

    let step = source_rate / sample_rate;
    let input_len = ir.num_samples();
    let output_len = ((input_len as f64) * sample_rate / source_rate).round() as usize;

    let channels = ir
        .channels()
        .iter()
        .map(|channel| {
            (0..output_len)
                .map(|i| {
                    let pos = i as f64 * step;
                    let index = pos.floor() as usize;
                    let frac = (pos - index as f64) as f32;
                    let a = channel.get(index).copied().unwrap_or(0.0);
                    let b = channel.get(index + 1).copied().unwrap_or(0.0);
                    a + (b - a) * frac
                })
                .collect()
        })
        .collect();

    AudioBuffer::from_channels(channels, sample_rate)
}

/// Map the IR's channels onto `channels` live channels: missing channels
/// repeat the last IR channel, extra IR channels are dropped.
pub fn match_channels(ir: AudioBuffer, channels: usize) -> AudioBuffer {
    if ir.num_channels() == channels {
        return ir;
    }
    let sample_rate = ir.sample_rate();
    if ir.num_channels() == 0 {
        return AudioBuffer::new(channels, 0, sample_rate);
    }

    let last = ir.num_channels() - 1;
    let source = ir.into_channels();
    let mapped = (0..channels)
        .map(|ch| source[ch.min(last)].clone())
        .collect();
    AudioBuffer::from_channels(mapped, sample_rate)
}

/// Scale by `1 / (peak + NORMALIZE_EPSILON)`. Returns the gain applied.
pub fn normalize(ir: &mut AudioBuffer) -> f32 {
    let gain = 1.0 / (ir.peak() + NORMALIZE_EPSILON);
    ir.apply_gain(gain);
    gain
}

/// Locate the signal between leading and trailing silence.
///
/// The buffer is cut into [`trim_block_size`] blocks (the last one may be
/// partial). The range starts at the first block whose peak exceeds
/// [`TRIM_THRESHOLD`] and ends after the last such block, clipped to the
/// buffer. All-silent input keeps its full length.
pub fn trim_range(ir: &AudioBuffer) -> TrimRange {
    let total = ir.num_samples();
    let block_size = trim_block_size(ir.sample_rate());
    let num_blocks = total.div_ceil(block_size);
    let loud = |block: &usize| ir.peak_in(block * block_size, block_size) > TRIM_THRESHOLD;

    let Some(first) = (0..num_blocks).find(loud) else {
        return TrimRange { start: 0, len: total };
    };
    let last = (first..num_blocks).rev().find(loud).unwrap_or(first);

    let start = first * block_size;
    let end = ((last + 1) * block_size).min(total);
    TrimRange {
        start,
        len: end - start,
    }
}

pub fn trim(ir: &AudioBuffer) -> (AudioBuffer, TrimRange) {
    let range = trim_range(ir);
    (ir.slice(range.start, range.len), range)
}

/// Reverse every channel in place; channels stay aligned.
pub fn reverse(ir: &mut AudioBuffer) {
    for channel in ir.channels_mut() {
        channel.reverse();
    }
}

/// What to build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildRequest {
    /// Stretch to this many seconds. `None` keeps the trimmed length.
    pub target_decay_secs: Option<f64>,
    pub reverse: bool,
    /// Processing sample rate
    pub sample_rate: f64,
    /// Live channel count
    pub channels: usize,
}

/// Builder output.
#[derive(Debug, Clone)]
pub struct BuiltIr {
    pub ir: AudioBuffer,
    /// Trimmed duration before any stretch, in seconds.
    pub natural_secs: f64,
    /// Trim window, in samples at the processing rate.
    pub trim: TrimRange,
    /// `current / target` length ratio, if a stretch ran.
    pub stretch_ratio: Option<f64>,
}

/// Runs the full pipeline with a reusable time-stretcher.
pub struct IrBuilder {
    stretcher: Box<dyn TimeStretcher>,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::with_stretcher(Box::new(PhaseVocoder::default()))
    }

    pub fn with_stretcher(stretcher: Box<dyn TimeStretcher>) -> Self {
        Self { stretcher }
    }

    pub fn build(&mut self, raw: &AudioBuffer, request: &BuildRequest) -> BuiltIr {
        let resampled = resample(raw, request.sample_rate);
        let mut ir = match_channels(resampled, request.channels);
        normalize(&mut ir);

        let (mut ir, trim) = trim(&ir);
        let sample_rate = ir.sample_rate();
        let natural_secs = ir.duration_secs();

        let stretch_ratio = request
            .target_decay_secs
            .and_then(|target| self.stretch(&mut ir, target, sample_rate));

        if request.reverse {
            reverse(&mut ir);
        }

        BuiltIr {
            ir,
            natural_secs,
            trim,
            stretch_ratio,
        }
    }

    /// Stretch every channel to exactly `round(target_secs * sample_rate)`
    /// samples. Skipped when the length already matches, the buffer is
    /// empty, or the target is unusable.
    fn stretch(&mut self, ir: &mut AudioBuffer, target_secs: f64, sample_rate: f64) -> Option<f64> {
        if !(target_secs.is_finite() && target_secs > 0.0) {
            return None;
        }
        let current = ir.num_samples();
        let target = (target_secs * sample_rate).round() as usize;
        if current == 0 || target == 0 || target == current {
            return None;
        }

        let ratio = current as f64 / target as f64;
        for channel in ir.channels_mut() {
            let mut stretched = self.stretcher.stretch(channel, ratio);
            stretched.resize(target, 0.0);
            *channel = stretched;
        }
        Some(ratio)
    }
}
