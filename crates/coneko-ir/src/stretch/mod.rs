//! Offline time-stretching for impulse responses.
//!
//! Unlike a streaming stretcher, these operate on a whole buffer at once and
//! start from clean state on every call, so independent rebuilds never share
//! history.

mod phase_vocoder;
pub use phase_vocoder::PhaseVocoder;

/// Changes the duration of a signal without changing its pitch.
pub trait TimeStretcher: Send {
    /// Stretch `samples` by `ratio`, returning exactly
    /// `round(samples.len() / ratio)` samples.
    ///
    /// `ratio > 1` shortens, `ratio < 1` lengthens. A ratio of 1 or one that
    /// is not a positive finite number returns the input unchanged.
    fn stretch(&mut self, samples: &[f32], ratio: f64) -> Vec<f32>;
}

/// Analysis frame size preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftSize {
    /// 512-point FFT
    Small = 512,

    /// 1024-point FFT
    Medium = 1024,

    /// 2048-point FFT - Default
    #[default]
    Large = 2048,

    /// 4096-point FFT
    XLarge = 4096,
}

impl FftSize {
    pub fn size(&self) -> usize {
        *self as usize
    }

    /// Synthesis hop (FFT size / 4 = 75% overlap)
    pub fn hop_size(&self) -> usize {
        self.size() / 4
    }
}

/// Output length for a stretch of `len` samples by `ratio`.
#[inline]
pub fn stretched_len(len: usize, ratio: f64) -> usize {
    if ratio.is_finite() && ratio > 0.0 {
        (len as f64 / ratio).round() as usize
    } else {
        len
    }
}
