//! Tolerance constants for audio testing.
//!
//! Different stages of the chain need different precision levels.

/// Floating point rounding errors (pass-through, exact gain).
/// Use for paths that should be mathematically exact.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Filter and FFT round-off.
pub const DSP_EPSILON: f32 = 1e-4;

/// Audio perceptual tolerance (~-60dB, inaudible differences).
/// Convolution output is compared against the prepared IR with this.
pub const PERCEPTUAL_EPSILON: f32 = 0.001;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;
