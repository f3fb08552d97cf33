//! Linear parameter ramps for zipper-free changes.
//!
//! # Example
//!
//! ```
//! use coneko_core::SmoothedValue;
//!
//! // 10 ms ramps at 48 kHz
//! let mut mix = SmoothedValue::new(1.0, 0.010, 48000.0);
//! mix.set_target(0.5);
//!
//! # let mut wet = [0.0f32; 512];
//! for sample in wet.iter_mut() {
//!     *sample *= mix.next_value();
//! }
//! ```

/// A value that moves linearly to its target over a fixed number of samples.
///
/// Retargeting mid-ramp starts a fresh ramp from the current position, so
/// the output never jumps.
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    ramp_samples: u32,
}

impl SmoothedValue {
    pub fn new(initial: f32, ramp_secs: f64, sample_rate: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_samples: Self::ramp_len(ramp_secs, sample_rate),
        }
    }

    /// No ramp: every target is reached on the next sample.
    pub fn immediate(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_samples: 0,
        }
    }

    fn ramp_len(ramp_secs: f64, sample_rate: f64) -> u32 {
        (ramp_secs.max(0.0) * sample_rate.max(0.0)).round() as u32
    }

    /// Change the ramp length. Takes effect on the next retarget.
    pub fn set_ramp(&mut self, ramp_secs: f64, sample_rate: f64) {
        self.ramp_samples = Self::ramp_len(ramp_secs, sample_rate);
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;

        if self.ramp_samples == 0 {
            self.set_immediate(target);
            return;
        }
        self.remaining = self.ramp_samples;
        self.step = (self.target - self.current) / self.remaining as f32;
    }

    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    /// Advance `samples` at once.
    pub fn skip(&mut self, samples: usize) {
        if samples >= self.remaining as usize {
            self.current = self.target;
            self.remaining = 0;
        } else {
            self.remaining -= samples as u32;
            self.current += self.step * samples as f32;
        }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }
}

impl Default for SmoothedValue {
    fn default() -> Self {
        Self::immediate(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_starts_settled() {
        let smooth = SmoothedValue::new(1.0, 0.010, 44100.0);
        assert_eq!(smooth.current(), 1.0);
        assert!(!smooth.is_smoothing());
    }

    #[test]
    fn test_ramp_is_linear_and_lands_exactly() {
        let mut smooth = SmoothedValue::new(0.0, 0.004, 1000.0); // 4 samples
        smooth.set_target(1.0);

        let values: Vec<f32> = (0..6).map(|_| smooth.next_value()).collect();
        assert!(approx_eq(values[0], 0.25));
        assert!(approx_eq(values[1], 0.5));
        assert!(approx_eq(values[2], 0.75));
        assert_eq!(values[3], 1.0);
        assert_eq!(values[5], 1.0);
        assert!(!smooth.is_smoothing());
    }

    #[test]
    fn test_retarget_mid_ramp_is_continuous() {
        let mut smooth = SmoothedValue::new(0.0, 0.010, 1000.0); // 10 samples
        smooth.set_target(1.0);
        for _ in 0..5 {
            smooth.next_value();
        }
        let before = smooth.current();
        smooth.set_target(0.0);
        let after = smooth.next_value();
        assert!((after - before).abs() <= 0.1 + EPSILON);
        assert!(after < before);
    }

    #[test]
    fn test_zero_ramp_is_immediate() {
        let mut smooth = SmoothedValue::new(0.0, 0.0, 48000.0);
        smooth.set_target(0.7);
        assert!(!smooth.is_smoothing());
        assert_eq!(smooth.next_value(), 0.7);
    }

    #[test]
    fn test_skip() {
        let mut smooth = SmoothedValue::new(0.0, 0.010, 1000.0);
        smooth.set_target(1.0);
        smooth.skip(5);
        assert!(approx_eq(smooth.current(), 0.5));
        smooth.skip(100);
        assert_eq!(smooth.current(), 1.0);
        assert!(!smooth.is_smoothing());
    }

    #[test]
    fn test_same_target_does_not_restart() {
        let mut smooth = SmoothedValue::new(0.0, 0.010, 1000.0);
        smooth.set_target(1.0);
        smooth.next_value();
        smooth.set_target(1.0);
        assert!(approx_eq(smooth.next_value(), 0.2));
    }
}
