//! Stereo width.

use coneko_core::{ProcessSpec, SmoothedValue};

/// Largest supported width; 1.0 leaves the image untouched.
pub const MAX_WIDTH: f32 = 2.0;

/// Left/right matrix with a smoothed width `w`:
///
/// ```text
/// left'  = left * (1 + w) / 2 + right * (1 - w) / 2
/// right' = left * (1 - w) / 2 + right * (1 + w) / 2
/// ```
///
/// `w = 0` collapses to the mono sum and `w = 2` doubles the side signal.
/// Mono and multichannel blocks pass through.
pub struct StereoWidth {
    width: SmoothedValue,
}

impl StereoWidth {
    pub fn new(spec: &ProcessSpec, smoothing_secs: f64) -> Self {
        Self {
            width: SmoothedValue::new(1.0, smoothing_secs, spec.sample_rate),
        }
    }

    pub fn prepare(&mut self, spec: &ProcessSpec, smoothing_secs: f64) {
        self.width.set_ramp(smoothing_secs, spec.sample_rate);
        self.width.set_immediate(self.width.target());
    }

    /// Width as a fraction, clamped to `0..=MAX_WIDTH`.
    #[inline]
    pub fn set_width(&mut self, width: f32) {
        if width.is_finite() {
            self.width.set_target(width.clamp(0.0, MAX_WIDTH));
        }
    }

    /// Width from a percentage (100 % = 1.0).
    #[inline]
    pub fn set_width_percent(&mut self, percent: f32) {
        self.set_width(percent / 100.0);
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width.target()
    }

    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C], len: usize) {
        let [left, right] = block else {
            return;
        };
        if !self.width.is_smoothing() && self.width.current() == 1.0 {
            return;
        }

        for (l, r) in left.as_mut()[..len]
            .iter_mut()
            .zip(right.as_mut()[..len].iter_mut())
        {
            let w = self.width.next_value();
            let direct = (1.0 + w) * 0.5;
            let cross = (1.0 - w) * 0.5;
            let (x, y) = (*l, *r);
            *l = x * direct + y * cross;
            *r = x * cross + y * direct;
        }
    }

    pub fn reset(&mut self) {
        self.width.set_immediate(self.width.target());
    }
}
