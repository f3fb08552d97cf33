//! Low and high shelving filters.
//!
//! RBJ cookbook shelves with a fixed Q, run in `f64` Direct Form I. The
//! coefficients are only recomputed when a parameter actually changes, so
//! calling [`FilterStage::set_low`] / [`FilterStage::set_high`] every block is
//! cheap.

use coneko_core::ProcessSpec;
use std::f64::consts::PI;

/// Shelf slope.
pub const SHELF_Q: f64 = 0.7;

/// Shelf gain limit in dB, either direction.
pub const MAX_SHELF_GAIN_DB: f32 = 24.0;

/// Below this gain a shelf is skipped entirely.
const BYPASS_GAIN_DB: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfKind {
    /// Boost/cut below the cutoff
    Low,
    /// Boost/cut above the cutoff
    High,
}

/// Normalised biquad coefficients (a0 = 1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    fn shelf(kind: ShelfKind, sample_rate: f64, frequency: f64, gain_db: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * SHELF_Q);
        let a = 10.0_f64.powf(gain_db / 40.0);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let (b0, b1, b2, a0, a1, a2) = match kind {
            ShelfKind::Low => (
                a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
            ),
            ShelfKind::High => (
                a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
            ),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `frequency` in dB.
    #[cfg(test)]
    fn response_db(&self, sample_rate: f64, frequency: f64) -> f64 {
        use rustfft::num_complex::Complex64;
        let z1 = Complex64::from_polar(1.0, -2.0 * PI * frequency / sample_rate);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        20.0 * (num / den).norm().log10()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// One shelving filter with independent state per channel.
pub struct ShelfFilter {
    kind: ShelfKind,
    sample_rate: f64,
    frequency: f32,
    gain_db: f32,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
    active: bool,
}

impl ShelfFilter {
    pub fn new(kind: ShelfKind, spec: &ProcessSpec) -> Self {
        let frequency = match kind {
            ShelfKind::Low => 20.0,
            ShelfKind::High => 20000.0,
        };
        let mut filter = Self {
            kind,
            sample_rate: spec.sample_rate,
            frequency,
            gain_db: 0.0,
            coeffs: BiquadCoeffs::default(),
            states: Vec::new(),
            active: false,
        };
        filter.prepare(spec);
        filter
    }

    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        self.states = vec![BiquadState::default(); spec.channels];
        self.recompute();
    }

    /// Clamp cutoff into `[1, nyquist - 1]` and gain into
    /// `±MAX_SHELF_GAIN_DB`, recomputing only if either changed.
    pub fn set_params(&mut self, frequency: f32, gain_db: f32) {
        let nyquist = (self.sample_rate * 0.5) as f32;
        let frequency = if frequency.is_finite() {
            frequency.clamp(1.0, nyquist - 1.0)
        } else {
            self.frequency
        };
        let gain_db = if gain_db.is_finite() {
            gain_db.clamp(-MAX_SHELF_GAIN_DB, MAX_SHELF_GAIN_DB)
        } else {
            self.gain_db
        };
        if frequency == self.frequency && gain_db == self.gain_db {
            return;
        }
        self.frequency = frequency;
        self.gain_db = gain_db;
        self.recompute();
    }

    fn recompute(&mut self) {
        let was_active = self.active;
        self.active = self.gain_db.abs() >= BYPASS_GAIN_DB;
        self.coeffs = BiquadCoeffs::shelf(
            self.kind,
            self.sample_rate,
            f64::from(self.frequency),
            f64::from(self.gain_db),
        );
        // Stale history from before a bypass would click
        if self.active && !was_active {
            self.reset();
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    #[inline]
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C], len: usize) {
        if !self.active {
            return;
        }
        for (state, channel) in self.states.iter_mut().zip(block.iter_mut()) {
            for sample in channel.as_mut()[..len].iter_mut() {
                *sample = state.process(f64::from(*sample), &self.coeffs) as f32;
            }
        }
    }

    pub fn reset(&mut self) {
        self.states.fill(BiquadState::default());
    }
}

/// Low shelf followed by high shelf.
pub struct FilterStage {
    low: ShelfFilter,
    high: ShelfFilter,
}

impl FilterStage {
    pub fn new(spec: &ProcessSpec) -> Self {
        Self {
            low: ShelfFilter::new(ShelfKind::Low, spec),
            high: ShelfFilter::new(ShelfKind::High, spec),
        }
    }

    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.low.prepare(spec);
        self.high.prepare(spec);
    }

    #[inline]
    pub fn set_low(&mut self, frequency: f32, gain_db: f32) {
        self.low.set_params(frequency, gain_db);
    }

    #[inline]
    pub fn set_high(&mut self, frequency: f32, gain_db: f32) {
        self.high.set_params(frequency, gain_db);
    }

    pub fn low(&self) -> &ShelfFilter {
        &self.low
    }

    pub fn high(&self) -> &ShelfFilter {
        &self.high
    }

    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C], len: usize) {
        self.low.process(block, len);
        self.high.process(block, len);
    }

    pub fn reset(&mut self) {
        self.low.reset();
        self.high.reset();
    }
}
