//! Parameter ranges with skewed normalisation for host automation.
//!
//! Hosts automate parameters in normalised `0.0..=1.0` space. A skew factor
//! bends that mapping so a chosen centre value sits at normalised 0.5.
//!
//! # Example
//!
//! ```
//! use coneko_core::ParameterRange;
//!
//! // Gain: -72..36 dB, 0.1 dB steps, 0 dB at the midpoint of the control
//! let gain = ParameterRange::new(-72.0, 36.0, 0.1, 0.0).with_centre(0.0);
//!
//! assert!((gain.from_normalised(0.5) - 0.0).abs() < 1e-3);
//! assert!((gain.to_normalised(0.0) - 0.5).abs() < 1e-4);
//! ```

/// Value range of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
    /// Snapping interval in real units; 0 disables snapping.
    pub step: f32,
    /// Normalisation exponent; 1 is linear, < 1 gives more resolution at
    /// the top of the range, > 1 more at the bottom.
    pub skew: f32,
    pub default: f32,
}

impl ParameterRange {
    /// Linear range. `default` is clamped into `[min, max]`.
    pub fn new(min: f32, max: f32, step: f32, default: f32) -> Self {
        debug_assert!(max > min, "max must be greater than min");

        Self {
            min,
            max,
            step: step.max(0.0),
            skew: 1.0,
            default: default.clamp(min, max),
        }
    }

    /// On/off parameter stored as 0.0 / 1.0.
    pub fn toggle(default_on: bool) -> Self {
        Self::new(0.0, 1.0, 1.0, if default_on { 1.0 } else { 0.0 })
    }

    pub fn with_skew(mut self, skew: f32) -> Self {
        if skew.is_finite() && skew > 0.0 {
            self.skew = skew;
        }
        self
    }

    /// Choose the skew so that `centre` maps to normalised 0.5.
    ///
    /// `skew = ln(0.5) / ln((centre - min) / (max - min))`
    pub fn with_centre(self, centre: f32) -> Self {
        let proportion = (centre - self.min) / self.span();
        if proportion <= 0.0 || proportion >= 1.0 {
            return self;
        }
        self.with_skew(0.5f32.ln() / proportion.ln())
    }

    #[inline]
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Clamp to the range. NaN maps to the default.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp, then round to the nearest step.
    pub fn snap(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        if self.step <= 0.0 {
            return value;
        }
        let steps = ((value - self.min) / self.step + 0.5).floor();
        self.clamp(self.min + steps * self.step)
    }

    /// Real value to normalised `0.0..=1.0`.
    pub fn to_normalised(&self, value: f32) -> f32 {
        let proportion = ((self.clamp(value) - self.min) / self.span()).clamp(0.0, 1.0);
        if self.skew == 1.0 || proportion <= 0.0 {
            return proportion;
        }
        (proportion.ln() * self.skew).exp()
    }

    /// Normalised `0.0..=1.0` to a real value. Not snapped.
    pub fn from_normalised(&self, normalised: f32) -> f32 {
        let mut proportion = if normalised.is_nan() {
            self.to_normalised(self.default)
        } else {
            normalised.clamp(0.0, 1.0)
        };
        if self.skew != 1.0 && proportion > 0.0 {
            proportion = (proportion.ln() / self.skew).exp();
        }
        self.clamp(self.min + self.span() * proportion)
    }

    #[inline]
    pub fn default_normalised(&self) -> f32 {
        self.to_normalised(self.default)
    }
}

impl Default for ParameterRange {
    fn default() -> Self {
        Self::new(0.0, 1.0, 0.0, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        let abs_diff = (a - b).abs();
        let max_val = a.abs().max(b.abs());

        if max_val < 1.0 {
            abs_diff < 0.0001
        } else {
            abs_diff / max_val < 0.0001
        }
    }

    #[test]
    fn test_linear_mapping() {
        let range = ParameterRange::new(0.0, 100.0, 1.0, 100.0);

        assert!(approx_eq(range.to_normalised(0.0), 0.0));
        assert!(approx_eq(range.to_normalised(25.0), 0.25));
        assert!(approx_eq(range.from_normalised(1.0), 100.0));
        assert!(approx_eq(range.default_normalised(), 1.0));
    }

    #[test]
    fn test_centre_skew_places_centre_at_half() {
        let decay = ParameterRange::new(0.1, 8.0, 0.01, 3.0).with_centre(3.0);

        assert!(decay.skew < 1.0);
        assert!(approx_eq(decay.to_normalised(3.0), 0.5));
        assert!(approx_eq(decay.from_normalised(0.5), 3.0));
        assert!(approx_eq(decay.from_normalised(0.0), 0.1));
        assert!(approx_eq(decay.from_normalised(1.0), 8.0));
    }

    #[test]
    fn test_gain_centre_skews_toward_bottom() {
        let gain = ParameterRange::new(-72.0, 36.0, 0.1, 0.0).with_centre(0.0);
        assert!(gain.skew > 1.0);
        assert!(approx_eq(gain.to_normalised(0.0), 0.5));
    }

    #[test]
    fn test_degenerate_centre_keeps_linear() {
        let range = ParameterRange::new(0.0, 100.0, 1.0, 0.0).with_centre(0.0);
        assert_eq!(range.skew, 1.0);
        let range = ParameterRange::new(0.0, 100.0, 1.0, 0.0).with_centre(50.0);
        assert!(approx_eq(range.skew, 1.0));
    }

    #[test]
    fn test_clamp_and_nan() {
        let range = ParameterRange::new(-24.0, 24.0, 0.1, 0.0);
        assert_eq!(range.clamp(100.0), 24.0);
        assert_eq!(range.clamp(-100.0), -24.0);
        assert_eq!(range.clamp(f32::NAN), 0.0);
        assert_eq!(range.clamp(f32::INFINITY), 24.0);
        assert!(range.contains(0.0));
        assert!(!range.contains(24.5));
    }

    #[test]
    fn test_snap() {
        let range = ParameterRange::new(0.0, 1000.0, 1.0, 0.0);
        assert_eq!(range.snap(12.4), 12.0);
        assert_eq!(range.snap(12.6), 13.0);
        assert_eq!(range.snap(2000.0), 1000.0);

        let continuous = ParameterRange::new(0.0, 1.0, 0.0, 0.0);
        assert_eq!(continuous.snap(0.123), 0.123);
    }

    #[test]
    fn test_toggle() {
        let toggle = ParameterRange::toggle(true);
        assert_eq!(toggle.default, 1.0);
        assert_eq!(toggle.snap(0.4), 0.0);
        assert_eq!(toggle.snap(0.6), 1.0);
    }

    proptest! {
        #[test]
        fn normalised_round_trip(value in 0.0f32..1000.0) {
            let range = ParameterRange::new(0.0, 1000.0, 0.0, 0.0).with_skew(0.5);
            let back = range.from_normalised(range.to_normalised(value));
            prop_assert!((back - value).abs() < 0.05, "{} -> {}", value, back);
        }

        #[test]
        fn normalised_stays_in_unit_interval(value in -1.0e6f32..1.0e6) {
            let range = ParameterRange::new(20.0, 20000.0, 1.0, 20000.0).with_centre(2000.0);
            let n = range.to_normalised(value);
            prop_assert!((0.0..=1.0).contains(&n));
        }
    }
}
