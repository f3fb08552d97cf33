//! Smoothed gain stage.

use coneko_core::{db_to_gain, ProcessSpec, SmoothedValue};

/// Multiplies every channel by a gain ramped in the linear domain.
pub struct GainStage {
    gain: SmoothedValue,
}

impl GainStage {
    pub fn new(spec: &ProcessSpec, smoothing_secs: f64) -> Self {
        Self {
            gain: SmoothedValue::new(1.0, smoothing_secs, spec.sample_rate),
        }
    }

    pub fn prepare(&mut self, spec: &ProcessSpec, smoothing_secs: f64) {
        self.gain.set_ramp(smoothing_secs, spec.sample_rate);
        self.gain.set_immediate(self.gain.target());
    }

    #[inline]
    pub fn set_gain_db(&mut self, db: f32) {
        if !db.is_nan() {
            self.gain.set_target(db_to_gain(db));
        }
    }

    #[inline]
    pub fn set_gain_linear(&mut self, gain: f32) {
        if gain.is_finite() {
            self.gain.set_target(gain.max(0.0));
        }
    }

    /// Target gain, linear.
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.target()
    }

    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C], len: usize) {
        if !self.gain.is_smoothing() {
            let g = self.gain.current();
            if g == 1.0 {
                return;
            }
            for channel in block.iter_mut() {
                for sample in channel.as_mut()[..len].iter_mut() {
                    *sample *= g;
                }
            }
            return;
        }

        for i in 0..len {
            let g = self.gain.next_value();
            for channel in block.iter_mut() {
                channel.as_mut()[i] *= g;
            }
        }
    }

    pub fn reset(&mut self) {
        self.gain.set_immediate(self.gain.target());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_is_identity() {
        let mut stage = GainStage::new(&ProcessSpec::default(), 0.05);
        let mut block = [[0.3f32, -0.2], [0.1, 0.0]];
        stage.process(&mut block, 2);
        assert_eq!(block, [[0.3, -0.2], [0.1, 0.0]]);
    }

    #[test]
    fn test_db_gain_applied_to_all_channels() {
        let mut stage = GainStage::new(&ProcessSpec::default(), 0.0);
        stage.set_gain_db(-6.0);
        let mut block = [[1.0f32; 3], [0.5; 3]];
        stage.process(&mut block, 3);
        let g = db_to_gain(-6.0);
        assert_eq!(block, [[g; 3], [0.5 * g; 3]]);
    }

    #[test]
    fn test_floor_mutes() {
        let mut stage = GainStage::new(&ProcessSpec::default(), 0.0);
        stage.set_gain_db(-150.0);
        let mut block = [[1.0f32; 2]];
        stage.process(&mut block, 2);
        assert_eq!(block, [[0.0; 2]]);
    }

    #[test]
    fn test_ramp_is_shared_across_channels() {
        let mut stage = GainStage::new(&ProcessSpec::new(1000.0, 8, 2), 0.004);
        stage.set_gain_linear(0.0);
        let mut block = [[1.0f32; 4], [1.0; 4]];
        stage.process(&mut block, 4);
        assert_eq!(block[0], block[1]);
        assert!((block[0][0] - 0.75).abs() < 1e-6);
        assert_eq!(block[0][3], 0.0);
    }
}
