//! Dry/wet blending.

use coneko_core::{ProcessSpec, SmoothedValue};

/// Holds a copy of the dry block and blends it back after the wet path:
/// `out = dry * (1 - m) + wet * m`, with `m` ramped per sample.
pub struct DryWetMixer {
    dry: Vec<Vec<f32>>,
    mix: SmoothedValue,
}

impl DryWetMixer {
    pub fn new(spec: &ProcessSpec, smoothing_secs: f64) -> Self {
        let mut mixer = Self {
            dry: Vec::new(),
            mix: SmoothedValue::new(1.0, smoothing_secs, spec.sample_rate),
        };
        mixer.prepare(spec, smoothing_secs);
        mixer
    }

    pub fn prepare(&mut self, spec: &ProcessSpec, smoothing_secs: f64) {
        self.dry = vec![vec![0.0; spec.max_block_size]; spec.channels];
        self.mix.set_ramp(smoothing_secs, spec.sample_rate);
        self.mix.set_immediate(self.mix.target());
    }

    /// Wet proportion, clamped to `0..=1`.
    #[inline]
    pub fn set_mix(&mut self, proportion: f32) {
        if proportion.is_finite() {
            self.mix.set_target(proportion.clamp(0.0, 1.0));
        }
    }

    #[inline]
    pub fn set_mix_percent(&mut self, percent: f32) {
        self.set_mix(percent / 100.0);
    }

    #[inline]
    pub fn mix(&self) -> f32 {
        self.mix.target()
    }

    /// Copy up to the prepared block size of each channel.
    pub fn push_dry<C: AsRef<[f32]>>(&mut self, block: &[C], len: usize) {
        for (dry, channel) in self.dry.iter_mut().zip(block.iter()) {
            let n = len.min(dry.len());
            dry[..n].copy_from_slice(&channel.as_ref()[..n]);
        }
    }

    /// Blend the stored dry block into `wet`.
    pub fn mix_wet<C: AsMut<[f32]>>(&mut self, wet: &mut [C], len: usize) {
        let channels = wet.len().min(self.dry.len());
        let len = len.min(self.dry.first().map_or(0, Vec::len));

        if !self.mix.is_smoothing() {
            let m = self.mix.current();
            if m == 1.0 {
                return;
            }
            if m == 0.0 {
                for (dry, channel) in self.dry.iter().zip(wet.iter_mut()) {
                    channel.as_mut()[..len].copy_from_slice(&dry[..len]);
                }
                return;
            }
        }

        for i in 0..len {
            let m = self.mix.next_value();
            for ch in 0..channels {
                let sample = &mut wet[ch].as_mut()[i];
                *sample = self.dry[ch][i] * (1.0 - m) + *sample * m;
            }
        }
    }

    pub fn reset(&mut self) {
        self.mix.set_immediate(self.mix.target());
        for dry in &mut self.dry {
            dry.fill(0.0);
        }
    }
}
