//! Phase vocoder for offline time-stretching.
//!
//! ## Algorithm Overview
//!
//! 1. **Analysis**: Hann-windowed frames centred every `hop * ratio` input
//!    samples (fractional positions rounded per frame)
//! 2. **Frequency estimation**: per-bin instantaneous frequency from the phase
//!    advance between consecutive analysis frames
//! 3. **Synthesis**: phases re-accumulated at the fixed synthesis hop,
//!    magnitudes kept, inverse FFT, windowed overlap-add
//! 4. **Normalisation**: output divided by the summed squared window so the
//!    envelope of the input survives the stretch

use super::{stretched_len, FftSize, TimeStretcher};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const TWO_PI: f32 = 2.0 * PI;

/// Below this the overlap-add weight is treated as zero.
const MIN_WINDOW_SUM: f32 = 1e-3;

/// Wrap phase to [-PI, PI].
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - TWO_PI * (phase / TWO_PI).round()
}

pub struct PhaseVocoder {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    frame: Vec<Complex32>,
    scratch: Vec<Complex32>,
    /// Analysis phase of the previous frame, per bin
    last_phase: Vec<f32>,
    /// Accumulated synthesis phase, per bin
    synth_phase: Vec<f32>,
    /// Expected phase advance per sample, per bin
    bin_omega: Vec<f32>,
}

impl PhaseVocoder {
    pub fn new(fft_size: FftSize) -> Self {
        let size = fft_size.size();
        let num_bins = size / 2 + 1;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            fft_size: size,
            hop: fft_size.hop_size(),
            window: (0..size)
                .map(|i| 0.5 * (1.0 - (TWO_PI * i as f32 / size as f32).cos()))
                .collect(),
            forward,
            inverse,
            frame: vec![Complex32::default(); size],
            scratch: vec![Complex32::default(); scratch_len],
            last_phase: vec![0.0; num_bins],
            synth_phase: vec![0.0; num_bins],
            bin_omega: (0..num_bins)
                .map(|k| TWO_PI * k as f32 / size as f32)
                .collect(),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn reset(&mut self) {
        self.last_phase.fill(0.0);
        self.synth_phase.fill(0.0);
    }

    /// Load the windowed frame centred on input sample `centre`.
    fn analyse(&mut self, samples: &[f32], centre: isize) {
        let start = centre - (self.fft_size / 2) as isize;
        for (i, (bin, &w)) in self.frame.iter_mut().zip(&self.window).enumerate() {
            let pos = start + i as isize;
            let x = if pos >= 0 && (pos as usize) < samples.len() {
                samples[pos as usize]
            } else {
                0.0
            };
            *bin = Complex32::new(x * w, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.frame, &mut self.scratch);
    }

    /// Replace analysis phases with synthesis phases. `advance` is how far
    /// the analysis frame moved since the previous one; `None` on the first
    /// frame.
    fn propagate(&mut self, advance: Option<usize>) {
        let num_bins = self.fft_size / 2 + 1;
        let hop = self.hop as f32;

        for k in 0..num_bins {
            let magnitude = self.frame[k].norm();
            let phase = self.frame[k].arg();
            let omega = self.bin_omega[k];

            self.synth_phase[k] = match advance {
                None => phase,
                Some(0) => wrap_phase(self.synth_phase[k] + omega * hop),
                Some(delta) => {
                    let delta = delta as f32;
                    let deviation = wrap_phase(phase - self.last_phase[k] - omega * delta);
                    let true_freq = omega + deviation / delta;
                    wrap_phase(self.synth_phase[k] + true_freq * hop)
                }
            };
            self.last_phase[k] = phase;
            self.frame[k] = Complex32::from_polar(magnitude, self.synth_phase[k]);
        }

        // Conjugate symmetry for a real-valued result
        for k in 1..num_bins - 1 {
            self.frame[self.fft_size - k] = self.frame[k].conj();
        }
    }
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self::new(FftSize::default())
    }
}

impl TimeStretcher for PhaseVocoder {
    fn stretch(&mut self, samples: &[f32], ratio: f64) -> Vec<f32> {
        if !(ratio.is_finite() && ratio > 0.0) || ratio == 1.0 || samples.is_empty() {
            return samples.to_vec();
        }
        self.reset();

        let out_len = stretched_len(samples.len(), ratio);
        let n = self.fft_size;
        let half = n / 2;
        let analysis_hop = self.hop as f64 * ratio;
        let frames = (out_len + half).div_ceil(self.hop) + 1;

        // Frame m lands at output position m * hop - half; offset by half.
        let mut output = vec![0.0f32; frames * self.hop + n];
        let mut weight = vec![0.0f32; output.len()];
        let scale = 1.0 / n as f32;
        let mut last_centre = 0isize;

        for m in 0..frames {
            let centre = (m as f64 * analysis_hop).round() as isize;
            self.analyse(samples, centre);
            let advance = (m > 0).then(|| (centre - last_centre) as usize);
            self.propagate(advance);
            last_centre = centre;

            self.inverse
                .process_with_scratch(&mut self.frame, &mut self.scratch);

            let offset = m * self.hop;
            for (i, &w) in self.window.iter().enumerate() {
                output[offset + i] += self.frame[i].re * scale * w;
                weight[offset + i] += w * w;
            }
        }

        (0..out_len)
            .map(|j| {
                let w = weight[j + half];
                if w > MIN_WINDOW_SUM {
                    output[j + half] / w
                } else {
                    output[j + half]
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SR: f32 = 48000.0;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (TWO_PI * freq * i as f32 / SR).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    #[test]
    fn test_wrap_phase() {
        assert!((wrap_phase(3.0 * PI) - PI).abs() < 1e-5 || (wrap_phase(3.0 * PI) + PI).abs() < 1e-5);
        assert!((wrap_phase(0.5) - 0.5).abs() < 1e-6);
        assert!((wrap_phase(-TWO_PI - 0.25) + 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_unity_ratio_is_copy() {
        let mut pv = PhaseVocoder::new(FftSize::Small);
        let input = sine(440.0, 1000);
        assert_eq!(pv.stretch(&input, 1.0), input);
        assert_eq!(pv.stretch(&input, -2.0), input);
        assert!(pv.stretch(&[], 0.5).is_empty());
    }

    #[test]
    fn test_output_length_is_exact() {
        let mut pv = PhaseVocoder::new(FftSize::Small);
        let input = sine(440.0, 10_001);
        assert_eq!(pv.stretch(&input, 2.0).len(), 5001);
        assert_eq!(pv.stretch(&input, 0.5).len(), 20_002);
        assert_eq!(pv.stretch(&input, 1.3).len(), 7693);
    }

    #[test]
    fn test_lengthening_preserves_pitch_and_level() {
        let mut pv = PhaseVocoder::new(FftSize::Large);
        let input = sine(440.0, 24_000);
        let output = pv.stretch(&input, 0.5);
        assert_eq!(output.len(), 48_000);

        // Away from the edges: 440 Hz over 0.5 s = 440 crossings
        let middle = &output[12_000..36_000];
        let crossings = zero_crossings(middle) as f32;
        assert!((crossings - 440.0).abs() < 440.0 * 0.05, "crossings {crossings}");

        let expected = rms(&input[6000..18_000]);
        let actual = rms(middle);
        assert!((actual / expected - 1.0).abs() < 0.2, "rms {actual} vs {expected}");
    }

    #[test]
    fn test_shortening_preserves_pitch() {
        let mut pv = PhaseVocoder::new(FftSize::Large);
        // Bin-centred at this size
        let freq = SR / 2048.0 * 43.0;
        let input = sine(freq, 96_000);
        let output = pv.stretch(&input, 2.0);
        assert_eq!(output.len(), 48_000);

        let middle = &output[12_000..36_000];
        let crossings = zero_crossings(middle) as f32;
        assert!((crossings - freq).abs() < freq * 0.05, "crossings {crossings}");
    }

    #[test]
    fn test_decay_envelope_survives() {
        let mut rng = StdRng::seed_from_u64(11);
        let len = 48_000;
        let input: Vec<f32> = (0..len)
            .map(|i| rng.gen_range(-1.0..1.0) * (-5.0 * i as f32 / len as f32).exp())
            .collect();

        let mut pv = PhaseVocoder::new(FftSize::Medium);
        let output = pv.stretch(&input, 0.5);
        let quarter = output.len() / 4;
        let early = rms(&output[..quarter]);
        let late = rms(&output[3 * quarter..]);
        assert!(early > late * 4.0, "early {early} late {late}");
        assert!(output.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_calls_are_independent() {
        let mut pv = PhaseVocoder::new(FftSize::Small);
        let a = sine(300.0, 5000);
        let b = sine(2000.0, 5000);

        let first = pv.stretch(&a, 0.8);
        pv.stretch(&b, 1.7);
        let again = pv.stretch(&a, 0.8);
        assert_eq!(first, again);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_round_trip_length(len in 0usize..6000, ratio in 0.5f64..2.0) {
            let mut pv = PhaseVocoder::new(FftSize::Small);
            let input = vec![0.1f32; len];
            let there = pv.stretch(&input, ratio);
            let back = pv.stretch(&there, 1.0 / ratio);
            prop_assert!((back.len() as isize - len as isize).abs() <= 1);
        }
    }
}
