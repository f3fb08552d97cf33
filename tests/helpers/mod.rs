//! Shared test utilities for integration tests.

#![allow(dead_code)]

pub mod tolerances;

use coneko::prelude::*;
use std::sync::Once;

/// Standard sample rate for tests.
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard block size for tests.
pub const TEST_BLOCK_SIZE: usize = 512;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Stereo processor at the test rate with instant parameter changes and no
/// kernel crossfade, so output can be compared sample for sample.
pub fn test_processor() -> (ConekoProcessor, ConekoController) {
    init_tracing();
    ConekoProcessor::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .max_block_size(TEST_BLOCK_SIZE)
        .channels(2)
        .smoothing_time(0.0)
        .crossfade_time(0.0)
        .build()
        .expect("processor should build")
}

/// Import `ir`, wait for the rebuild and run one silent block so the new
/// kernel is installed.
pub fn load_ir(processor: &mut ConekoProcessor, controller: &ConekoController, ir: AudioBuffer) {
    controller.import_ir(ir).expect("import should queue");
    controller.flush().expect("worker should finish");
    process_silence(processor, TEST_BLOCK_SIZE);
    assert!(controller.is_kernel_current());
}

/// Run `num_samples` of stereo silence through the processor.
pub fn process_silence(processor: &mut ConekoProcessor, num_samples: usize) {
    let mut block = [vec![0.0f32; TEST_BLOCK_SIZE], vec![0.0f32; TEST_BLOCK_SIZE]];
    let mut done = 0;
    while done < num_samples {
        let n = (num_samples - done).min(TEST_BLOCK_SIZE);
        for channel in &mut block {
            channel[..n].fill(0.0);
        }
        let [left, right] = &mut block;
        processor.process(&mut [&mut left[..n], &mut right[..n]]);
        done += n;
    }
}

/// Feed `input` through the processor in host-sized blocks and collect the
/// output. Both channels receive their own input.
pub fn render(
    processor: &mut ConekoProcessor,
    input: &[Vec<f32>; 2],
    block_size: usize,
) -> [Vec<f32>; 2] {
    let mut output = input.clone();
    let len = output[0].len().min(output[1].len());
    let mut start = 0;
    while start < len {
        let end = (start + block_size).min(len);
        let [left, right] = &mut output;
        processor.process(&mut [&mut left[start..end], &mut right[start..end]]);
        start = end;
    }
    output
}

/// Exponentially decaying noise, reaching -60 dB at `decay_secs`, followed by
/// `tail_secs` of silence.
pub fn decaying_noise_ir(
    decay_secs: f64,
    tail_secs: f64,
    channels: usize,
    seed: u32,
) -> AudioBuffer {
    let body = (decay_secs * TEST_SAMPLE_RATE) as usize;
    let tail = (tail_secs * TEST_SAMPLE_RATE) as usize;
    let rate = 6.9078 / body as f64; // ln(1000)

    let data = (0..channels)
        .map(|ch| {
            let noise = generate_noise(body, seed.wrapping_add(ch as u32));
            let mut samples: Vec<f32> = noise
                .iter()
                .enumerate()
                .map(|(i, &n)| n * (-rate * i as f64).exp() as f32)
                .collect();
            samples.resize(body + tail, 0.0);
            samples
        })
        .collect();
    AudioBuffer::from_channels(data, TEST_SAMPLE_RATE)
}

/// Impulse at `position`.
pub fn generate_impulse(num_samples: usize, position: usize) -> Vec<f32> {
    let mut samples = vec![0.0; num_samples];
    if position < num_samples {
        samples[position] = 1.0;
    }
    samples
}

/// Generate a sine wave at the given frequency.
pub fn generate_sine(frequency: f32, amplitude: f32, num_samples: usize) -> Vec<f32> {
    let sr = TEST_SAMPLE_RATE as f32;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sr;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Deterministic white noise in [-1, 1] (simple LCG).
pub fn generate_noise(num_samples: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..num_samples)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            ((state >> 16) as f32 / 32768.0) - 1.0
        })
        .collect()
}

/// Calculate RMS (root mean square) of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}
