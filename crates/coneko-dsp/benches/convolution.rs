//! Benchmarks for the real-time convolution path.
//!
//! Run with: cargo bench -p coneko-dsp
//!
//! Reference deadlines at 48kHz:
//!   - 64 samples  = 1.33ms
//!   - 256 samples = 5.33ms
//!   - 512 samples = 10.67ms

use std::hint::black_box;
use std::sync::Arc;

use coneko_core::{AudioBuffer, ProcessSpec, ProcessorConfig};
use coneko_dsp::{ConvolutionEngine, FilterStage};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const BLOCK_SIZES: &[usize] = &[64, 256, 512];
const SAMPLE_RATE: f64 = 48_000.0;

/// Exponentially decaying pseudo-noise, `secs` long.
fn decaying_ir(secs: f64) -> Arc<AudioBuffer> {
    let len = (secs * SAMPLE_RATE) as usize;
    let mut state = 0x1234_5678u32;
    let channels = (0..2)
        .map(|_| {
            (0..len)
                .map(|i| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    let noise = state as f32 / u32::MAX as f32 * 2.0 - 1.0;
                    noise * (-6.0 * i as f32 / len as f32).exp()
                })
                .collect()
        })
        .collect();
    Arc::new(AudioBuffer::from_channels(channels, SAMPLE_RATE))
}

fn bench_convolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/convolution");

    for &size in BLOCK_SIZES {
        // 8 s is the longest DecayTime; at 64 samples it must stay well
        // inside the 1.33ms deadline
        for secs in [0.5, 2.0, 8.0] {
            let config = ProcessorConfig {
                spec: ProcessSpec::new(SAMPLE_RATE, size, 2),
                crossfade_secs: 0.0,
                ..ProcessorConfig::default()
            };
            let Ok(mut engine) = ConvolutionEngine::new(&config) else {
                continue;
            };
            engine.loader().load_kernel(decaying_ir(secs));

            let mut block = vec![vec![0.1f32; size]; 2];
            let id = BenchmarkId::new(format!("ir_{secs}s"), size);
            group.bench_with_input(id, &size, |b, &size| {
                b.iter(|| {
                    engine.process(black_box(&mut block[..]), size);
                    block[0][0]
                })
            });
        }
    }

    group.finish();
}

fn bench_shelves(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/shelves");

    for &size in BLOCK_SIZES {
        let spec = ProcessSpec::new(SAMPLE_RATE, size, 2);
        let mut filters = FilterStage::new(&spec);
        filters.set_low(200.0, 6.0);
        filters.set_high(4000.0, -6.0);

        let mut block = vec![vec![0.1f32; size]; 2];
        group.bench_with_input(BenchmarkId::new("low_high", size), &size, |b, &size| {
            b.iter(|| {
                filters.process(black_box(&mut block[..]), size);
                block[1][0]
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_convolution, bench_shelves);
criterion_main!(benches);
