//! Two-stage convolution for long impulse responses.
//!
//! Cost of a uniformly partitioned convolver grows with `ir_len / block`,
//! which is too much for a multi-second IR at small host blocks. Here only
//! the head of the IR runs at the host partition size:
//!
//! ```text
//! IR:   [ 0 .. T )      [ T .. 2T )        [ 2T .. len )
//!       head, block H   first tail, H      tail, block T
//!       direct          one period late    two periods late, spread out
//! ```
//!
//! `T` is the tail partition size. The first tail segment is convolved one
//! head block at a time and its output mixed in one period later. The rest
//! is convolved at block `T`: a finished period is transformed at the period
//! boundary, its spectral products are spread over the head blocks of the
//! following period, and the result is mixed in the period after that. No
//! single call does more than a bounded slice of the work, and the output
//! matches a direct convolution with no added latency.

use super::partitioned::{
    complex_multiply_accumulate, transform_segments, FftPair, PartitionedConvolver,
};
use realfft::FftError;
use rustfft::num_complex::Complex32;

/// Smallest tail partition.
const MIN_TAIL_BLOCK_SIZE: usize = 4096;

/// Tail partitions are this many head partitions long.
const TAIL_BLOCK_RATIO: usize = 16;

/// Tail partition size used with a given head partition size.
pub(crate) fn tail_partition_size(head_block_size: usize) -> usize {
    (head_block_size.max(1) * TAIL_BLOCK_RATIO)
        .next_power_of_two()
        .max(MIN_TAIL_BLOCK_SIZE)
}

/// FFT plans shared by every channel of a kernel.
#[derive(Clone)]
pub(crate) struct StagePlans {
    head: FftPair,
    tail: FftPair,
}

impl StagePlans {
    pub(crate) fn plan(head_block_size: usize) -> Self {
        Self::with_sizes(head_block_size, tail_partition_size(head_block_size))
    }

    /// Both sizes must be powers of two with `tail >= head`.
    pub(crate) fn with_sizes(head_block_size: usize, tail_block_size: usize) -> Self {
        debug_assert!(head_block_size.is_power_of_two() && tail_block_size.is_power_of_two());
        debug_assert!(tail_block_size >= head_block_size);
        Self {
            head: FftPair::plan(2 * head_block_size),
            tail: FftPair::plan(2 * tail_block_size),
        }
    }

    #[inline]
    fn head_block_size(&self) -> usize {
        self.head.size() / 2
    }

    #[inline]
    fn tail_block_size(&self) -> usize {
        self.tail.size() / 2
    }
}

/// Uniformly partitioned convolver that takes whole blocks only and splits
/// the work for each block into [`begin`](Self::begin),
/// [`advance`](Self::advance) and [`finish`](Self::finish).
struct DeferredConvolver {
    block_size: usize,
    fft: FftPair,
    fft_buffer: Vec<f32>,
    scratch: Vec<Complex32>,
    segments: Vec<Vec<Complex32>>,
    segments_ir: Vec<Vec<Complex32>>,
    conv: Vec<Complex32>,
    overlap: Vec<f32>,
    current: usize,
    next_segment: usize,
    pending: bool,
}

impl DeferredConvolver {
    fn new(ir: &[f32], gain: f32, fft: FftPair) -> Result<Self, FftError> {
        let block_size = fft.size() / 2;
        let bins = fft.complex_len();
        let segments_ir = transform_segments(ir, gain, block_size, &fft)?;
        let seg_count = segments_ir.len();

        Ok(Self {
            block_size,
            fft_buffer: vec![0.0; fft.size()],
            scratch: vec![Complex32::default(); fft.scratch_len()],
            fft,
            segments: vec![vec![Complex32::default(); bins]; seg_count],
            segments_ir,
            conv: vec![Complex32::default(); bins],
            overlap: vec![0.0; block_size],
            current: 0,
            next_segment: 0,
            pending: false,
        })
    }

    #[inline]
    fn segment_count(&self) -> usize {
        self.segments_ir.len()
    }

    /// Transform a full input block and start accumulating its output.
    fn begin(&mut self, block: &[f32]) {
        debug_assert_eq!(block.len(), self.block_size);
        self.fft_buffer[..self.block_size].copy_from_slice(block);
        self.fft_buffer[self.block_size..].fill(0.0);
        if self
            .fft
            .forward(
                &mut self.fft_buffer,
                &mut self.segments[self.current],
                &mut self.scratch,
            )
            .is_err()
        {
            self.segments[self.current].fill(Complex32::default());
        }
        self.conv.fill(Complex32::default());
        self.next_segment = 0;
        self.pending = true;
    }

    /// Accumulate up to `count` more spectral products.
    fn advance(&mut self, count: usize) {
        if !self.pending {
            return;
        }
        let seg_count = self.segment_count();
        let end = (self.next_segment + count).min(seg_count);
        for i in self.next_segment..end {
            let index_audio = (self.current + i) % seg_count;
            complex_multiply_accumulate(
                &mut self.conv,
                &self.segments_ir[i],
                &self.segments[index_audio],
            );
        }
        self.next_segment = end;
    }

    /// Complete the pending block into `output` (`block_size` samples).
    /// Without a pending block `output` is left as is.
    fn finish(&mut self, output: &mut [f32]) {
        if !self.pending {
            return;
        }
        self.advance(self.segment_count());
        self.pending = false;

        let scale = 1.0 / self.fft.size() as f32;
        if self
            .fft
            .inverse(&mut self.conv, &mut self.fft_buffer, &mut self.scratch)
            .is_err()
        {
            output.fill(0.0);
            return;
        }

        let (head, tail) = self.fft_buffer.split_at(self.block_size);
        for ((out, &y), &overlap) in output.iter_mut().zip(head).zip(&self.overlap) {
            *out = y * scale + overlap;
        }
        for (dst, &src) in self.overlap.iter_mut().zip(tail) {
            *dst = src * scale;
        }

        let seg_count = self.segment_count();
        self.current = if self.current > 0 {
            self.current - 1
        } else {
            seg_count - 1
        };
    }

    fn reset(&mut self) {
        for segment in &mut self.segments {
            segment.fill(Complex32::default());
        }
        self.conv.fill(Complex32::default());
        self.fft_buffer.fill(0.0);
        self.overlap.fill(0.0);
        self.current = 0;
        self.next_segment = 0;
        self.pending = false;
    }
}

/// Single-channel zero-latency convolver for IRs of any length.
pub(crate) struct TwoStageConvolver {
    head: PartitionedConvolver,
    tail0: Option<PartitionedConvolver>,
    tail0_output: Vec<f32>,
    tail0_precalculated: Vec<f32>,
    tail: Option<DeferredConvolver>,
    tail_output: Vec<f32>,
    tail_precalculated: Vec<f32>,
    tail_input: Vec<f32>,
    tail_input_fill: usize,
    precalculated_pos: usize,
    /// Spectral products of the deferred tail done per head block.
    tail_segments_per_step: usize,
    head_block_size: usize,
    tail_block_size: usize,
}

impl TwoStageConvolver {
    pub(crate) fn new(ir: &[f32], gain: f32, plans: &StagePlans) -> Result<Self, FftError> {
        let head_block_size = plans.head_block_size();
        let tail_block_size = plans.tail_block_size();
        let split = move |from: usize, to: usize| &ir[from.min(ir.len())..to.min(ir.len())];

        let head = PartitionedConvolver::new(
            split(0, tail_block_size),
            gain,
            head_block_size,
            plans.head.clone(),
        )?;

        let tail0 = if ir.len() > tail_block_size {
            Some(PartitionedConvolver::new(
                split(tail_block_size, 2 * tail_block_size),
                gain,
                head_block_size,
                plans.head.clone(),
            )?)
        } else {
            None
        };

        let tail = if ir.len() > 2 * tail_block_size {
            Some(DeferredConvolver::new(
                split(2 * tail_block_size, ir.len()),
                gain,
                plans.tail.clone(),
            )?)
        } else {
            None
        };

        // Head blocks in a period that only advance; the boundary block finishes
        let steps_per_period = (tail_block_size / head_block_size).saturating_sub(1).max(1);
        let tail_segments_per_step = tail
            .as_ref()
            .map_or(0, |tail| tail.segment_count().div_ceil(steps_per_period));

        let buffer = |needed: bool| if needed { vec![0.0; tail_block_size] } else { Vec::new() };
        let has_tail0 = tail0.is_some();
        let has_tail = tail.is_some();

        Ok(Self {
            head,
            tail0,
            tail0_output: buffer(has_tail0),
            tail0_precalculated: buffer(has_tail0),
            tail,
            tail_output: buffer(has_tail),
            tail_precalculated: buffer(has_tail),
            tail_input: buffer(has_tail0),
            tail_input_fill: 0,
            precalculated_pos: 0,
            tail_segments_per_step,
            head_block_size,
            tail_block_size,
        })
    }

    /// Upper bound on the spectral products one head block triggers, summed
    /// over every stage.
    pub(crate) fn products_per_block(&self) -> usize {
        self.head.segment_count()
            + self.tail0.as_ref().map_or(0, |tail0| tail0.segment_count())
            + self.tail_segments_per_step
    }

    /// Convolve `input` into `output`. Lengths must match; any length works.
    pub(crate) fn process(&mut self, input: &[f32], output: &mut [f32]) {
        self.head.process(input, output);

        let Some(tail0) = self.tail0.as_mut() else {
            return;
        };

        let head_block_size = self.head_block_size;
        let tail_block_size = self.tail_block_size;
        let mut processed = 0;

        while processed < input.len() {
            let processing = (input.len() - processed)
                .min(head_block_size - self.tail_input_fill % head_block_size);
            let range = processed..processed + processing;
            let pos = self.precalculated_pos;

            for (out, &tail) in output[range.clone()]
                .iter_mut()
                .zip(&self.tail0_precalculated[pos..pos + processing])
            {
                *out += tail;
            }
            if !self.tail_precalculated.is_empty() {
                for (out, &tail) in output[range.clone()]
                    .iter_mut()
                    .zip(&self.tail_precalculated[pos..pos + processing])
                {
                    *out += tail;
                }
            }
            self.precalculated_pos += processing;

            let fill = self.tail_input_fill;
            self.tail_input[fill..fill + processing].copy_from_slice(&input[range]);
            self.tail_input_fill += processing;

            if self.tail_input_fill % head_block_size == 0 {
                let offset = self.tail_input_fill - head_block_size;
                tail0.process(
                    &self.tail_input[offset..offset + head_block_size],
                    &mut self.tail0_output[offset..offset + head_block_size],
                );

                if let Some(tail) = self.tail.as_mut() {
                    if self.tail_input_fill == tail_block_size {
                        tail.finish(&mut self.tail_output);
                        std::mem::swap(&mut self.tail_precalculated, &mut self.tail_output);
                        tail.begin(&self.tail_input);
                    } else {
                        tail.advance(self.tail_segments_per_step);
                    }
                }

                if self.tail_input_fill == tail_block_size {
                    std::mem::swap(&mut self.tail0_precalculated, &mut self.tail0_output);
                    self.tail_input_fill = 0;
                    self.precalculated_pos = 0;
                }
            }
            processed += processing;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.head.reset();
        if let Some(tail0) = self.tail0.as_mut() {
            tail0.reset();
        }
        if let Some(tail) = self.tail.as_mut() {
            tail.reset();
        }
        for buffer in [
            &mut self.tail0_output,
            &mut self.tail0_precalculated,
            &mut self.tail_output,
            &mut self.tail_precalculated,
            &mut self.tail_input,
        ] {
            buffer.fill(0.0);
        }
        self.tail_input_fill = 0;
        self.precalculated_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn direct_convolution(input: &[f32], ir: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0f32; input.len()];
        for (n, y) in out.iter_mut().enumerate() {
            for (k, &h) in ir.iter().enumerate().take(n + 1) {
                *y += h * input[n - k];
            }
        }
        out
    }

    fn random(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    /// Feed `input` in irregular chunk sizes.
    fn run(conv: &mut TwoStageConvolver, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        let mut start = 0;
        for len in [1usize, 37, 16, 5, 300, 64, 3].iter().cycle() {
            if start >= input.len() {
                break;
            }
            let end = (start + len).min(input.len());
            conv.process(&input[start..end], &mut output[start..end]);
            start = end;
        }
        output
    }

    fn assert_close(output: &[f32], expected: &[f32]) {
        for (i, (&y, &e)) in output.iter().zip(expected).enumerate() {
            assert!((y - e).abs() < 1e-3, "sample {i}: {y} vs {e}");
        }
    }

    #[test]
    fn test_tail_partition_size() {
        assert_eq!(tail_partition_size(64), 4096);
        assert_eq!(tail_partition_size(256), 4096);
        assert_eq!(tail_partition_size(512), 8192);
        assert_eq!(tail_partition_size(0), 4096);
    }

    #[test]
    fn test_all_stages_match_direct_convolution() {
        // 16-sample head, 64-sample tail: 700 samples reach deep into the
        // deferred tail, which then spreads 9 segments over 3 head blocks
        let plans = StagePlans::with_sizes(16, 64);
        let ir = random(700, 1);
        let input = random(3000, 2);
        let mut conv = TwoStageConvolver::new(&ir, 1.0, &plans).unwrap();
        assert!(conv.tail.is_some());
        assert_eq!(conv.tail_segments_per_step, 3);

        assert_close(&run(&mut conv, &input), &direct_convolution(&input, &ir));
    }

    #[test]
    fn test_each_stage_boundary_matches_direct_convolution() {
        let plans = StagePlans::with_sizes(16, 64);
        let input = random(1200, 3);
        for len in [1, 63, 64, 65, 100, 128, 129, 200] {
            let ir = random(len, len as u64);
            let mut conv = TwoStageConvolver::new(&ir, 1.0, &plans).unwrap();
            assert_eq!(conv.tail0.is_some(), len > 64, "len {len}");
            assert_eq!(conv.tail.is_some(), len > 128, "len {len}");
            assert_close(&run(&mut conv, &input), &direct_convolution(&input, &ir));
        }
    }

    #[test]
    fn test_sparse_long_ir_at_host_sizes() {
        // Taps in the head, the first tail segment and the deferred tail
        let plans = StagePlans::plan(64);
        let mut ir = vec![0.0; 30_000];
        ir[100] = 1.0;
        ir[5_000] = 0.5;
        ir[20_000] = 0.25;
        let mut conv = TwoStageConvolver::new(&ir, 1.0, &plans).unwrap();

        let mut input = vec![0.0; 32_768];
        input[7] = 1.0;
        let mut output = vec![0.0; input.len()];
        for (x, y) in input.chunks(64).zip(output.chunks_mut(64)) {
            conv.process(x, y);
        }

        for (i, &y) in output.iter().enumerate() {
            let expected = match i {
                107 => 1.0,
                5_007 => 0.5,
                20_007 => 0.25,
                _ => 0.0,
            };
            assert!((y - expected).abs() < 1e-4, "sample {i}: {y}");
        }
    }

    #[test]
    fn test_work_per_block_is_bounded() {
        let plans = StagePlans::plan(64);
        let short = TwoStageConvolver::new(&vec![0.1; 48_000], 1.0, &plans).unwrap();
        let long = TwoStageConvolver::new(&vec![0.1; 8 * 48_000], 1.0, &plans).unwrap();

        // Head and first tail segment: 64 partitions each
        assert_eq!(short.products_per_block(), 64 + 64 + 1);
        // 92 deferred segments over 63 head blocks
        assert_eq!(long.products_per_block(), 64 + 64 + 2);
    }

    #[test]
    fn test_gain_applies_to_every_stage() {
        let plans = StagePlans::with_sizes(16, 64);
        let mut ir = vec![0.0; 300];
        ir[0] = 1.0;
        ir[80] = 1.0;
        ir[250] = 1.0;
        let mut conv = TwoStageConvolver::new(&ir, 0.5, &plans).unwrap();

        let mut input = vec![0.0; 400];
        input[0] = 1.0;
        let output = run(&mut conv, &input);
        for i in [0, 80, 250] {
            assert!((output[i] - 0.5).abs() < 1e-5, "sample {i}: {}", output[i]);
        }
    }

    #[test]
    fn test_reset_clears_every_stage() {
        let plans = StagePlans::with_sizes(16, 64);
        let ir = random(500, 4);
        let mut conv = TwoStageConvolver::new(&ir, 1.0, &plans).unwrap();
        run(&mut conv, &random(333, 5));
        conv.reset();

        let output = run(&mut conv, &vec![0.0; 1000]);
        assert!(output.iter().all(|&y| y.abs() < 1e-6));

        // And convolves from a clean start afterwards
        let input = random(900, 6);
        assert_close(&run(&mut conv, &input), &direct_convolution(&input, &ir));
    }
}
