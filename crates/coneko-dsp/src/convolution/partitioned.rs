//! Uniformly partitioned overlap-add convolution with zero added latency.
//!
//! The impulse response is cut into segments of `block_size` samples and each
//! segment is transformed once at construction. Input is collected into a
//! block buffer; every call transforms the partially filled block, multiplies
//! it with the first IR segment and adds the pre-multiplied contribution of
//! all older input blocks, so output is available for every input sample as
//! soon as it arrives.
//!
//! Transforms are real-to-complex, so every spectrum holds
//! `block_size + 1` bins.

use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;
use std::sync::Arc;

#[inline]
pub(crate) fn complex_multiply_accumulate(
    result: &mut [Complex32],
    a: &[Complex32],
    b: &[Complex32],
) {
    for ((r, &x), &y) in result.iter_mut().zip(a).zip(b) {
        *r += x * y;
    }
}

/// Forward and inverse real transforms of one size, shared between channels.
#[derive(Clone)]
pub(crate) struct FftPair {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    size: usize,
}

impl FftPair {
    pub(crate) fn plan(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
            size,
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Bins in a half spectrum.
    #[inline]
    pub(crate) fn complex_len(&self) -> usize {
        self.size / 2 + 1
    }

    pub(crate) fn scratch_len(&self) -> usize {
        self.forward
            .get_scratch_len()
            .max(self.inverse.get_scratch_len())
    }

    /// Transform `input` (clobbered) into `output`.
    #[inline]
    pub(crate) fn forward(
        &self,
        input: &mut [f32],
        output: &mut [Complex32],
        scratch: &mut [Complex32],
    ) -> Result<(), FftError> {
        self.forward.process_with_scratch(input, output, scratch)
    }

    /// Unscaled inverse of `input` (clobbered) into `output`.
    #[inline]
    pub(crate) fn inverse(
        &self,
        input: &mut [Complex32],
        output: &mut [f32],
        scratch: &mut [Complex32],
    ) -> Result<(), FftError> {
        // DC and Nyquist of a real signal carry no imaginary part
        input[0].im = 0.0;
        if let Some(last) = input.last_mut() {
            last.im = 0.0;
        }
        self.inverse.process_with_scratch(input, output, scratch)
    }
}

/// Transform `ir` in `block_size` segments, each zero-padded to the FFT size
/// and scaled by `gain`.
pub(crate) fn transform_segments(
    ir: &[f32],
    gain: f32,
    block_size: usize,
    fft: &FftPair,
) -> Result<Vec<Vec<Complex32>>, FftError> {
    let mut scratch = vec![Complex32::default(); fft.scratch_len()];
    let mut fft_buffer = vec![0.0f32; fft.size()];

    ir.chunks(block_size)
        .map(|chunk| {
            fft_buffer.fill(0.0);
            for (dst, &src) in fft_buffer.iter_mut().zip(chunk) {
                *dst = src * gain;
            }
            let mut segment = vec![Complex32::default(); fft.complex_len()];
            fft.forward(&mut fft_buffer, &mut segment, &mut scratch)?;
            Ok(segment)
        })
        .collect()
}

/// Single-channel convolver. All buffers are allocated in [`new`](Self::new);
/// [`process`](Self::process) does not allocate.
pub(crate) struct PartitionedConvolver {
    block_size: usize,
    seg_count: usize,
    fft: FftPair,
    fft_buffer: Vec<f32>,
    scratch: Vec<Complex32>,
    segments: Vec<Vec<Complex32>>,
    segments_ir: Vec<Vec<Complex32>>,
    pre_multiplied: Vec<Complex32>,
    conv: Vec<Complex32>,
    overlap: Vec<f32>,
    input_buffer: Vec<f32>,
    input_fill: usize,
    current: usize,
}

impl PartitionedConvolver {
    /// `block_size` must be a power of two and `fft` must be planned for
    /// `2 * block_size`.
    pub(crate) fn new(
        ir: &[f32],
        gain: f32,
        block_size: usize,
        fft: FftPair,
    ) -> Result<Self, FftError> {
        debug_assert!(block_size.is_power_of_two());
        debug_assert_eq!(fft.size(), 2 * block_size);

        let bins = fft.complex_len();
        let segments_ir = transform_segments(ir, gain, block_size, &fft)?;
        let seg_count = segments_ir.len();

        Ok(Self {
            block_size,
            seg_count,
            fft_buffer: vec![0.0; fft.size()],
            scratch: vec![Complex32::default(); fft.scratch_len()],
            fft,
            segments: vec![vec![Complex32::default(); bins]; seg_count],
            segments_ir,
            pre_multiplied: vec![Complex32::default(); bins],
            conv: vec![Complex32::default(); bins],
            overlap: vec![0.0; block_size],
            input_buffer: vec![0.0; block_size],
            input_fill: 0,
            current: 0,
        })
    }

    /// Spectral products computed at the start of each block.
    #[inline]
    pub(crate) fn segment_count(&self) -> usize {
        self.seg_count
    }

    /// Convolve `input` into `output`. Lengths must match; any length works.
    pub(crate) fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());
        if self.seg_count == 0 {
            output.fill(0.0);
            return;
        }

        let block_size = self.block_size;
        let scale = 1.0 / self.fft.size() as f32;
        let mut processed = 0;

        while processed < output.len() {
            let was_empty = self.input_fill == 0;
            let processing = (output.len() - processed).min(block_size - self.input_fill);
            let pos = self.input_fill;

            self.input_buffer[pos..pos + processing]
                .copy_from_slice(&input[processed..processed + processing]);

            // Transform the (partial) input block, zero-padded to fft size
            self.fft_buffer[..block_size].copy_from_slice(&self.input_buffer);
            self.fft_buffer[block_size..].fill(0.0);
            if self
                .fft
                .forward(
                    &mut self.fft_buffer,
                    &mut self.segments[self.current],
                    &mut self.scratch,
                )
                .is_err()
            {
                output.fill(0.0);
                return;
            }

            // Older blocks only change once per block
            if was_empty {
                self.pre_multiplied.fill(Complex32::default());
                for i in 1..self.seg_count {
                    let index_audio = (self.current + i) % self.seg_count;
                    complex_multiply_accumulate(
                        &mut self.pre_multiplied,
                        &self.segments_ir[i],
                        &self.segments[index_audio],
                    );
                }
            }
            self.conv.copy_from_slice(&self.pre_multiplied);
            complex_multiply_accumulate(
                &mut self.conv,
                &self.segments[self.current],
                &self.segments_ir[0],
            );

            if self
                .fft
                .inverse(&mut self.conv, &mut self.fft_buffer, &mut self.scratch)
                .is_err()
            {
                output.fill(0.0);
                return;
            }

            for i in 0..processing {
                output[processed + i] = self.fft_buffer[pos + i] * scale + self.overlap[pos + i];
            }

            self.input_fill += processing;
            if self.input_fill == block_size {
                self.input_buffer.fill(0.0);
                self.input_fill = 0;
                for (dst, &src) in self.overlap.iter_mut().zip(&self.fft_buffer[block_size..]) {
                    *dst = src * scale;
                }
                self.current = if self.current > 0 {
                    self.current - 1
                } else {
                    self.seg_count - 1
                };
            }
            processed += processing;
        }
    }

    pub(crate) fn reset(&mut self) {
        for segment in &mut self.segments {
            segment.fill(Complex32::default());
        }
        self.pre_multiplied.fill(Complex32::default());
        self.conv.fill(Complex32::default());
        self.fft_buffer.fill(0.0);
        self.overlap.fill(0.0);
        self.input_buffer.fill(0.0);
        self.input_fill = 0;
        self.current = 0;
    }
}
