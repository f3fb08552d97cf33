//! Fully built kernels, ready to be handed to the audio context.

use super::two_stage::{StagePlans, TwoStageConvolver};
use coneko_core::{AudioBuffer, ProcessSpec};
use std::sync::Arc;

/// Energy every loaded kernel is scaled to.
const NORMALISED_LEVEL: f64 = 0.125;

/// Gain applied to `ir` at load time when kernel normalisation is on:
/// `0.125 / sqrt(max channel energy)`. Returns 1.0 for silent input.
pub fn kernel_normalisation_gain(ir: &AudioBuffer) -> f32 {
    let energy = ir.max_channel_energy();
    if energy > 0.0 && energy.is_finite() {
        (NORMALISED_LEVEL / energy.sqrt()) as f32
    } else {
        1.0
    }
}

/// Head partition size used for a given maximum host block.
pub(crate) fn partition_size(max_block_size: usize) -> usize {
    max_block_size.max(1).next_power_of_two()
}

/// One convolver per live channel plus the bookkeeping the engine needs.
///
/// An empty `convolvers` list means pass-through. The source IR is kept so
/// the kernel can be rebuilt when the stream shape changes.
pub(crate) struct LoadedKernel {
    pub(crate) generation: u64,
    convolvers: Vec<TwoStageConvolver>,
    source: Option<Arc<AudioBuffer>>,
    len: usize,
}

impl LoadedKernel {
    pub(crate) fn passthrough(generation: u64) -> Self {
        Self {
            generation,
            convolvers: Vec::new(),
            source: None,
            len: 0,
        }
    }

    /// Build for `spec`. IR channels are mapped onto live channels, reusing
    /// the last IR channel when the IR has fewer. Empty or silent IRs give a
    /// pass-through kernel, as does a failed transform.
    pub(crate) fn build(
        ir: &Arc<AudioBuffer>,
        spec: &ProcessSpec,
        normalise: bool,
        generation: u64,
    ) -> Self {
        if ir.is_empty() || ir.max_channel_energy() <= 0.0 || spec.channels == 0 {
            return Self::passthrough(generation);
        }

        let gain = if normalise {
            kernel_normalisation_gain(ir)
        } else {
            1.0
        };
        let plans = StagePlans::plan(partition_size(spec.max_block_size));
        let convolvers = (0..spec.channels)
            .map(|ch| {
                let source = ir.channel(ch.min(ir.num_channels() - 1));
                TwoStageConvolver::new(source, gain, &plans)
            })
            .collect::<Result<Vec<_>, _>>();

        let convolvers = match convolvers {
            Ok(convolvers) => convolvers,
            Err(err) => {
                tracing::warn!(%err, generation, "kernel transform failed, passing through");
                return Self::passthrough(generation);
            }
        };

        Self {
            generation,
            convolvers,
            source: Some(Arc::clone(ir)),
            len: ir.num_samples(),
        }
    }

    /// Same IR, rebuilt for a new stream shape.
    pub(crate) fn rebuild(&self, spec: &ProcessSpec, normalise: bool) -> Self {
        match &self.source {
            Some(ir) => Self::build(ir, spec, normalise, self.generation),
            None => Self::passthrough(self.generation),
        }
    }

    #[inline]
    pub(crate) fn is_passthrough(&self) -> bool {
        self.convolvers.is_empty()
    }

    /// Kernel length in samples; 0 for pass-through.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Render one channel. Channels the kernel was not built for are silenced.
    #[inline]
    pub(crate) fn render(&mut self, channel: usize, input: &[f32], output: &mut [f32]) {
        if self.is_passthrough() {
            output.copy_from_slice(input);
            return;
        }
        match self.convolvers.get_mut(channel) {
            Some(convolver) => convolver.process(input, output),
            None => output.fill(0.0),
        }
    }

    pub(crate) fn reset(&mut self) {
        for convolver in &mut self.convolvers {
            convolver.reset();
        }
    }

    #[cfg(test)]
    pub(crate) fn channel_count(&self) -> usize {
        self.convolvers.len()
    }

    #[cfg(test)]
    pub(crate) fn products_per_block(&self) -> usize {
        self.convolvers
            .iter()
            .map(TwoStageConvolver::products_per_block)
            .max()
            .unwrap_or(0)
    }
}
