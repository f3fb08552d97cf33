//! Builder for configuring and constructing a processor/controller pair.

use crate::{ConekoController, ConekoProcessor, Result};
use coneko_core::{ParameterStore, ProcessSpec, ProcessorConfig};
use coneko_dsp::ConvolutionEngine;
use coneko_ir::{FftSize, IrBuilder, IrState, PhaseVocoder, RebuildWorker};
use std::sync::Arc;

/// The processor goes to the audio thread; the controller stays with the UI
/// or host. Both share one parameter store.
///
/// # Example
///
/// ```no_run
/// use coneko::prelude::*;
///
/// let (mut processor, controller) = ConekoProcessor::builder()
///     .sample_rate(48000.0)
///     .max_block_size(256)
///     .channels(2)
///     .build()?;
///
/// controller.import_ir(AudioBuffer::mono(vec![1.0, 0.5, 0.25], 48000.0))?;
/// controller.flush()?;
///
/// let mut block = [vec![0.0f32; 256], vec![0.0f32; 256]];
/// processor.process(&mut block);
/// # Ok::<(), coneko::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConekoBuilder {
    config: ProcessorConfig,
    stretch_fft_size: FftSize,
}

impl ConekoBuilder {
    /// Start from a complete config.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn spec(mut self, spec: ProcessSpec) -> Self {
        self.config.spec = spec;
        self
    }

    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.spec.sample_rate = sample_rate;
        self
    }

    /// Default: 512
    pub fn max_block_size(mut self, max_block_size: usize) -> Self {
        self.config.spec.max_block_size = max_block_size;
        self
    }

    /// 1 or 2. Default: 2
    pub fn channels(mut self, channels: usize) -> Self {
        self.config.spec.channels = channels;
        self
    }

    /// Ramp length for gain, mix and width changes. Default: 50 ms
    pub fn smoothing_time(mut self, secs: f64) -> Self {
        self.config.smoothing_secs = secs;
        self
    }

    /// Crossfade length between kernels. Default: 20 ms
    pub fn crossfade_time(mut self, secs: f64) -> Self {
        self.config.crossfade_secs = secs;
        self
    }

    /// Scale kernels to a common energy. Default: on
    pub fn normalise_kernel(mut self, normalise: bool) -> Self {
        self.config.normalise_kernel = normalise;
        self
    }

    /// Phase vocoder frame size for decay-time stretching. Default: 2048
    pub fn stretch_fft_size(mut self, size: FftSize) -> Self {
        self.stretch_fft_size = size;
        self
    }

    /// Validate the configuration and start the rebuild worker.
    pub fn build(self) -> Result<(ConekoProcessor, ConekoController)> {
        let config = self.config;
        config.validate()?;

        let params = Arc::new(ParameterStore::new());
        let convolver = ConvolutionEngine::new(&config)?;
        let builder = IrBuilder::with_stretcher(Box::new(PhaseVocoder::new(self.stretch_fft_size)));
        let worker = RebuildWorker::with_builder(
            builder,
            Arc::new(IrState::new()),
            Arc::clone(&params),
            convolver.loader(),
        )?;

        tracing::info!(
            sample_rate = config.spec.sample_rate,
            max_block_size = config.spec.max_block_size,
            channels = config.spec.channels,
            "coneko processor built"
        );

        let processor = ConekoProcessor::from_parts(config, Arc::clone(&params), convolver);
        let controller = ConekoController::from_parts(params, worker);
        Ok((processor, controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ConekoBuilder::default();
        assert_eq!(builder.config, ProcessorConfig::default());
        assert_eq!(builder.stretch_fft_size, FftSize::Large);
    }

    #[test]
    fn test_builder_sets_spec() {
        let (processor, _controller) = ConekoBuilder::default()
            .sample_rate(96000.0)
            .max_block_size(128)
            .channels(1)
            .build()
            .unwrap();
        assert_eq!(*processor.spec(), ProcessSpec::new(96000.0, 128, 1));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(ConekoBuilder::default().channels(0).build().is_err());
        assert!(ConekoBuilder::default().sample_rate(1000.0).build().is_err());
        assert!(ConekoBuilder::default().crossfade_time(5.0).build().is_err());
    }

    #[test]
    fn test_controller_and_processor_share_parameters() {
        let (processor, controller) = ConekoBuilder::default().build().unwrap();
        assert!(Arc::ptr_eq(processor.params(), controller.params()));
    }
}
