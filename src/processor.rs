//! The audio-context half of the effect.

use crate::builder::ConekoBuilder;
use crate::Result;
use coneko_core::{ParamId, ParameterStore, ProcessSpec, ProcessorConfig};
use coneko_dsp::{ConvolutionEngine, DryWetMixer, FilterStage, GainStage, PreDelay, StereoWidth};
use std::sync::Arc;

/// Runs the signal chain once per audio period.
///
/// Per block, in order: input gain, dry snapshot, convolution, pre-delay,
/// stereo width, low then high shelf, dry/wet mix, output gain. Parameters
/// are read from the shared [`ParameterStore`] at the start of every block
/// and ramped per sample where a jump would be audible.
///
/// `process` never locks, allocates or logs. Kernel changes arrive from the
/// [`ConekoController`](crate::ConekoController) through the convolution
/// engine's lock-free hand-off.
pub struct ConekoProcessor {
    config: ProcessorConfig,
    params: Arc<ParameterStore>,
    input_gain: GainStage,
    convolver: ConvolutionEngine,
    pre_delay: PreDelay,
    width: StereoWidth,
    filters: FilterStage,
    mixer: DryWetMixer,
    output_gain: GainStage,
    work: Vec<Vec<f32>>,
}

impl ConekoProcessor {
    pub fn builder() -> ConekoBuilder {
        ConekoBuilder::default()
    }

    pub(crate) fn from_parts(
        config: ProcessorConfig,
        params: Arc<ParameterStore>,
        convolver: ConvolutionEngine,
    ) -> Self {
        let spec = config.spec;
        let smoothing = config.smoothing_secs;
        let mut processor = Self {
            input_gain: GainStage::new(&spec, smoothing),
            convolver,
            pre_delay: PreDelay::new(&spec),
            width: StereoWidth::new(&spec, smoothing),
            filters: FilterStage::new(&spec),
            mixer: DryWetMixer::new(&spec, smoothing),
            output_gain: GainStage::new(&spec, smoothing),
            work: vec![vec![0.0; spec.max_block_size]; spec.channels],
            config,
            params,
        };
        processor.settle_parameters();
        processor
    }

    /// Reconfigure for a new stream shape. Not real-time safe: call it from
    /// the host's prepare hook, never concurrently with `process`.
    ///
    /// The running kernel is re-laid out for the new block size and channel
    /// count. It keeps its sample rate; after a rate change, call
    /// [`ConekoController::rebuild`](crate::ConekoController::rebuild) to
    /// resample the IR.
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<()> {
        spec.validate()?;
        self.convolver.prepare(spec)?;
        self.config.spec = spec;

        let smoothing = self.config.smoothing_secs;
        self.input_gain.prepare(&spec, smoothing);
        self.output_gain.prepare(&spec, smoothing);
        self.pre_delay.prepare(&spec);
        self.width.prepare(&spec, smoothing);
        self.filters.prepare(&spec);
        self.mixer.prepare(&spec, smoothing);
        self.work = vec![vec![0.0; spec.max_block_size]; spec.channels];

        self.settle_parameters();
        tracing::debug!(
            sample_rate = spec.sample_rate,
            max_block_size = spec.max_block_size,
            channels = spec.channels,
            "processor prepared"
        );
        Ok(())
    }

    /// Clear all signal history. The kernel and parameters are kept.
    pub fn reset(&mut self) {
        self.convolver.reset();
        self.pre_delay.reset();
        self.filters.reset();
        self.input_gain.reset();
        self.output_gain.reset();
        self.width.reset();
        self.mixer.reset();
    }

    #[inline]
    pub fn spec(&self) -> &ProcessSpec {
        &self.config.spec
    }

    #[inline]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[inline]
    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    /// The chain adds no latency: convolution is zero-delay and pre-delay is
    /// part of the effect.
    #[inline]
    pub fn latency_samples(&self) -> usize {
        0
    }

    /// How long output keeps ringing after input stops.
    pub fn tail_seconds(&self) -> f64 {
        let spec = self.config.spec;
        (self.convolver.kernel_len() + self.pre_delay.delay_samples()) as f64 / spec.sample_rate
    }

    /// Length in samples of the kernel currently convolving; 0 while passing
    /// through.
    #[inline]
    pub fn kernel_len(&self) -> usize {
        self.convolver.kernel_len()
    }

    #[inline]
    pub fn installed_generation(&self) -> u64 {
        self.convolver.installed_generation()
    }

    /// Push the current parameter values to every stage and skip the ramps.
    fn settle_parameters(&mut self) {
        self.update_parameters();
        self.input_gain.reset();
        self.output_gain.reset();
        self.width.reset();
        self.mixer.reset();
        self.pre_delay.reset();
    }

    fn update_parameters(&mut self) {
        let p = &self.params;
        self.input_gain.set_gain_db(p.get(ParamId::InputGain));
        self.output_gain.set_gain_db(p.get(ParamId::OutputGain));
        self.mixer.set_mix_percent(p.get(ParamId::DryWetMix));
        self.pre_delay.set_delay_ms(p.get(ParamId::PreDelayTime));
        self.width.set_width_percent(p.get(ParamId::StereoWidth));
        self.filters
            .set_low(p.get(ParamId::LowShelfFreq), p.get(ParamId::LowShelfGain));
        self.filters
            .set_high(p.get(ParamId::HighShelfFreq), p.get(ParamId::HighShelfGain));
    }

    /// Process one block in place.
    ///
    /// Channels beyond the prepared count are silenced; blocks longer than
    /// the prepared maximum are processed in chunks. With `Bypassed` on the
    /// block is left untouched.
    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C]) {
        if self.params.get_bool(ParamId::Bypassed) {
            return;
        }

        let len = block
            .iter_mut()
            .map(|channel| channel.as_mut().len())
            .min()
            .unwrap_or(0);
        let channels = block.len().min(self.config.spec.channels);
        let (live, extra) = block.split_at_mut(channels);

        for channel in extra.iter_mut() {
            channel.as_mut()[..len].fill(0.0);
        }
        if live.is_empty() {
            return;
        }

        self.update_parameters();

        let max_block = self.config.spec.max_block_size;
        let mut start = 0;
        while start < len {
            let n = (len - start).min(max_block);
            self.process_chunk(live, start, n);
            start += n;
        }
    }

    fn process_chunk<C: AsMut<[f32]>>(&mut self, live: &mut [C], start: usize, n: usize) {
        let channels = live.len();
        for (work, channel) in self.work.iter_mut().zip(live.iter_mut()) {
            work[..n].copy_from_slice(&channel.as_mut()[start..start + n]);
        }
        let work = &mut self.work[..channels];

        self.input_gain.process(work, n);
        self.mixer.push_dry(work, n);
        self.convolver.process(work, n);
        self.pre_delay.process(work, n);
        self.width.process(work, n);
        self.filters.process(work, n);
        self.mixer.mix_wet(work, n);
        self.output_gain.process(work, n);

        for (work, channel) in self.work.iter().zip(live.iter_mut()) {
            channel.as_mut()[start..start + n].copy_from_slice(&work[..n]);
        }
    }
}
