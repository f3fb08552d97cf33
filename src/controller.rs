//! The control-context half of the effect.

use crate::Result;
use coneko_core::{AudioBuffer, ParamId, ParameterStore};
use coneko_dsp::KernelLoader;
use coneko_ir::{IrState, RebuildTicket, RebuildWorker};
use std::sync::Arc;
use std::time::Duration;

/// Snapshot of the kernel hand-off for diagnostics and UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelInfo {
    /// Generation the audio thread is running.
    pub installed_generation: u64,
    /// Newest generation requested.
    pub latest_generation: u64,
    /// Installed kernel length in samples; 0 while passing through.
    pub installed_len: usize,
    /// Trimmed length of the last built IR, in seconds.
    pub natural_secs: f32,
    /// Whether rebuilds stretch to the DecayTime parameter.
    pub decay_overridden: bool,
}

impl KernelInfo {
    pub fn is_current(&self) -> bool {
        self.installed_generation == self.latest_generation
    }
}

/// Parameter edits, IR import and rebuild control.
///
/// Every call here may block briefly or allocate; none of it belongs on the
/// audio thread. IR rebuilds run on a background worker, so calls that
/// trigger one return as soon as it is queued. Use [`flush`](Self::flush) to
/// wait for the result.
pub struct ConekoController {
    params: Arc<ParameterStore>,
    worker: RebuildWorker,
}

impl ConekoController {
    pub(crate) fn from_parts(params: Arc<ParameterStore>, worker: RebuildWorker) -> Self {
        Self { params, worker }
    }

    #[inline]
    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    #[inline]
    pub fn parameter(&self, id: ParamId) -> f32 {
        self.params.get(id)
    }

    fn state(&self) -> &IrState {
        self.worker.state()
    }

    fn loader(&self) -> &KernelLoader {
        self.worker.loader()
    }

    /// Store a parameter, clamped to its range, and return the stored value.
    ///
    /// Changing `Reversed` rebuilds the IR. Editing `DecayTime` switches the
    /// IR to follow it from now on and rebuilds.
    pub fn set_parameter(&self, id: ParamId, value: f32) -> Result<f32> {
        if !id.requires_rebuild() {
            return Ok(self.params.set(id, value));
        }

        // Store and request inside one edit, so a rebuild finishing meanwhile
        // cannot publish its natural decay over the new value
        let edit = self.worker.edit();
        let previous = self.params.get(id);
        let stored = self.params.set(id, value);

        let overriding = id == ParamId::DecayTime
            && !value.is_nan()
            && !self.state().decay_overridden();
        if overriding {
            self.state().set_decay_overridden(true);
        }

        if stored != previous || overriding {
            edit.submit()?;
        }
        Ok(stored)
    }

    /// [`set_parameter`](Self::set_parameter) from a normalised 0..1 value,
    /// snapped to the parameter's step.
    pub fn set_parameter_normalised(&self, id: ParamId, normalised: f32) -> Result<f32> {
        let range = self.params.range(id);
        let value = range.snap(range.from_normalised(normalised));
        self.set_parameter(id, value)
    }

    pub fn set_decay_time(&self, secs: f32) -> Result<f32> {
        self.set_parameter(ParamId::DecayTime, secs)
    }

    pub fn set_reversed(&self, reversed: bool) -> Result<()> {
        self.set_parameter(ParamId::Reversed, if reversed { 1.0 } else { 0.0 })?;
        Ok(())
    }

    pub fn set_bypassed(&self, bypassed: bool) {
        self.params.set_bool(ParamId::Bypassed, bypassed);
    }

    /// Replace the impulse response and rebuild. DecayTime is updated to the
    /// new IR's trimmed length once the rebuild finishes.
    pub fn import_ir(&self, ir: AudioBuffer) -> Result<RebuildTicket> {
        tracing::info!(
            channels = ir.num_channels(),
            samples = ir.num_samples(),
            sample_rate = ir.sample_rate(),
            "importing impulse response"
        );
        let edit = self.worker.edit();
        self.state().set_raw(Some(Arc::new(ir)));
        Ok(edit.submit()?)
    }

    /// Drop the impulse response; the processor passes signal through.
    pub fn clear_ir(&self) -> Result<RebuildTicket> {
        tracing::info!("clearing impulse response");
        let edit = self.worker.edit();
        self.state().set_raw(None);
        Ok(edit.submit()?)
    }

    /// Rebuild from the current IR and parameters.
    pub fn rebuild(&self) -> Result<RebuildTicket> {
        Ok(self.worker.request_rebuild()?)
    }

    /// Block until every rebuild requested so far has been built or
    /// superseded.
    pub fn flush(&self) -> Result<()> {
        Ok(self.worker.flush()?)
    }

    /// [`flush`](Self::flush) with a deadline. Returns `Ok(false)` on timeout.
    pub fn flush_timeout(&self, timeout: Duration) -> Result<bool> {
        Ok(self.worker.flush_timeout(timeout)?)
    }

    /// The processed IR if one exists, otherwise the imported one. For
    /// display only.
    pub fn display_ir(&self) -> Option<Arc<AudioBuffer>> {
        self.state().display()
    }

    pub fn raw_ir(&self) -> Option<Arc<AudioBuffer>> {
        self.state().raw()
    }

    pub fn processing_ir(&self) -> Option<Arc<AudioBuffer>> {
        self.state().processed()
    }

    pub fn kernel_info(&self) -> KernelInfo {
        let loader = self.loader();
        KernelInfo {
            installed_generation: loader.installed_generation(),
            latest_generation: loader.latest_generation(),
            installed_len: loader.installed_len(),
            natural_secs: self.state().natural_secs(),
            decay_overridden: self.state().decay_overridden(),
        }
    }

    /// True once the audio thread runs the kernel from the newest request.
    pub fn is_kernel_current(&self) -> bool {
        self.kernel_info().is_current()
    }

    /// Free kernels the audio thread has retired. Returns how many.
    pub fn collect_garbage(&self) -> usize {
        self.loader().collect_garbage()
    }
}
