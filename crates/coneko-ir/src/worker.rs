//! Background thread that rebuilds the processing IR and installs kernels.
//!
//! Rebuilds take tens of milliseconds, so they never run on the audio
//! thread or block the caller. Every request reserves a kernel generation up
//! front; the worker coalesces whatever is queued when it wakes and only
//! builds the newest request, and the kernel loader drops any build that a
//! later request overtook while it was running.
//!
//! Build settings are captured when a rebuild is requested. Parameter edits
//! go through a [`RebuildEdit`], which holds the same lock the worker takes
//! to publish a natural decay time, so a rebuild that finishes while the user
//! edits DecayTime can never publish over the edit.

use crate::builder::{BuildRequest, IrBuilder};
use crate::request::{Progress, RebuildCommand, RebuildSettings, RebuildTicket};
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use coneko_core::{AtomicFlag, AtomicFloat, AudioBuffer, ParamId, ParameterStore};
use coneko_dsp::{KernelLoader, LoadOutcome};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const COMMAND_CAPACITY: usize = 64;

/// The imported and processed impulse responses, shared between the control
/// context, the worker and display readers.
#[derive(Debug, Default)]
pub struct IrState {
    raw: ArcSwapOption<AudioBuffer>,
    processed: ArcSwapOption<AudioBuffer>,
    decay_overridden: AtomicFlag,
    natural_secs: AtomicFloat,
    edit_lock: Mutex<()>,
}

impl IrState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> Option<Arc<AudioBuffer>> {
        self.raw.load_full()
    }

    /// Replace the imported IR. Clears the decay override, so the next
    /// rebuild reports the new IR's natural length.
    pub fn set_raw(&self, raw: Option<Arc<AudioBuffer>>) {
        self.raw.store(raw);
        self.decay_overridden.set(false);
    }

    pub fn processed(&self) -> Option<Arc<AudioBuffer>> {
        self.processed.load_full()
    }

    pub(crate) fn set_processed(&self, processed: Option<Arc<AudioBuffer>>) {
        self.processed.store(processed);
    }

    /// Processed IR if one has been built, otherwise the imported one.
    pub fn display(&self) -> Option<Arc<AudioBuffer>> {
        self.processed().or_else(|| self.raw())
    }

    /// Whether rebuilds stretch to the DecayTime parameter.
    pub fn decay_overridden(&self) -> bool {
        self.decay_overridden.get()
    }

    pub fn set_decay_overridden(&self, overridden: bool) {
        self.decay_overridden.set(overridden);
    }

    /// Trimmed length of the last built IR, in seconds.
    pub fn natural_secs(&self) -> f32 {
        self.natural_secs.get()
    }
}

/// Everything a rebuild reads and writes.
struct RebuildContext {
    builder: IrBuilder,
    state: Arc<IrState>,
    params: Arc<ParameterStore>,
    loader: KernelLoader,
}

impl RebuildContext {
    fn rebuild(&mut self, ticket: RebuildTicket, settings: RebuildSettings) {
        let generation = ticket.generation;
        if !self.loader.is_current(generation) {
            tracing::debug!(generation, "rebuild superseded before start");
            return;
        }

        let Some(raw) = self.state.raw() else {
            self.state.set_processed(None);
            let outcome = self.loader.clear(generation);
            tracing::debug!(generation, queued = outcome.is_queued(), "no IR loaded, passing through");
            return;
        };

        let spec = self.loader.spec();
        let request = BuildRequest {
            target_decay_secs: settings.target_decay_secs,
            reverse: settings.reverse,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        };

        let started = Instant::now();
        let built = self.builder.build(&raw, &request);
        self.state.natural_secs.set(built.natural_secs as f32);

        {
            // Edits reserve their generation under this lock, so a current
            // generation here means no edit has landed since the request
            let _edit = self.state.edit_lock.lock();
            if !self.loader.is_current(generation) {
                tracing::debug!(generation, "rebuild superseded, discarding result");
                return;
            }
            if request.target_decay_secs.is_none() {
                let published = self.params.set(ParamId::DecayTime, built.natural_secs as f32);
                tracing::debug!(decay_secs = published, "published natural decay time");
            }
        }

        let len = built.ir.num_samples();
        let processed = Arc::new(built.ir);
        self.state.set_processed(Some(Arc::clone(&processed)));

        match self.loader.install(generation, processed) {
            LoadOutcome::Queued { .. } => tracing::info!(
                generation,
                len,
                natural_secs = built.natural_secs,
                stretch_ratio = built.stretch_ratio,
                reversed = request.reverse,
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "IR rebuilt"
            ),
            LoadOutcome::Superseded { .. } => {
                tracing::debug!(generation, "kernel superseded during install")
            }
        }
    }
}

/// An open parameter edit. While it is held the worker cannot publish a
/// natural decay time; [`submit`](Self::submit) queues the rebuild for the
/// edited values.
#[must_use = "an edit requests nothing until it is submitted"]
pub struct RebuildEdit<'a> {
    worker: &'a RebuildWorker,
    guard: MutexGuard<'a, ()>,
}

impl RebuildEdit<'_> {
    /// Reserve a generation, capture the build settings and queue the
    /// rebuild. Any rebuild still queued or in flight is superseded.
    pub fn submit(self) -> Result<RebuildTicket> {
        let Self { worker, guard } = self;
        if !worker.is_running() {
            return Err(Error::WorkerStopped);
        }

        let ticket = RebuildTicket {
            generation: worker.loader.reserve(),
            sequence: worker.progress.submit(),
        };
        let settings = worker.capture_settings();
        drop(guard);

        let command = RebuildCommand::Rebuild { ticket, settings };
        if worker.command_tx.send(command).is_err() {
            worker.progress.complete(ticket.sequence);
            return Err(Error::WorkerStopped);
        }
        Ok(ticket)
    }
}

/// Owns the rebuild thread.
pub struct RebuildWorker {
    command_tx: Sender<RebuildCommand>,
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    progress: Arc<Progress>,
    state: Arc<IrState>,
    params: Arc<ParameterStore>,
    loader: KernelLoader,
}

impl RebuildWorker {
    /// Start the worker thread with the default builder.
    pub fn spawn(
        state: Arc<IrState>,
        params: Arc<ParameterStore>,
        loader: KernelLoader,
    ) -> Result<Self> {
        Self::with_builder(IrBuilder::new(), state, params, loader)
    }

    pub fn with_builder(
        builder: IrBuilder,
        state: Arc<IrState>,
        params: Arc<ParameterStore>,
        loader: KernelLoader,
    ) -> Result<Self> {
        let (command_tx, command_rx) = bounded(COMMAND_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(Progress::default());

        let context = RebuildContext {
            builder,
            state: Arc::clone(&state),
            params: Arc::clone(&params),
            loader: loader.clone(),
        };
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_progress = Arc::clone(&progress);

        let handle = thread::Builder::new()
            .name("coneko-ir-rebuild".into())
            .spawn(move || rebuild_loop(command_rx, context, thread_shutdown, thread_progress))?;

        tracing::debug!("rebuild worker started");
        Ok(Self {
            command_tx,
            thread_handle: Some(handle),
            shutdown,
            progress,
            state,
            params,
            loader,
        })
    }

    pub fn state(&self) -> &Arc<IrState> {
        &self.state
    }

    pub fn loader(&self) -> &KernelLoader {
        &self.loader
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Open an edit. Store parameter or IR changes, then
    /// [`submit`](RebuildEdit::submit) to rebuild from them.
    pub fn edit(&self) -> RebuildEdit<'_> {
        RebuildEdit {
            worker: self,
            guard: self.state.edit_lock.lock(),
        }
    }

    /// Queue a rebuild from the current IR state and parameters. Any rebuild
    /// still queued or in flight is superseded.
    pub fn request_rebuild(&self) -> Result<RebuildTicket> {
        self.edit().submit()
    }

    fn capture_settings(&self) -> RebuildSettings {
        RebuildSettings {
            target_decay_secs: self
                .state
                .decay_overridden()
                .then(|| f64::from(self.params.get(ParamId::DecayTime))),
            reverse: self.params.get_bool(ParamId::Reversed),
        }
    }

    /// Block until every rebuild submitted so far has finished or been
    /// superseded.
    pub fn flush(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::WorkerStopped);
        }
        self.progress.wait();
        Ok(())
    }

    /// [`flush`](Self::flush) with a deadline. Returns `Ok(false)` on timeout.
    pub fn flush_timeout(&self, timeout: Duration) -> Result<bool> {
        if !self.is_running() {
            return Err(Error::WorkerStopped);
        }
        Ok(self.progress.wait_for(timeout))
    }

    pub fn is_idle(&self) -> bool {
        self.progress.is_idle()
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.command_tx.try_send(RebuildCommand::Shutdown);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::debug!("rebuild worker stopped");
        }
        self.progress.complete_all();
    }
}

impl Drop for RebuildWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker main loop. Wakes on a command, drains the queue and builds only
/// the newest request.
fn rebuild_loop(
    rx: Receiver<RebuildCommand>,
    mut context: RebuildContext,
    shutdown: Arc<AtomicBool>,
    progress: Arc<Progress>,
) {
    while let Ok(first) = rx.recv() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let mut latest = None;
        for command in std::iter::once(first).chain(rx.try_iter()) {
            match command {
                RebuildCommand::Rebuild { ticket, settings } => latest = Some((ticket, settings)),
                RebuildCommand::Shutdown => shutdown.store(true, Ordering::SeqCst),
            }
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        if let Some((ticket, settings)) = latest {
            context.rebuild(ticket, settings);
            progress.complete(ticket.sequence);
        }
        // Keep the retire channel short between rebuilds
        context.loader.collect_garbage();
    }
    progress.complete_all();
}
