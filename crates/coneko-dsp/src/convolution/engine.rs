//! Convolution engine with lock-free kernel hot swap.
//!
//! The engine is owned by the audio context. Kernels are built entirely on
//! the control context by a [`KernelLoader`] and passed over a bounded
//! channel as boxed, ready-to-run convolvers; the audio context only ever
//! moves pointers. Replaced kernels travel back over a second channel so
//! their memory is freed on the control side.

use super::kernel::{partition_size, LoadedKernel};
use crate::Result;
use arc_swap::ArcSwap;
use coneko_core::{AtomicFlag, AudioBuffer, Generation, ProcessSpec, ProcessorConfig};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const INCOMING_CAPACITY: usize = 8;
const RETIRED_CAPACITY: usize = 32;

/// State visible to both contexts.
struct Shared {
    spec: ArcSwap<ProcessSpec>,
    generation: Generation,
    installed: AtomicU64,
    installed_len: AtomicUsize,
    normalise: AtomicFlag,
}

/// Result of handing a kernel to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Built and queued; the engine installs it at the start of a block.
    Queued { generation: u64 },
    /// A newer request was issued first; nothing was sent.
    Superseded { generation: u64 },
}

impl LoadOutcome {
    pub fn generation(&self) -> u64 {
        match *self {
            LoadOutcome::Queued { generation } | LoadOutcome::Superseded { generation } => {
                generation
            }
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, LoadOutcome::Queued { .. })
    }
}

/// Audio-context half: convolves live blocks against the installed kernel.
///
/// Starts as pass-through. `process` never blocks or allocates; it polls for
/// a finished kernel at the start of every call and crossfades from the old
/// kernel to the new one.
pub struct ConvolutionEngine {
    spec: ProcessSpec,
    shared: Arc<Shared>,
    incoming: Receiver<Box<LoadedKernel>>,
    incoming_tx: Sender<Box<LoadedKernel>>,
    retired_tx: Sender<Box<LoadedKernel>>,
    retired_rx: Receiver<Box<LoadedKernel>>,
    active: Box<LoadedKernel>,
    previous: Option<Box<LoadedKernel>>,
    pending: Option<Box<LoadedKernel>>,
    crossfade_secs: f64,
    fade_len: usize,
    fade_pos: usize,
    input: Vec<Vec<f32>>,
    faded: Vec<Vec<f32>>,
}

impl ConvolutionEngine {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let (incoming_tx, incoming) = bounded(INCOMING_CAPACITY);
        let (retired_tx, retired_rx) = bounded(RETIRED_CAPACITY);

        let shared = Arc::new(Shared {
            spec: ArcSwap::from_pointee(config.spec),
            generation: Generation::new(),
            installed: AtomicU64::new(0),
            installed_len: AtomicUsize::new(0),
            normalise: AtomicFlag::new(config.normalise_kernel),
        });

        let mut engine = Self {
            spec: config.spec,
            shared,
            incoming,
            incoming_tx,
            retired_tx,
            retired_rx,
            active: Box::new(LoadedKernel::passthrough(0)),
            previous: None,
            pending: None,
            crossfade_secs: config.crossfade_secs,
            fade_len: 0,
            fade_pos: 0,
            input: Vec::new(),
            faded: Vec::new(),
        };
        engine.allocate(config.spec);
        Ok(engine)
    }

    /// Control-context handle for installing kernels into this engine.
    pub fn loader(&self) -> KernelLoader {
        KernelLoader {
            shared: Arc::clone(&self.shared),
            to_engine: self.incoming_tx.clone(),
            queued: self.incoming.clone(),
            retired: self.retired_rx.clone(),
        }
    }

    fn allocate(&mut self, spec: ProcessSpec) {
        self.spec = spec;
        self.input = vec![vec![0.0; spec.max_block_size]; spec.channels];
        self.faded = vec![vec![0.0; spec.max_block_size]; spec.channels];
        self.fade_len = spec.secs_to_samples(self.crossfade_secs);
        self.fade_pos = 0;
    }

    /// Resize for a new stream shape. Not real-time safe.
    ///
    /// A queued kernel is installed immediately, and the installed kernel is
    /// rebuilt when the channel count or partition size changed.
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<()> {
        spec.validate()?;
        let reshaped = spec.channels != self.spec.channels
            || partition_size(spec.max_block_size) != partition_size(self.spec.max_block_size);

        self.shared.spec.store(Arc::new(spec));
        self.allocate(spec);

        self.poll_incoming();
        self.previous = None;
        if let Some(kernel) = self.pending.take() {
            self.active = kernel;
        } else if reshaped {
            let rebuilt = self.active.rebuild(&spec, self.shared.normalise.get());
            self.active = Box::new(rebuilt);
        }
        self.active.reset();
        self.publish_installed();
        Ok(())
    }

    /// Clear convolution history without changing the kernel.
    pub fn reset(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.retire(previous);
        }
        self.active.reset();
        self.fade_pos = 0;
    }

    #[inline]
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Installed kernel length in samples; 0 while passing through.
    #[inline]
    pub fn kernel_len(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub fn is_passthrough(&self) -> bool {
        self.active.is_passthrough()
    }

    #[inline]
    pub fn installed_generation(&self) -> u64 {
        self.active.generation
    }

    /// True while blending from a replaced kernel.
    #[inline]
    pub fn is_crossfading(&self) -> bool {
        self.previous.is_some()
    }

    /// Convolve the first `len` samples of each channel in place.
    ///
    /// Channels beyond the prepared count are silenced. Blocks longer than
    /// the prepared maximum are processed in chunks.
    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C], len: usize) {
        self.poll_incoming();

        let len = block
            .iter_mut()
            .map(|channel| channel.as_mut().len())
            .fold(len, usize::min);
        let channels = block.len().min(self.spec.channels);

        let mut start = 0;
        while start < len {
            let n = (len - start).min(self.spec.max_block_size);
            self.process_chunk(&mut block[..channels], start, n);
            start += n;
        }

        for extra in block[channels..].iter_mut() {
            extra.as_mut()[..len].fill(0.0);
        }
    }

    fn process_chunk<C: AsMut<[f32]>>(&mut self, block: &mut [C], start: usize, n: usize) {
        if self.previous.is_none() {
            self.install_pending();
        }

        for (ch, channel) in block.iter_mut().enumerate() {
            let data = &mut channel.as_mut()[start..start + n];
            let input = &mut self.input[ch][..n];
            input.copy_from_slice(data);

            self.active.render(ch, input, data);

            if let Some(previous) = self.previous.as_mut() {
                let faded = &mut self.faded[ch][..n];
                previous.render(ch, input, faded);

                let fade_len = self.fade_len as f32;
                for (i, (y, &old)) in data.iter_mut().zip(faded.iter()).enumerate() {
                    let t = ((self.fade_pos + i + 1) as f32 / fade_len).min(1.0);
                    *y = old + (*y - old) * t;
                }
            }
        }

        if self.previous.is_some() {
            self.fade_pos += n;
            if self.fade_pos >= self.fade_len {
                if let Some(previous) = self.previous.take() {
                    self.retire(previous);
                }
            }
        }
    }

    /// Keep only the newest incoming kernel; everything older is retired.
    fn poll_incoming(&mut self) {
        while let Ok(kernel) = self.incoming.try_recv() {
            let newest = self
                .pending
                .as_ref()
                .map_or(self.active.generation, |p| p.generation.max(self.active.generation));
            if kernel.generation <= newest {
                self.retire(kernel);
                continue;
            }
            if let Some(stale) = self.pending.replace(kernel) {
                self.retire(stale);
            }
        }
    }

    fn install_pending(&mut self) {
        let Some(kernel) = self.pending.take() else {
            return;
        };
        let old = std::mem::replace(&mut self.active, kernel);
        self.publish_installed();

        if self.fade_len == 0 {
            self.retire(old);
        } else {
            self.previous = Some(old);
            self.fade_pos = 0;
        }
    }

    fn publish_installed(&self) {
        self.shared
            .installed
            .store(self.active.generation, Ordering::Release);
        self.shared
            .installed_len
            .store(self.active.len(), Ordering::Release);
    }

    fn retire(&self, kernel: Box<LoadedKernel>) {
        // Only dropped here if the control side stopped collecting.
        let _ = self.retired_tx.try_send(kernel);
    }
}

/// Control-context half: builds kernels and queues them for the engine.
///
/// Cheap to clone. Every request reserves a generation number; a build is
/// only queued while its number is still the newest, so when several
/// requests overlap only the last one is ever installed.
#[derive(Clone)]
pub struct KernelLoader {
    shared: Arc<Shared>,
    to_engine: Sender<Box<LoadedKernel>>,
    queued: Receiver<Box<LoadedKernel>>,
    retired: Receiver<Box<LoadedKernel>>,
}

impl KernelLoader {
    /// Reserve the generation number for a new request.
    pub fn reserve(&self) -> u64 {
        self.shared.generation.advance()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.shared.generation.is_current(generation)
    }

    pub fn latest_generation(&self) -> u64 {
        self.shared.generation.latest()
    }

    /// Generation of the kernel the audio context is running.
    pub fn installed_generation(&self) -> u64 {
        self.shared.installed.load(Ordering::Acquire)
    }

    /// Length in samples of the kernel the audio context is running.
    pub fn installed_len(&self) -> usize {
        self.shared.installed_len.load(Ordering::Acquire)
    }

    /// Stream shape the engine was last prepared with.
    pub fn spec(&self) -> ProcessSpec {
        **self.shared.spec.load()
    }

    pub fn set_normalise(&self, normalise: bool) {
        self.shared.normalise.set(normalise);
    }

    /// Reserve a generation and install `ir` under it.
    pub fn load_kernel(&self, ir: Arc<AudioBuffer>) -> LoadOutcome {
        let generation = self.reserve();
        self.install(generation, ir)
    }

    /// Build a kernel for `ir` and queue it, unless `generation` has been
    /// superseded before or after the build.
    pub fn install(&self, generation: u64, ir: Arc<AudioBuffer>) -> LoadOutcome {
        self.collect_garbage();
        if !self.is_current(generation) {
            tracing::debug!(generation, "kernel request superseded before build");
            return LoadOutcome::Superseded { generation };
        }

        let kernel = loop {
            let spec = self.spec();
            let kernel = LoadedKernel::build(&ir, &spec, self.shared.normalise.get(), generation);
            // prepare() may have reshaped the engine while we were building
            if self.spec() == spec {
                break kernel;
            }
        };

        if !self.is_current(generation) {
            tracing::debug!(generation, "kernel superseded during build, discarding");
            return LoadOutcome::Superseded { generation };
        }

        tracing::debug!(
            generation,
            len = kernel.len(),
            passthrough = kernel.is_passthrough(),
            "kernel queued"
        );
        self.send(Box::new(kernel));
        LoadOutcome::Queued { generation }
    }

    /// Queue a pass-through kernel under `generation`.
    pub fn clear(&self, generation: u64) -> LoadOutcome {
        self.collect_garbage();
        if !self.is_current(generation) {
            return LoadOutcome::Superseded { generation };
        }
        self.send(Box::new(LoadedKernel::passthrough(generation)));
        LoadOutcome::Queued { generation }
    }

    fn send(&self, kernel: Box<LoadedKernel>) {
        let mut outgoing = kernel;
        loop {
            match self.to_engine.try_send(outgoing) {
                Ok(()) => return,
                Err(TrySendError::Full(kernel)) => {
                    // Make room by dropping the oldest queued kernel here,
                    // keeping whichever of the two is newer.
                    outgoing = match self.queued.try_recv() {
                        Ok(queued) if queued.generation > kernel.generation => queued,
                        _ => kernel,
                    };
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Free kernels the audio context has finished with. Returns how many.
    pub fn collect_garbage(&self) -> usize {
        self.retired.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 1000.0;

    fn config(block: usize, channels: usize, crossfade_secs: f64) -> ProcessorConfig {
        ProcessorConfig {
            spec: ProcessSpec::new(48000.0, block, channels),
            crossfade_secs,
            normalise_kernel: false,
            ..ProcessorConfig::default()
        }
    }

    fn impulse_ir(delay: usize, level: f32) -> Arc<AudioBuffer> {
        let mut samples = vec![0.0; delay + 1];
        samples[delay] = level;
        Arc::new(AudioBuffer::mono(samples, SR))
    }

    fn run(engine: &mut ConvolutionEngine, left: &mut [f32], right: &mut [f32]) {
        let len = left.len();
        let mut block = [left, right];
        engine.process(&mut block, len);
    }

    #[test]
    fn test_starts_as_passthrough() {
        let mut engine = ConvolutionEngine::new(&config(64, 2, 0.0)).unwrap();
        assert!(engine.is_passthrough());
        assert_eq!(engine.kernel_len(), 0);

        let mut left = vec![0.5; 64];
        let mut right = vec![-0.25; 64];
        run(&mut engine, &mut left, &mut right);
        assert!(left.iter().all(|&x| x == 0.5));
        assert!(right.iter().all(|&x| x == -0.25));
    }

    #[test]
    fn test_kernel_installs_at_next_block() {
        let mut engine = ConvolutionEngine::new(&config(64, 2, 0.0)).unwrap();
        let loader = engine.loader();

        let outcome = loader.load_kernel(impulse_ir(2, 0.5));
        assert_eq!(outcome, LoadOutcome::Queued { generation: 1 });
        assert_eq!(loader.installed_generation(), 0);

        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        left[0] = 1.0;
        right[0] = 1.0;
        run(&mut engine, &mut left, &mut right);

        assert_eq!(engine.installed_generation(), 1);
        assert_eq!(loader.installed_generation(), 1);
        assert_eq!(loader.installed_len(), 3);
        for ch in [&left, &right] {
            assert!((ch[2] - 0.5).abs() < 1e-5);
            assert!(ch[0].abs() < 1e-5);
        }
    }

    #[test]
    fn test_newest_queued_kernel_wins() {
        let mut engine = ConvolutionEngine::new(&config(32, 2, 0.0)).unwrap();
        let loader = engine.loader();

        for level in [0.1, 0.2, 0.3] {
            loader.load_kernel(impulse_ir(0, level));
        }

        let mut left = vec![1.0; 32];
        let mut right = vec![1.0; 32];
        run(&mut engine, &mut left, &mut right);
        assert_eq!(engine.installed_generation(), 3);
        assert!((left[31] - 0.3).abs() < 1e-5);

        // The two stale kernels come back to the control side
        assert_eq!(loader.collect_garbage(), 3);
    }

    #[test]
    fn test_superseded_request_is_not_sent() {
        let engine = ConvolutionEngine::new(&config(32, 2, 0.0)).unwrap();
        let loader = engine.loader();

        let old = loader.reserve();
        let new = loader.reserve();
        assert!(!loader.is_current(old));
        assert_eq!(
            loader.install(old, impulse_ir(0, 1.0)),
            LoadOutcome::Superseded { generation: old }
        );
        assert!(loader.install(new, impulse_ir(0, 1.0)).is_queued());
        assert_eq!(loader.latest_generation(), new);
    }

    #[test]
    fn test_crossfade_is_continuous() {
        // 1 ms fade at 48 kHz = 48 samples
        let mut engine = ConvolutionEngine::new(&config(16, 2, 0.001)).unwrap();
        let loader = engine.loader();
        loader.load_kernel(impulse_ir(0, 0.5));

        let mut output = Vec::new();
        for _ in 0..6 {
            let mut left = vec![1.0; 16];
            let mut right = vec![1.0; 16];
            run(&mut engine, &mut left, &mut right);
            output.extend_from_slice(&left);
        }

        // Blends from the dry signal (1.0) down to the kernel output (0.5)
        for pair in output.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-6);
            assert!((pair[1] - pair[0]).abs() < 0.02);
        }
        assert!((output[47] - 0.5).abs() < 1e-5);
        assert!(!engine.is_crossfading());
        assert_eq!(loader.collect_garbage(), 1);
    }

    #[test]
    fn test_clear_returns_to_passthrough() {
        let mut engine = ConvolutionEngine::new(&config(32, 2, 0.0)).unwrap();
        let loader = engine.loader();
        loader.load_kernel(impulse_ir(0, 0.5));
        run(&mut engine, &mut [0.0; 32], &mut [0.0; 32]);
        assert!(!engine.is_passthrough());

        let generation = loader.reserve();
        assert!(loader.clear(generation).is_queued());
        let mut left = [0.7; 32];
        run(&mut engine, &mut left, &mut [0.0; 32]);
        assert!(engine.is_passthrough());
        assert!(left.iter().all(|&x| x == 0.7));
    }

    #[test]
    fn test_long_blocks_are_chunked() {
        let mut engine = ConvolutionEngine::new(&config(16, 1, 0.0)).unwrap();
        engine.loader().load_kernel(impulse_ir(40, 1.0));

        let mut mono = vec![0.0; 100];
        mono[10] = 1.0;
        let mut block = [mono.as_mut_slice()];
        engine.process(&mut block, 100);

        assert!((mono[50] - 1.0).abs() < 1e-5);
        assert!(mono[10].abs() < 1e-5);
    }

    #[test]
    fn test_extra_channels_are_silenced() {
        let mut engine = ConvolutionEngine::new(&config(16, 1, 0.0)).unwrap();
        let mut left = [0.3; 16];
        let mut right = [0.3; 16];
        run(&mut engine, &mut left, &mut right);
        assert!(left.iter().all(|&x| x == 0.3));
        assert!(right.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_prepare_rebuilds_for_new_shape() {
        let mut engine = ConvolutionEngine::new(&config(16, 1, 0.0)).unwrap();
        let loader = engine.loader();
        loader.load_kernel(impulse_ir(1, 0.5));
        run(&mut engine, &mut [0.0; 16], &mut [0.0; 16]);

        engine.prepare(ProcessSpec::new(48000.0, 128, 2)).unwrap();
        assert_eq!(loader.spec().channels, 2);
        assert_eq!(engine.installed_generation(), 1);
        assert_eq!(engine.kernel_len(), 2);

        let mut left = [0.0; 8];
        let mut right = [0.0; 8];
        right[0] = 1.0;
        run(&mut engine, &mut left, &mut right);
        assert!((right[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_prepare_rejects_invalid_spec() {
        let mut engine = ConvolutionEngine::new(&config(16, 2, 0.0)).unwrap();
        assert!(engine.prepare(ProcessSpec::new(48000.0, 0, 2)).is_err());
        assert_eq!(engine.spec().max_block_size, 16);
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut engine = ConvolutionEngine::new(&config(16, 1, 0.0)).unwrap();
        engine.loader().load_kernel(impulse_ir(20, 1.0));

        let mut left = [0.0; 16];
        left[0] = 1.0;
        run(&mut engine, &mut left, &mut [0.0; 16]);
        engine.reset();

        let mut left = [0.0; 16];
        run(&mut engine, &mut left, &mut [0.0; 16]);
        assert!(left.iter().all(|&x| x.abs() < 1e-6));
    }
}
