//! Two-stage partitioned FFT convolution and the kernel hand-off between
//! contexts.

mod engine;
mod kernel;
mod partitioned;
mod two_stage;

pub use engine::{ConvolutionEngine, KernelLoader, LoadOutcome};
pub use kernel::kernel_normalisation_gain;
