//! Real-time DSP stages for the Coneko convolution reverb.
//!
//! # Primary API
//!
//! - [`ConvolutionEngine`] / [`KernelLoader`]: zero-latency partitioned
//!   convolution with kernels built off the audio thread and swapped in
//!   lock-free
//! - [`FilterStage`]: low shelf followed by high shelf
//! - [`PreDelay`], [`StereoWidth`], [`DryWetMixer`], [`GainStage`]
//!
//! Every stage processes blocks of channels in place through the same shape
//! of call, `process(&mut [C], len)` with `C: AsMut<[f32]>`, and none of them
//! allocate after `new`/`prepare`.

pub mod error;
pub use error::{Error, Result};

mod convolution;
pub use convolution::{kernel_normalisation_gain, ConvolutionEngine, KernelLoader, LoadOutcome};

mod delay;
pub use delay::{PreDelay, MAX_PRE_DELAY_SECS};

mod filter;
pub use filter::{FilterStage, ShelfFilter, ShelfKind, MAX_SHELF_GAIN_DB, SHELF_Q};

mod gain;
pub use gain::GainStage;

mod mixer;
pub use mixer::DryWetMixer;

mod width;
pub use width::{StereoWidth, MAX_WIDTH};
