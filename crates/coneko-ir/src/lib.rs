//! Impulse response preparation for Coneko.
//!
//! # Primary API
//!
//! - [`IrBuilder`]: resample, channel-match, normalize, trim, stretch and
//!   reverse an imported IR into the buffer the convolution kernel is built
//!   from
//! - [`PhaseVocoder`] / [`TimeStretcher`]: offline time-stretching
//! - [`RebuildWorker`] / [`IrState`]: background rebuilds with request
//!   coalescing, feeding a [`coneko_dsp::KernelLoader`]
//! - [`RebuildEdit`]: parameter edits that a finishing rebuild cannot
//!   publish over
//!
//! # Example
//!
//! ```
//! use coneko_core::AudioBuffer;
//! use coneko_ir::{BuildRequest, IrBuilder};
//!
//! let raw = AudioBuffer::mono(vec![0.0, 0.0, 1.0, 0.5, 0.25], 48000.0);
//! let built = IrBuilder::new().build(
//!     &raw,
//!     &BuildRequest {
//!         target_decay_secs: None,
//!         reverse: false,
//!         sample_rate: 48000.0,
//!         channels: 2,
//!     },
//! );
//! assert_eq!(built.ir.num_channels(), 2);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod builder;
pub use builder::{BuildRequest, BuiltIr, IrBuilder, TrimRange};

mod request;
pub use request::RebuildTicket;

pub mod stretch;
pub use stretch::{FftSize, PhaseVocoder, TimeStretcher};

mod worker;
pub use worker::{IrState, RebuildEdit, RebuildWorker};
