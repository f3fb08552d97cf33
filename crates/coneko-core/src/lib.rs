//! Core types shared by every Coneko subsystem.
//!
//! # Primary API
//!
//! - [`AudioBuffer`]: channel-major sample storage used for impulse responses
//! - [`ParameterStore`] / [`ParamId`]: the processor's parameter surface as atomic cells
//! - [`ParameterRange`]: min/max/step/skew metadata and normalised conversion
//! - [`SmoothedValue`]: per-sample linear ramps for zipper-free parameter changes
//! - [`ProcessSpec`] / [`ProcessorConfig`]: validated engine configuration
//!
//! Nothing in this crate allocates after construction except [`AudioBuffer`]
//! methods that explicitly return a new buffer.

pub mod error;
pub use error::{Error, Result};

mod buffer;
pub use buffer::AudioBuffer;

mod config;
pub use config::{ProcessSpec, ProcessorConfig, MAX_CHANNELS};

pub mod gain;
pub use gain::{db_to_gain, gain_to_db, MINUS_INFINITY_DB};

mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat, Generation};

mod parameter;
pub use parameter::ParameterRange;

mod params;
pub use params::{ParamId, ParameterStore, PARAM_COUNT};

mod smooth;
pub use smooth::SmoothedValue;
