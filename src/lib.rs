//! # Coneko - Convolution Reverb Engine
//!
//! Real-time convolution reverb built from modular subsystems.
//!
//! ## Architecture
//!
//! Coneko is an umbrella crate that coordinates:
//! - **coneko-core** - Buffers, parameters, smoothing, lock-free cells
//! - **coneko-dsp** - Hot-swappable convolution engine, shelves, pre-delay, width, mixing
//! - **coneko-ir** - IR preparation (normalize, trim, stretch, reverse) and background rebuilds
//!
//! The engine is split in two: a [`ConekoProcessor`] owned by the audio
//! thread and a [`ConekoController`] for everything else. They share the
//! parameter store, and new kernels reach the processor through a lock-free
//! hand-off, so the audio thread never waits on an IR rebuild.
//!
//! ## Quick Start
//!
//! ```no_run
//! use coneko::prelude::*;
//!
//! let (mut processor, controller) = ConekoProcessor::builder()
//!     .sample_rate(48000.0)
//!     .max_block_size(512)
//!     .build()?;
//!
//! // Control thread: load an IR and tweak parameters
//! let ir = AudioBuffer::from_channels(vec![vec![1.0, 0.6, 0.3]; 2], 48000.0);
//! controller.import_ir(ir)?;
//! controller.set_parameter(ParamId::DryWetMix, 35.0)?;
//! controller.set_parameter(ParamId::PreDelayTime, 20.0)?;
//!
//! // Audio thread: once per period
//! let mut block = [vec![0.0f32; 512], vec![0.0f32; 512]];
//! processor.process(&mut block);
//! # Ok::<(), coneko::Error>(())
//! ```

/// Re-export of coneko-core for direct access
pub use coneko_core as core;
/// Re-export of coneko-dsp for direct access
pub use coneko_dsp as dsp;
/// Re-export of coneko-ir for direct access
pub use coneko_ir as ir;

pub use coneko_core::{
    db_to_gain, gain_to_db, AudioBuffer, ParamId, ParameterRange, ParameterStore, ProcessSpec,
    ProcessorConfig,
};
pub use coneko_ir::{FftSize, RebuildTicket};

mod builder;
pub use builder::ConekoBuilder;

mod controller;
pub use controller::{ConekoController, KernelInfo};

pub mod error;
pub use error::{Error, Result};

mod processor;
pub use processor::ConekoProcessor;

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        AudioBuffer, ConekoBuilder, ConekoController, ConekoProcessor, Error, KernelInfo, ParamId,
        ProcessSpec, ProcessorConfig,
    };
}
