//! Centralized error type for the coneko umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] coneko_core::Error),

    #[error("DSP: {0}")]
    Dsp(#[from] coneko_dsp::Error),

    #[error("IR: {0}")]
    Ir(#[from] coneko_ir::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
