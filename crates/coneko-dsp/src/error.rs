//! Error types for coneko-dsp.

use thiserror::Error;

/// Error type for DSP stage setup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] coneko_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
