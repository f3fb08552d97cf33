//! Error types for coneko-ir.

use thiserror::Error;

/// Error type for IR preparation and the rebuild worker.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] coneko_core::Error),

    #[error("Failed to spawn rebuild worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Rebuild worker is not running")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, Error>;
