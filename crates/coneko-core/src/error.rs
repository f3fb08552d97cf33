//! Error types for coneko-core.

use thiserror::Error;

/// Error type for coneko-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid process spec: {0}")]
    InvalidSpec(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown parameter key: {0}")]
    UnknownParameter(String),

    #[error("Interleaved data of {len} samples does not divide into {channels} channels")]
    InterleavedLength { len: usize, channels: usize },

    #[error("Channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
