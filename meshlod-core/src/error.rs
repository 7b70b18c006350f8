//! Error types for meshlod

use thiserror::Error;

/// Main error type for meshlod operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Work queue is shut down")]
    QueueShutDown,
}

/// Result type alias for meshlod operations
pub type Result<T> = std::result::Result<T, Error>;
