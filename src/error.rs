use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Error taxonomy shared by every layer of the engine.
///
/// A failed call never leaves committed state on the substrate; outputs
/// already placed in the arena must not be read after an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("substrate error: {0}")]
    Substrate(String),
    #[error("commit conflict")]
    Conflict,
    #[error("fatal: {0}")]
    Fatal(&'static str),
}

impl StoreError {
    /// A commit-time conflict is the one failure worth retrying verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

impl From<std::collections::TryReserveError> for StoreError {
    fn from(_: std::collections::TryReserveError) -> Self {
        StoreError::OutOfMemory
    }
}
