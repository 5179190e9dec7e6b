//! Error types for roundbench-core.

use thiserror::Error;

use crate::timing::Checkpoint;

/// Core error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A checkpoint was marked twice in the same run.
    ///
    /// Never expected in correct operation: it means the coordinator
    /// revisited a transition.
    #[error("Checkpoint already recorded: {0}")]
    DuplicateCheckpoint(Checkpoint),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid client order id: {0}")]
    InvalidClientOrderId(String),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
