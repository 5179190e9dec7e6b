//! Application error types.
//!
//! These cover startup only. Failures during a run are reported in the run
//! record, never as an `AppError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Order error: {0}")]
    Order(#[from] roundbench_core::CoreError),

    #[error("REST client error: {0}")]
    Rest(#[from] roundbench_rest::RestError),
}

pub type AppResult<T> = Result<T, AppError>;
