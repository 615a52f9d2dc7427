//! Executor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Network or broker-side transport failure. Retryable.
    #[error("Broker transport error: {0}")]
    Transport(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Unauthorized kill switch reset")]
    Unauthorized,

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
