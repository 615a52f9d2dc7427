//! Engine error types.

use guard_core::CoreError;
use guard_executor::ExecutorError;
use guard_monitor::MonitorError;
use guard_risk::RiskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

pub type EngineResult<T> = Result<T, EngineError>;
