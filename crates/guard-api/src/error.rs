//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use guard_engine::EngineError;
use guard_executor::ExecutorError;
use guard_monitor::MonitorError;
use guard_risk::RiskError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let msg = e.to_string();
        match e {
            EngineError::Config(_) | EngineError::Core(_) => Self::BadRequest(msg),
            EngineError::Risk(RiskError::InvalidProfile(_)) => Self::BadRequest(msg),
            EngineError::Risk(RiskError::UnknownUser(_)) => Self::NotFound(msg),
            EngineError::Monitor(MonitorError::InvalidOrder(_)) => Self::BadRequest(msg),
            EngineError::Monitor(MonitorError::NotFound(_)) => Self::NotFound(msg),
            EngineError::Monitor(
                MonitorError::NotPending { .. } | MonitorError::InvariantViolation { .. },
            ) => Self::Conflict(msg),
            EngineError::Monitor(MonitorError::DispatcherClosed) => Self::Unavailable(msg),
            EngineError::Executor(ExecutorError::Unauthorized) => Self::Unauthorized,
            EngineError::Executor(_) => Self::Internal(msg),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        EngineError::from(e).into()
    }
}
