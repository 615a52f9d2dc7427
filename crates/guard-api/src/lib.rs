//! HTTP surface for the trade guardrail engine.
//!
//! Thin JSON handlers over [`guard_engine::GuardrailEngine`]; domain errors
//! map to status codes in [`error`].

pub mod config;
pub mod error;
pub mod server;
pub mod types;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::{create_router, run_server, AppState, OPERATOR_TOKEN_HEADER};
