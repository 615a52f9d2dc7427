//! Trade guardrail service.
//!
//! Wires the engine to a broker, the audit sink, the tick dispatcher,
//! the expiry sweeper and the HTTP surface.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
