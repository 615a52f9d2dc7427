//! Prometheus metrics and structured logging for the guardrail engine.
//!
//! - Prometheus metrics for guardrail decisions, order transitions,
//!   kill-switch activity and broker attempts
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
