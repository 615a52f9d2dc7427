//! Trade guardrail engine facade.
//!
//! [`GuardrailEngine`] is the single entry point used by the HTTP surface
//! and the daemon: trade validation and execution, conditional order
//! registration, kill switch control, audit queries and risk profiles.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use config::{EngineConfig, KillSwitchConfig, RiskConfig, UserProfileConfig};
pub use engine::{GuardrailEngine, SessionInfo};
pub use error::{EngineError, EngineResult};
pub use pipeline::{ExecutionPipeline, ExecutionReport};
