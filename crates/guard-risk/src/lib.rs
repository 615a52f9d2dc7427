//! Risk controls for the trade guardrail engine.
//!
//! Implements the checks every trade intent must pass before it can reach
//! the broker, evaluated in a fixed order:
//! - Halted: kill switch triggered
//! - InvalidIntent: non-positive size or price, or unrepresentable risk
//! - NoProfile: user has no risk profile
//! - PositionSize: size above the profile maximum
//! - MissingStopLoss / MissingTakeProfit: mandatory levels absent
//! - OpenPositions: open position slots exhausted
//! - DailyLoss: projected daily loss beyond the limit
//! - Drawdown: projected drawdown from the equity peak beyond the limit
//! - StopDistance: stop-loss closer to entry than the configured minimum
//!
//! Also provides:
//! - RiskLedger: per-user profile, daily stats and open positions
//! - GuardrailService: per-user critical section around validation
//! - KillSwitchBoard: per-user halt latches

pub mod error;
pub mod guardrail;
pub mod kill_switch;
pub mod profile;
pub mod validator;

pub use error::{RiskError, RiskResult};
pub use guardrail::{Admission, GuardrailService};
pub use kill_switch::{
    CloseAllStatus, KillSwitchBoard, KillSwitchSnapshot, KillSwitchStatus, TriggerOutcome,
};
pub use profile::{DailyTradingStats, RiskAssessment, RiskLedger, RiskLevel, RiskProfile, UserRiskState};
pub use validator::{check_intent, evaluate, Decision, RejectCode, RejectReason};
