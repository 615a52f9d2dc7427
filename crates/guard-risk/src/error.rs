//! Risk error types.

use guard_core::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Invalid risk profile: {0}")]
    InvalidProfile(String),

    #[error("No risk profile configured for user {0}")]
    UnknownUser(UserId),

    #[error("User {user_id} already holds {max} open positions")]
    SlotsExhausted { user_id: UserId, max: u32 },

    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
