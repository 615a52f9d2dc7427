//! Engine configuration.
//!
//! Every section has serde defaults, so an empty document is a valid
//! configuration.

use crate::error::{EngineError, EngineResult};
use guard_core::{SessionWindows, UserId};
use guard_executor::RetryPolicy;
use guard_monitor::MonitorConfig;
use guard_risk::RiskProfile;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub sessions: SessionWindows,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Broker submission retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub kill_switch: KillSwitchConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        self.sessions.validate()?;
        if self.risk.default_equity <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "risk.default_equity must be positive, got {}",
                self.risk.default_equity
            )));
        }
        for user in &self.risk.users {
            user.profile.validate().map_err(|e| {
                EngineError::Config(format!("risk profile for {}: {e}", user.user_id))
            })?;
        }
        if self.monitor.default_expiry_hours == 0 || self.monitor.session_order_hours == 0 {
            return Err(EngineError::Config(
                "monitor expiry windows must be at least one hour".to_string(),
            ));
        }
        if self.kill_switch.reset_token.as_deref() == Some("") {
            return Err(EngineError::Config(
                "kill_switch.reset_token must not be empty; omit it to disable resets".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Equity assumed for users configured without one.
    #[serde(default = "default_equity")]
    pub default_equity: Decimal,
    /// Profiles installed at startup.
    #[serde(default)]
    pub users: Vec<UserProfileConfig>,
}

fn default_equity() -> Decimal {
    Decimal::from(10_000)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_equity: default_equity(),
            users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileConfig {
    pub user_id: UserId,
    #[serde(default)]
    pub equity: Option<Decimal>,
    #[serde(default)]
    pub profile: RiskProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchConfig {
    /// Operator token required for resets. `None` disables resets.
    #[serde(default)]
    pub reset_token: Option<String>,
    /// Per-position retry policy for close-all.
    #[serde(default = "default_close_retry")]
    pub close_retry: RetryPolicy,
}

fn default_close_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        ..RetryPolicy::default()
    }
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            reset_token: None,
            close_retry: default_close_retry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.risk.default_equity, dec!(10000));
        assert_eq!(cfg.kill_switch.close_retry.max_attempts, 5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            [risk]
            default_equity = "50000"

            [[risk.users]]
            user_id = "alice"
            equity = "25000"
            [risk.users.profile]
            max_trade_size = "2000"
            mandatory_take_profit = false

            [sessions.asian]
            start_hour = 0
            end_hour = 7

            [monitor]
            default_expiry_hours = 6

            [retry]
            max_attempts = 4

            [kill_switch]
            reset_token = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.risk.default_equity, dec!(50000));
        let alice = &cfg.risk.users[0];
        assert_eq!(alice.user_id, UserId::from("alice"));
        assert_eq!(alice.equity, Some(dec!(25000)));
        assert!(!alice.profile.mandatory_take_profit);
        assert_eq!(alice.profile.max_open_positions, 5);
        assert_eq!(cfg.sessions.asian.end_hour, 7);
        assert_eq!(cfg.sessions.london.start_hour, 8);
        assert_eq!(cfg.monitor.default_expiry_hours, 6);
        assert_eq!(cfg.monitor.session_order_hours, 24);
        assert_eq!(cfg.retry.max_attempts, 4);
        assert_eq!(cfg.kill_switch.reset_token.as_deref(), Some("s3cret"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            [[risk.users]]
            user_id = "bob"
            [risk.users.profile]
            daily_loss_limit_pct = "150"
            "#,
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }
}
