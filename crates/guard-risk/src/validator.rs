//! Guardrail checks.
//!
//! `evaluate` is a pure function of its inputs. Checks run in a fixed
//! order and the first failing check determines the rejection.

use crate::kill_switch::KillSwitchStatus;
use crate::profile::{DailyTradingStats, RiskProfile};
use guard_core::TradeIntent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable rejection code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    Halted,
    InvalidIntent,
    NoProfile,
    PositionSize,
    MissingStopLoss,
    MissingTakeProfit,
    OpenPositions,
    DailyLoss,
    Drawdown,
    StopDistance,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halted => "HALTED",
            Self::InvalidIntent => "INVALID_INTENT",
            Self::NoProfile => "NO_PROFILE",
            Self::PositionSize => "POSITION_SIZE",
            Self::MissingStopLoss => "MISSING_STOP_LOSS",
            Self::MissingTakeProfit => "MISSING_TAKE_PROFIT",
            Self::OpenPositions => "OPEN_POSITIONS",
            Self::DailyLoss => "DAILY_LOSS",
            Self::Drawdown => "DRAWDOWN",
            Self::StopDistance => "STOP_DISTANCE",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection code plus a human explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReason {
    pub code: RejectCode,
    pub message: String,
}

impl RejectReason {
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Guardrail decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reasons", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Reject(Vec<RejectReason>),
}

impl Decision {
    pub fn reject(code: RejectCode, message: impl Into<String>) -> Self {
        Self::Reject(vec![RejectReason::new(code, message)])
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn reasons(&self) -> &[RejectReason] {
        match self {
            Self::Allow => &[],
            Self::Reject(reasons) => reasons,
        }
    }

    /// Code of the deciding check, if rejected.
    pub fn code(&self) -> Option<RejectCode> {
        self.reasons().first().map(|r| r.code)
    }
}

/// Projected loss of the intent as a percentage of current equity.
///
/// `None` when equity is not positive or the figure overflows.
pub fn projected_loss_pct(intent: &TradeIntent, stats: &DailyTradingStats) -> Option<Decimal> {
    if stats.current_equity <= Decimal::ZERO {
        return None;
    }
    intent
        .risk_amount()?
        .checked_div(stats.current_equity)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Drawdown from the equity peak if the intent's full risk is lost.
pub fn projected_drawdown_pct(intent: &TradeIntent, stats: &DailyTradingStats) -> Option<Decimal> {
    if stats.peak_equity <= Decimal::ZERO {
        return None;
    }
    let equity_after = stats.current_equity.checked_sub(intent.risk_amount()?)?;
    stats
        .peak_equity
        .checked_sub(equity_after)?
        .checked_div(stats.peak_equity)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Structural check run before any limit: positive size and prices, and
/// a risk amount that can be computed.
pub fn check_intent(intent: &TradeIntent) -> Option<RejectReason> {
    if let Some(defect) = intent.defect() {
        return Some(RejectReason::new(RejectCode::InvalidIntent, defect));
    }
    if intent.risk_amount().is_none() {
        return Some(RejectReason::new(
            RejectCode::InvalidIntent,
            format!(
                "Risk of {} at {} is out of range",
                intent.position_size, intent.entry_price
            ),
        ));
    }
    None
}

/// Run the guardrail checks in order.
pub fn evaluate(
    intent: &TradeIntent,
    profile: &RiskProfile,
    stats: &DailyTradingStats,
    open_positions: u32,
    kill_switch: KillSwitchStatus,
) -> Decision {
    if kill_switch == KillSwitchStatus::Triggered {
        return Decision::reject(
            RejectCode::Halted,
            "Kill switch active, all trading disabled",
        );
    }

    if let Some(reason) = check_intent(intent) {
        return Decision::Reject(vec![reason]);
    }

    if intent.position_size > profile.max_trade_size {
        return Decision::reject(
            RejectCode::PositionSize,
            format!(
                "Position size {} exceeds max {}",
                intent.position_size, profile.max_trade_size
            ),
        );
    }

    if profile.mandatory_stop_loss && intent.stop_loss.is_none() {
        return Decision::reject(
            RejectCode::MissingStopLoss,
            "Stop-loss is mandatory but not set",
        );
    }
    if profile.mandatory_take_profit && intent.take_profit.is_none() {
        return Decision::reject(
            RejectCode::MissingTakeProfit,
            "Take-profit is mandatory but not set",
        );
    }

    if open_positions >= profile.max_open_positions {
        return Decision::reject(
            RejectCode::OpenPositions,
            format!(
                "Already {open_positions} open positions (max {})",
                profile.max_open_positions
            ),
        );
    }

    let Some(loss_pct) = projected_loss_pct(intent, stats) else {
        return Decision::reject(
            RejectCode::DailyLoss,
            "Projected loss cannot be measured against current equity",
        );
    };
    let projected_pl = stats.cumulative_pl_pct - loss_pct;
    if projected_pl < -profile.daily_loss_limit_pct {
        return Decision::reject(
            RejectCode::DailyLoss,
            format!(
                "Daily P/L {}% minus projected loss {}% breaches limit -{}%",
                stats.cumulative_pl_pct.round_dp(4),
                loss_pct.round_dp(4),
                profile.daily_loss_limit_pct
            ),
        );
    }

    match projected_drawdown_pct(intent, stats) {
        Some(dd) if dd > profile.max_drawdown_pct => {
            return Decision::reject(
                RejectCode::Drawdown,
                format!(
                    "Projected drawdown {}% exceeds max {}%",
                    dd.round_dp(4),
                    profile.max_drawdown_pct
                ),
            );
        }
        None => {
            return Decision::reject(
                RejectCode::Drawdown,
                "Projected drawdown cannot be measured against the equity peak",
            );
        }
        _ => {}
    }

    if let (Some(min_pct), Some(stop)) = (profile.min_stop_distance_pct, intent.stop_loss) {
        let distance = intent
            .entry_price
            .distance_pct(stop)
            .unwrap_or(Decimal::ZERO);
        if distance < min_pct {
            return Decision::reject(
                RejectCode::StopDistance,
                format!(
                    "Stop-loss {}% from entry, minimum {}%",
                    distance.round_dp(4),
                    min_pct
                ),
            );
        }
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use guard_core::{Pair, Price, Size, TradeAction, UserId};
    use rust_decimal_macros::dec;

    fn stats(equity: Decimal) -> DailyTradingStats {
        DailyTradingStats::new(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), equity)
    }

    fn intent(size: Decimal, entry: Decimal, stop: Option<Decimal>) -> TradeIntent {
        let mut intent = TradeIntent::manual(
            UserId::from("u1"),
            Pair::parse("EUR/USD").unwrap(),
            TradeAction::Buy,
            Size::new(size),
            Price::new(entry),
            Utc::now(),
        )
        .with_take_profit(Price::new(entry + dec!(0.02)));
        if let Some(s) = stop {
            intent = intent.with_stop_loss(Price::new(s));
        }
        intent
    }

    fn profile() -> RiskProfile {
        RiskProfile {
            max_trade_size: Size::new(dec!(100000)),
            daily_loss_limit_pct: dec!(2.0),
            max_open_positions: 3,
            max_drawdown_pct: dec!(10),
            mandatory_stop_loss: true,
            mandatory_take_profit: true,
            min_stop_distance_pct: None,
        }
    }

    #[test]
    fn test_allow_within_limits() {
        let i = intent(dec!(10000), dec!(1.1000), Some(dec!(1.0900)));
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d, Decision::Allow);
    }

    #[test]
    fn test_position_size_rejected() {
        let i = intent(dec!(150000), dec!(1.1000), Some(dec!(1.0900)));
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::PositionSize));
    }

    #[test]
    fn test_position_size_wins_over_later_checks() {
        // Also missing stop-loss, no slots and broke: size check fires first.
        let i = intent(dec!(150000), dec!(1.1000), None);
        let d = evaluate(&i, &profile(), &stats(dec!(1)), 99, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::PositionSize));
        assert_eq!(d.reasons().len(), 1);
    }

    #[test]
    fn test_halted_is_checked_first() {
        let i = intent(dec!(150000), dec!(1.1000), None);
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Triggered);
        assert_eq!(d.code(), Some(RejectCode::Halted));
    }

    #[test]
    fn test_negative_size_rejected_before_limits() {
        let i = intent(dec!(-5000000), dec!(1.1000), Some(dec!(0.5)));
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::InvalidIntent));
        assert!(d.reasons()[0].message.contains("position size"));
    }

    #[test]
    fn test_non_positive_prices_rejected() {
        let zero_entry = intent(dec!(1000), dec!(0), Some(dec!(0.5)));
        let d = evaluate(&zero_entry, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::InvalidIntent));

        let negative_stop = intent(dec!(1000), dec!(1.1000), Some(dec!(-1)));
        let d = evaluate(&negative_stop, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::InvalidIntent));
    }

    #[test]
    fn test_overflowing_risk_rejected_without_panic() {
        let entry = Decimal::from_scientific("1e28").unwrap();
        let mut i = intent(dec!(50000), dec!(1), Some(dec!(1)));
        i.entry_price = Price::new(entry);
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::InvalidIntent));

        // Computable risk that still overflows the percentage math.
        let tiny_equity = DailyTradingStats::new(
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            dec!(0.0000000000000000000000000001),
        );
        let i = intent(dec!(1000), dec!(1.1000), Some(dec!(1.0900)));
        assert!(projected_loss_pct(&i, &tiny_equity).is_none());
        let d = evaluate(&i, &profile(), &tiny_equity, 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::DailyLoss));
    }

    #[test]
    fn test_missing_levels() {
        let i = intent(dec!(1000), dec!(1.1000), None);
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::MissingStopLoss));

        let mut i = intent(dec!(1000), dec!(1.1000), Some(dec!(1.09)));
        i.take_profit = None;
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::MissingTakeProfit));

        let relaxed = RiskProfile {
            mandatory_take_profit: false,
            ..profile()
        };
        let d = evaluate(&i, &relaxed, &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert!(d.is_allow());
    }

    #[test]
    fn test_open_positions_limit() {
        let i = intent(dec!(1000), dec!(1.1000), Some(dec!(1.09)));
        let d = evaluate(&i, &profile(), &stats(dec!(100000)), 3, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::OpenPositions));
    }

    #[test]
    fn test_daily_loss_example() {
        // Limit 2.0%, already -1.8%, intent risks 0.5% of equity.
        let mut s = stats(dec!(100000));
        s.cumulative_pl_pct = dec!(-1.8);
        // 50000 units * 0.01 distance = 500 = 0.5% of 100000.
        let i = intent(dec!(50000), dec!(1.1000), Some(dec!(1.0900)));
        assert_eq!(projected_loss_pct(&i, &s), Some(dec!(0.5)));

        let d = evaluate(&i, &profile(), &s, 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::DailyLoss));
    }

    #[test]
    fn test_daily_loss_boundary_is_allowed() {
        let mut s = stats(dec!(100000));
        s.cumulative_pl_pct = dec!(-1.5);
        let i = intent(dec!(50000), dec!(1.1000), Some(dec!(1.0900)));
        let d = evaluate(&i, &profile(), &s, 0, KillSwitchStatus::Armed);
        assert!(d.is_allow());
    }

    #[test]
    fn test_no_stop_loss_risks_full_notional() {
        let relaxed = RiskProfile {
            mandatory_stop_loss: false,
            daily_loss_limit_pct: dec!(100),
            ..profile()
        };
        // Notional 11000 on 100000 equity = 11% drawdown > 10%.
        let i = intent(dec!(10000), dec!(1.1000), None);
        let d = evaluate(&i, &relaxed, &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::Drawdown));
    }

    #[test]
    fn test_drawdown_from_peak() {
        let mut s = stats(dec!(100000));
        s.peak_equity = dec!(110000);
        // Already 9.09% below peak; another 1000 at risk pushes past 10%.
        let i = intent(dec!(100000), dec!(1.1000), Some(dec!(1.0890)));
        let loose = RiskProfile {
            daily_loss_limit_pct: dec!(50),
            ..profile()
        };
        let d = evaluate(&i, &loose, &s, 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::Drawdown));
    }

    #[test]
    fn test_stop_distance_minimum() {
        let strict = RiskProfile {
            min_stop_distance_pct: Some(dec!(0.5)),
            ..profile()
        };
        let tight = intent(dec!(1000), dec!(1.1000), Some(dec!(1.0990)));
        let d = evaluate(&tight, &strict, &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert_eq!(d.code(), Some(RejectCode::StopDistance));

        let wide = intent(dec!(1000), dec!(1.1000), Some(dec!(1.0945)));
        let d = evaluate(&wide, &strict, &stats(dec!(100000)), 0, KillSwitchStatus::Armed);
        assert!(d.is_allow());
    }

    #[test]
    fn test_decision_serde_shape() {
        let d = Decision::reject(RejectCode::PositionSize, "too big");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["decision"], "REJECT");
        assert_eq!(json["reasons"][0]["code"], "POSITION_SIZE");

        let json = serde_json::to_value(Decision::Allow).unwrap();
        assert_eq!(json["decision"], "ALLOW");
    }
}
