//! Risk profiles, daily trading stats and the per-user risk ledger.

use crate::error::{RiskError, RiskResult};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use guard_core::{Size, UserId};
use guard_persistence::{InMemoryStore, RecordStore};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// User risk limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Maximum position size per trade, in units.
    #[serde(default = "default_max_trade_size")]
    pub max_trade_size: Size,
    /// Daily loss limit as a percentage of equity.
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: Decimal,
    /// Maximum number of concurrently open positions.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: u32,
    /// Maximum drawdown from the equity peak, in percent.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    #[serde(default = "default_true")]
    pub mandatory_stop_loss: bool,
    #[serde(default = "default_true")]
    pub mandatory_take_profit: bool,
    /// Minimum stop-loss distance from entry, in percent of entry.
    #[serde(default)]
    pub min_stop_distance_pct: Option<Decimal>,
}

fn default_max_trade_size() -> Size {
    Size::new(Decimal::from(10_000))
}

fn default_daily_loss_limit_pct() -> Decimal {
    Decimal::from(10)
}

fn default_max_open_positions() -> u32 {
    5
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::from(20)
}

fn default_true() -> bool {
    true
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            max_trade_size: default_max_trade_size(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            max_open_positions: default_max_open_positions(),
            max_drawdown_pct: default_max_drawdown_pct(),
            mandatory_stop_loss: true,
            mandatory_take_profit: true,
            min_stop_distance_pct: None,
        }
    }
}

fn check_pct(name: &str, value: Decimal) -> RiskResult<()> {
    if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(RiskError::InvalidProfile(format!(
            "{name} must be in (0, 100], got {value}"
        )));
    }
    Ok(())
}

impl RiskProfile {
    /// Validate limits: all positive, percentages in (0, 100].
    pub fn validate(&self) -> RiskResult<()> {
        if !self.max_trade_size.is_positive() {
            return Err(RiskError::InvalidProfile(format!(
                "max_trade_size must be positive, got {}",
                self.max_trade_size
            )));
        }
        if self.max_open_positions == 0 {
            return Err(RiskError::InvalidProfile(
                "max_open_positions must be positive".to_string(),
            ));
        }
        check_pct("daily_loss_limit_pct", self.daily_loss_limit_pct)?;
        check_pct("max_drawdown_pct", self.max_drawdown_pct)?;
        if let Some(min_stop) = self.min_stop_distance_pct {
            check_pct("min_stop_distance_pct", min_stop)?;
        }
        Ok(())
    }
}

/// Trading statistics for one user and one UTC day.
///
/// Replaced, not mutated, at the day boundary: `rolled_to` builds the next
/// day's record with counts and P/L reset and equity carried over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTradingStats {
    pub day: NaiveDate,
    pub trade_count: u32,
    pub win_count: u32,
    pub loss_count: u32,
    pub cumulative_pl_pct: Decimal,
    pub peak_equity: Decimal,
    pub current_equity: Decimal,
    pub current_drawdown_pct: Decimal,
}

impl DailyTradingStats {
    pub fn new(day: NaiveDate, equity: Decimal) -> Self {
        Self {
            day,
            trade_count: 0,
            win_count: 0,
            loss_count: 0,
            cumulative_pl_pct: Decimal::ZERO,
            peak_equity: equity,
            current_equity: equity,
            current_drawdown_pct: Decimal::ZERO,
        }
    }

    /// Record for `day`. Returns a clone when already on that day.
    #[must_use]
    pub fn rolled_to(&self, day: NaiveDate) -> Self {
        if day <= self.day {
            return self.clone();
        }
        let mut next = Self::new(day, self.current_equity);
        next.peak_equity = self.peak_equity.max(self.current_equity);
        next.current_drawdown_pct = self.current_drawdown_pct;
        next
    }

    /// Apply a realized P/L amount from a closed trade.
    ///
    /// Leaves the stats untouched when any derived figure overflows.
    pub fn apply_close(&mut self, pnl: Decimal) -> RiskResult<()> {
        let out_of_range = || RiskError::OutOfRange(format!("realized P/L {pnl}"));

        let pl_pct = if self.current_equity > Decimal::ZERO {
            pnl.checked_div(self.current_equity)
                .and_then(|p| p.checked_mul(Decimal::ONE_HUNDRED))
                .and_then(|p| self.cumulative_pl_pct.checked_add(p))
                .ok_or_else(out_of_range)?
        } else {
            self.cumulative_pl_pct
        };
        let equity = self.current_equity.checked_add(pnl).ok_or_else(out_of_range)?;
        let peak = self.peak_equity.max(equity);
        let drawdown = drawdown_pct(peak, equity).ok_or_else(out_of_range)?;

        self.cumulative_pl_pct = pl_pct;
        self.current_equity = equity;
        self.peak_equity = peak;
        self.current_drawdown_pct = drawdown;
        if pnl > Decimal::ZERO {
            self.win_count += 1;
        } else {
            self.loss_count += 1;
        }
        Ok(())
    }

    /// Win rate over trades closed today, in percent.
    pub fn win_rate_pct(&self) -> Decimal {
        let closed = self.win_count + self.loss_count;
        if closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.win_count) / Decimal::from(closed) * Decimal::ONE_HUNDRED
    }
}

fn drawdown_pct(peak: Decimal, equity: Decimal) -> Option<Decimal> {
    if peak <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    let pct = peak
        .checked_sub(equity)?
        .checked_div(peak)?
        .checked_mul(Decimal::ONE_HUNDRED)?;
    Some(pct.max(Decimal::ZERO))
}

/// Everything the guardrail needs to know about one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRiskState {
    pub profile: RiskProfile,
    pub stats: DailyTradingStats,
    pub open_positions: u32,
    /// Broker position ids of fills admitted by the guardrail.
    #[serde(default)]
    pub tracked_positions: BTreeSet<String>,
}

impl UserRiskState {
    fn roll(&mut self, day: NaiveDate) {
        if day > self.stats.day {
            debug!(from = %self.stats.day, to = %day, "Rolling daily stats");
            self.stats = self.stats.rolled_to(day);
        }
    }
}

/// Risk level derived from current usage of the profile limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Moderate,
    High,
    Extreme,
}

impl RiskLevel {
    /// Score the user's state.
    ///
    /// +2 when daily P/L is below half the loss limit, +1 when more than
    /// 70% of position slots are used, +1 for more than 3 losing trades.
    pub fn assess(state: &UserRiskState) -> Self {
        let mut score = 0;
        let half_limit = state.profile.daily_loss_limit_pct / Decimal::TWO;
        if state.stats.cumulative_pl_pct < -half_limit {
            score += 2;
        }
        let slots_pct = Decimal::from(state.open_positions) * Decimal::ONE_HUNDRED
            / Decimal::from(state.profile.max_open_positions.max(1));
        if slots_pct > Decimal::from(70) {
            score += 1;
        }
        if state.stats.loss_count > 3 {
            score += 1;
        }
        match score {
            0 => Self::Safe,
            1 => Self::Moderate,
            2 => Self::High,
            _ => Self::Extreme,
        }
    }
}

/// Risk snapshot for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub user_id: UserId,
    pub risk_level: RiskLevel,
    pub kill_switch_active: bool,
    pub profile: RiskProfile,
    pub open_positions: u32,
    pub stats: DailyTradingStats,
    pub win_rate_pct: Decimal,
}

/// Per-user risk state store: profile, daily stats and open positions.
pub struct RiskLedger {
    store: InMemoryStore<UserId, UserRiskState>,
    default_equity: Decimal,
}

impl RiskLedger {
    /// Create a ledger. `default_equity` seeds users configured without
    /// an explicit equity figure.
    pub fn new(default_equity: Decimal) -> Self {
        Self {
            store: InMemoryStore::new(),
            default_equity,
        }
    }

    /// Set or replace a user's profile.
    ///
    /// Stats and open positions of an existing user are kept. `equity`,
    /// when given, syncs the current account equity.
    pub fn configure(
        &self,
        user_id: &UserId,
        profile: RiskProfile,
        equity: Option<Decimal>,
        today: NaiveDate,
    ) -> RiskResult<()> {
        profile.validate()?;
        if let Some(eq) = equity {
            if eq <= Decimal::ZERO {
                return Err(RiskError::InvalidProfile(format!(
                    "equity must be positive, got {eq}"
                )));
            }
        }

        let seed = equity.unwrap_or(self.default_equity);
        self.store.upsert(
            user_id.clone(),
            || UserRiskState {
                profile: profile.clone(),
                stats: DailyTradingStats::new(today, seed),
                open_positions: 0,
                tracked_positions: BTreeSet::new(),
            },
            |state| {
                state.profile = profile.clone();
                state.roll(today);
                if let Some(eq) = equity {
                    state.stats.current_equity = eq;
                    state.stats.peak_equity = state.stats.peak_equity.max(eq);
                    // peak >= eq > 0, so the ratio is within 0..100.
                    state.stats.current_drawdown_pct =
                        drawdown_pct(state.stats.peak_equity, eq).unwrap_or(Decimal::ZERO);
                }
            },
        );

        info!(user_id = %user_id, max_trade_size = %profile.max_trade_size, "Risk profile configured");
        Ok(())
    }

    /// Current state, rolled to `today`.
    pub fn state(&self, user_id: &UserId, today: NaiveDate) -> Option<UserRiskState> {
        self.store.update(user_id, |state| {
            state.roll(today);
            state.clone()
        })
    }

    pub fn is_configured(&self, user_id: &UserId) -> bool {
        self.store.contains(user_id)
    }

    /// Take one open-position slot. Refused once the profile's limit is
    /// reached.
    pub fn reserve_slot(&self, user_id: &UserId) -> RiskResult<u32> {
        self.store
            .update(user_id, |state| {
                let max = state.profile.max_open_positions;
                if state.open_positions >= max {
                    return Err(RiskError::SlotsExhausted {
                        user_id: user_id.clone(),
                        max,
                    });
                }
                state.open_positions += 1;
                Ok(state.open_positions)
            })
            .ok_or_else(|| RiskError::UnknownUser(user_id.clone()))?
    }

    /// Free one open-position slot.
    pub fn release_slot(&self, user_id: &UserId) -> RiskResult<u32> {
        self.store
            .update(user_id, |state| {
                state.open_positions = state.open_positions.saturating_sub(1);
                state.open_positions
            })
            .ok_or_else(|| RiskError::UnknownUser(user_id.clone()))
    }

    /// Count a filled trade in today's stats and track its broker
    /// position against the slot reserved at admission.
    pub fn record_trade_opened(
        &self,
        user_id: &UserId,
        position_id: &str,
        today: NaiveDate,
    ) -> RiskResult<()> {
        self.store
            .update(user_id, |state| {
                state.roll(today);
                state.stats.trade_count += 1;
                state.tracked_positions.insert(position_id.to_string());
            })
            .ok_or_else(|| RiskError::UnknownUser(user_id.clone()))
    }

    /// Free the slot held by a tracked broker position.
    ///
    /// Returns `false`, changing nothing, for positions the guardrail never
    /// admitted or already released.
    pub fn release_position(&self, user_id: &UserId, position_id: &str) -> RiskResult<bool> {
        self.store
            .update(user_id, |state| {
                let tracked = state.tracked_positions.remove(position_id);
                if tracked {
                    state.open_positions = state.open_positions.saturating_sub(1);
                }
                tracked
            })
            .ok_or_else(|| RiskError::UnknownUser(user_id.clone()))
    }

    /// Apply a closed trade's realized P/L and free its slot.
    pub fn record_trade_closed(
        &self,
        user_id: &UserId,
        pnl: Decimal,
        today: NaiveDate,
    ) -> RiskResult<DailyTradingStats> {
        self.store
            .update(user_id, |state| {
                state.roll(today);
                state.stats.apply_close(pnl)?;
                state.open_positions = state.open_positions.saturating_sub(1);
                Ok(state.stats.clone())
            })
            .ok_or_else(|| RiskError::UnknownUser(user_id.clone()))?
    }

    /// Build a risk assessment.
    pub fn assessment(
        &self,
        user_id: &UserId,
        today: NaiveDate,
        kill_switch_active: bool,
    ) -> RiskResult<RiskAssessment> {
        let state = self
            .state(user_id, today)
            .ok_or_else(|| RiskError::UnknownUser(user_id.clone()))?;
        Ok(RiskAssessment {
            user_id: user_id.clone(),
            risk_level: RiskLevel::assess(&state),
            kill_switch_active,
            win_rate_pct: state.stats.win_rate_pct(),
            open_positions: state.open_positions,
            profile: state.profile,
            stats: state.stats,
        })
    }
}
