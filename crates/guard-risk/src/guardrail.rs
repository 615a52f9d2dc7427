//! Guardrail service.
//!
//! Wraps the pure `evaluate` in a per-user critical section. Every read
//! and mutation of a user's stats, and every audit entry for a decision,
//! happens while holding that user's async mutex, so two submissions from
//! one user can never both pass on a stale view. Different users proceed
//! in parallel.

use crate::error::{RiskError, RiskResult};
use crate::kill_switch::{KillSwitchBoard, KillSwitchStatus};
use crate::profile::{DailyTradingStats, RiskAssessment, RiskLedger, RiskProfile};
use crate::validator::{check_intent, evaluate, Decision, RejectCode};
use dashmap::DashMap;
use guard_core::{Clock, TradeIntent, UserId};
use guard_persistence::{AuditActor, AuditEvent, AuditLog, AuditRecord};
use guard_telemetry::Metrics;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Decision plus whether an open-position slot was reserved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub decision: Decision,
    pub reserved: bool,
}

pub struct GuardrailService {
    ledger: Arc<RiskLedger>,
    board: Arc<KillSwitchBoard>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl GuardrailService {
    pub fn new(
        ledger: Arc<RiskLedger>,
        board: Arc<KillSwitchBoard>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            board,
            audit,
            clock,
            user_locks: DashMap::new(),
        }
    }

    pub fn board(&self) -> &Arc<KillSwitchBoard> {
        &self.board
    }

    pub fn ledger(&self) -> &Arc<RiskLedger> {
        &self.ledger
    }

    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.user_locks
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Validate an intent. The decision is audited; nothing is reserved.
    pub async fn validate_trade(&self, intent: &TradeIntent) -> Decision {
        self.decide(intent, false).await.decision
    }

    /// Validate an intent that is about to be executed.
    ///
    /// An ALLOW takes an open-position slot inside the critical section.
    /// Release it with `release_slot` if execution does not fill.
    pub async fn admit_trade(&self, intent: &TradeIntent) -> Admission {
        self.decide(intent, true).await
    }

    async fn decide(&self, intent: &TradeIntent, reserve: bool) -> Admission {
        let lock = self.user_lock(&intent.user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let kill_switch = self.board.status(&intent.user_id);

        let mut decision = if kill_switch == KillSwitchStatus::Triggered {
            Decision::reject(
                RejectCode::Halted,
                "Kill switch active, all trading disabled",
            )
        } else if let Some(reason) = check_intent(intent) {
            Decision::Reject(vec![reason])
        } else {
            match self.ledger.state(&intent.user_id, now.date_naive()) {
                None => Decision::reject(
                    RejectCode::NoProfile,
                    format!("No risk profile configured for user {}", intent.user_id),
                ),
                Some(state) => evaluate(
                    intent,
                    &state.profile,
                    &state.stats,
                    state.open_positions,
                    kill_switch,
                ),
            }
        };

        let mut reserved = false;
        if reserve && decision.is_allow() {
            match self.ledger.reserve_slot(&intent.user_id) {
                Ok(_) => reserved = true,
                Err(e) => {
                    error!(user_id = %intent.user_id, intent_id = %intent.id, error = %e, "Slot reservation failed");
                    let code = match &e {
                        RiskError::SlotsExhausted { .. } => RejectCode::OpenPositions,
                        _ => RejectCode::NoProfile,
                    };
                    decision = Decision::reject(code, e.to_string());
                }
            }
        }

        let record = match &decision {
            Decision::Allow => {
                Metrics::trade_allowed();
                AuditRecord::new(
                    AuditActor::Guardrail,
                    &intent.user_id,
                    intent.id.as_str(),
                    AuditEvent::TradeAllowed,
                    now,
                )
            }
            Decision::Reject(reasons) => {
                if let Some(first) = reasons.first() {
                    Metrics::trade_rejected(first.code.as_str());
                }
                AuditRecord::new(
                    AuditActor::Guardrail,
                    &intent.user_id,
                    intent.id.as_str(),
                    AuditEvent::TradeRejected,
                    now,
                )
                .with_reasons(reasons.iter().map(ToString::to_string))
            }
        };
        self.audit.record(record);

        debug!(
            user_id = %intent.user_id,
            intent_id = %intent.id,
            pair = %intent.pair,
            allow = decision.is_allow(),
            code = ?decision.code(),
            reserved,
            "Guardrail decision"
        );

        Admission { decision, reserved }
    }

    /// Give back a slot taken by `admit_trade`.
    pub async fn release_slot(&self, user_id: &UserId) -> RiskResult<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.ledger.release_slot(user_id).map(|_| ())
    }

    /// Count a filled trade and bind its broker position to the slot
    /// taken at admission.
    pub async fn confirm_fill(&self, user_id: &UserId, position_id: &str) -> RiskResult<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.ledger
            .record_trade_opened(user_id, position_id, self.clock.now().date_naive())
    }

    /// Free the slot of a broker position closed outside a normal trade
    /// close. Untracked positions are ignored.
    pub async fn release_position(&self, user_id: &UserId, position_id: &str) -> RiskResult<bool> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let released = self.ledger.release_position(user_id, position_id)?;
        if !released {
            debug!(user_id = %user_id, position_id, "Closed position was not tracked");
        }
        Ok(released)
    }

    /// Apply a closed trade's realized P/L.
    pub async fn record_trade_closed(
        &self,
        user_id: &UserId,
        pnl: Decimal,
    ) -> RiskResult<DailyTradingStats> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let stats = self
            .ledger
            .record_trade_closed(user_id, pnl, self.clock.now().date_naive())?;
        info!(user_id = %user_id, pnl = %pnl, cumulative_pl_pct = %stats.cumulative_pl_pct, "Trade closed");
        Ok(stats)
    }

    pub async fn configure_profile(
        &self,
        user_id: &UserId,
        profile: RiskProfile,
        equity: Option<Decimal>,
    ) -> RiskResult<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.ledger
            .configure(user_id, profile, equity, self.clock.now().date_naive())
    }

    pub async fn assessment(&self, user_id: &UserId) -> RiskResult<RiskAssessment> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        if !self.ledger.is_configured(user_id) {
            return Err(RiskError::UnknownUser(user_id.clone()));
        }
        self.ledger.assessment(
            user_id,
            self.clock.now().date_naive(),
            self.board.is_triggered(user_id),
        )
    }
}
