//! Engine facade.
//!
//! Wires the guardrail, execution gateway, kill switch controller and
//! conditional order monitor around one audit log and one clock, and
//! exposes the operations callers use.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{ExecutionPipeline, ExecutionReport};
use chrono::{DateTime, Utc};
use guard_core::{
    Clock, MarketTick, OrderId, SessionProfile, TradeIntent, TradingSession, UserId,
};
use guard_executor::{BrokerExecution, ExecutionGateway, KillSwitchController};
use guard_monitor::{
    ConditionalOrderMonitor, OrderRequest, OrderStatus, OrderView, TickReport,
};
use guard_persistence::{AuditEntry, AuditLog};
use guard_risk::{
    DailyTradingStats, Decision, GuardrailService, KillSwitchBoard,
    KillSwitchSnapshot, RiskAssessment, RiskLedger, RiskProfile, TriggerOutcome,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Current trading session with its description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub at: DateTime<Utc>,
    pub session: TradingSession,
    pub next: TradingSession,
    pub profile: SessionProfile,
}

pub struct GuardrailEngine {
    pipeline: Arc<ExecutionPipeline>,
    guardrail: Arc<GuardrailService>,
    kill_switch: Arc<KillSwitchController>,
    monitor: Arc<ConditionalOrderMonitor>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl GuardrailEngine {
    /// Build the engine and install the configured user profiles.
    pub fn new(
        config: &EngineConfig,
        broker: Arc<dyn BrokerExecution>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let ledger = Arc::new(RiskLedger::new(config.risk.default_equity));
        let today = clock.now().date_naive();
        for user in &config.risk.users {
            ledger.configure(&user.user_id, user.profile.clone(), user.equity, today)?;
        }

        let board = Arc::new(KillSwitchBoard::new());
        let guardrail = Arc::new(GuardrailService::new(
            ledger,
            Arc::clone(&board),
            Arc::clone(&audit),
            Arc::clone(&clock),
        ));
        let kill_switch = Arc::new(KillSwitchController::new(
            Arc::clone(&board),
            Arc::clone(&broker),
            Arc::clone(&audit),
            Arc::clone(&clock),
            config.kill_switch.close_retry.clone(),
            config.kill_switch.reset_token.clone(),
        ));
        let gateway = ExecutionGateway::new(
            broker,
            config.retry.clone(),
            board,
            Arc::clone(&audit),
            Arc::clone(&clock),
        );
        let pipeline = Arc::new(ExecutionPipeline::new(
            Arc::clone(&guardrail),
            gateway,
            Arc::clone(&kill_switch),
            Arc::clone(&audit),
            Arc::clone(&clock),
        ));
        let monitor = Arc::new(ConditionalOrderMonitor::new(
            pipeline.clone(),
            Arc::clone(&audit),
            Arc::clone(&clock),
            config.sessions,
            config.monitor.clone(),
        ));

        info!(
            users = config.risk.users.len(),
            default_equity = %config.risk.default_equity,
            resets_enabled = config.kill_switch.reset_token.is_some(),
            "Guardrail engine initialized"
        );

        Ok(Self {
            pipeline,
            guardrail,
            kill_switch,
            monitor,
            audit,
            clock,
        })
    }

    pub fn monitor(&self) -> &Arc<ConditionalOrderMonitor> {
        &self.monitor
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    /// Dry-run validation. Audited; reserves nothing.
    pub async fn validate_trade(&self, intent: &TradeIntent) -> Decision {
        self.guardrail.validate_trade(intent).await
    }

    /// Validate and, on ALLOW, submit to the broker.
    pub async fn execute_trade(&self, intent: &TradeIntent) -> ExecutionReport {
        self.pipeline.execute(intent).await
    }

    // ------------------------------------------------------------------
    // Conditional orders
    // ------------------------------------------------------------------

    pub fn register_conditional_order(&self, request: OrderRequest) -> EngineResult<OrderId> {
        Ok(self.monitor.register(request)?)
    }

    pub fn register_time_bound_order(
        &self,
        request: OrderRequest,
        hours: u32,
    ) -> EngineResult<OrderId> {
        Ok(self.monitor.register_time_bound(request, hours)?)
    }

    pub fn register_session_order(
        &self,
        request: OrderRequest,
        session: TradingSession,
    ) -> EngineResult<OrderId> {
        Ok(self.monitor.register_session_aware(request, session)?)
    }

    pub fn cancel_order(&self, id: &OrderId) -> EngineResult<()> {
        Ok(self.monitor.cancel(id)?)
    }

    pub fn order_status(&self, id: &OrderId) -> EngineResult<OrderStatus> {
        Ok(self.monitor.status(id)?)
    }

    pub fn order(&self, id: &OrderId) -> EngineResult<OrderView> {
        Ok(self.monitor.order(id)?)
    }

    pub fn active_orders(&self, user_id: &UserId) -> Vec<OrderView> {
        self.monitor.active_orders(user_id)
    }

    pub fn order_history(&self, user_id: &UserId) -> Vec<OrderView> {
        self.monitor.history(user_id)
    }

    /// Evaluate a tick inline. Feeds from many pairs should go through a
    /// `TickDispatcher` instead.
    pub async fn on_market_tick(&self, tick: &MarketTick) -> TickReport {
        self.monitor.on_tick(tick).await
    }

    // ------------------------------------------------------------------
    // Kill switch
    // ------------------------------------------------------------------

    /// Halt the user. Returns as soon as the switch is flipped; positions
    /// are closed in the background, and the slots of closed positions the
    /// guardrail admitted are freed when done.
    pub fn trigger_kill_switch(&self, user_id: &UserId, reason: &str) -> TriggerOutcome {
        let trigger = self.kill_switch.trigger(user_id, reason);
        if let Some(close_all) = trigger.close_all {
            let guardrail = Arc::clone(&self.guardrail);
            let user_id = user_id.clone();
            tokio::spawn(async move {
                let report = match close_all.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(user_id = %user_id, error = %e, "Close-all task failed");
                        return;
                    }
                };
                let mut released = 0u32;
                for position_id in &report.closed_positions {
                    match guardrail.release_position(&user_id, position_id).await {
                        Ok(true) => released += 1,
                        Ok(false) => {}
                        Err(e) => {
                            error!(user_id = %user_id, error = %e, "Failed to release position slot");
                            break;
                        }
                    }
                }
                info!(
                    user_id = %user_id,
                    closed = report.closed_positions.len(),
                    released,
                    "Close-all slots released"
                );
            });
        }
        trigger.outcome
    }

    /// Re-arm the user. Fails with `Unauthorized` on a bad token.
    pub fn reset_kill_switch(&self, user_id: &UserId, token: &str) -> EngineResult<bool> {
        Ok(self.kill_switch.reset(user_id, token)?)
    }

    pub fn kill_switch_status(&self, user_id: &UserId) -> KillSwitchSnapshot {
        self.kill_switch.snapshot(user_id)
    }

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------

    /// Entries with `from <= timestamp <= to`, oldest first.
    pub fn query_audit_log(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<AuditEntry>> {
        if from > to {
            return Err(EngineError::Config(format!(
                "audit range start {from} is after end {to}"
            )));
        }
        Ok(self.audit.query(user_id, from, to))
    }

    /// Entries after sequence number `after_seq`, for resuming readers.
    pub fn audit_since(&self, user_id: &UserId, after_seq: u64) -> Vec<AuditEntry> {
        self.audit.query_since(user_id, after_seq)
    }

    // ------------------------------------------------------------------
    // Risk
    // ------------------------------------------------------------------

    pub async fn configure_risk_profile(
        &self,
        user_id: &UserId,
        profile: RiskProfile,
        equity: Option<Decimal>,
    ) -> EngineResult<()> {
        self.guardrail
            .configure_profile(user_id, profile, equity)
            .await?;
        Ok(())
    }

    pub async fn risk_assessment(&self, user_id: &UserId) -> EngineResult<RiskAssessment> {
        Ok(self.guardrail.assessment(user_id).await?)
    }

    /// Apply a closed trade's realized P/L and free its position slot.
    pub async fn record_trade_closed(
        &self,
        user_id: &UserId,
        pnl: Decimal,
    ) -> EngineResult<DailyTradingStats> {
        Ok(self.guardrail.record_trade_closed(user_id, pnl).await?)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn current_session(&self) -> SessionInfo {
        let at = self.clock.now();
        let session = self.monitor.sessions().session_at(at);
        SessionInfo {
            at,
            session,
            next: session.next(),
            profile: session.profile(),
        }
    }
}
