//! Validate-then-execute path shared by manual and conditional intents.

use futures_util::future::BoxFuture;
use guard_core::{Clock, IntentId, TradeIntent, UserId};
use guard_executor::{ExecutionGateway, ExecutionOutcome, KillSwitchController};
use guard_monitor::{IntentRouter, RouteOutcome};
use guard_persistence::{AuditActor, AuditEvent, AuditLog, AuditRecord};
use guard_risk::{Decision, GuardrailService, RejectCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

/// Result of `execute_trade`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub intent_id: IntentId,
    pub user_id: UserId,
    pub decision: Decision,
    /// Present when the intent reached the broker.
    pub execution: Option<ExecutionOutcome>,
    /// The fill landed after the kill switch fired and was closed again.
    #[serde(default)]
    pub flattened: bool,
}

impl ExecutionReport {
    pub fn is_filled(&self) -> bool {
        self.execution.as_ref().is_some_and(ExecutionOutcome::is_filled)
    }
}

pub struct ExecutionPipeline {
    guardrail: Arc<GuardrailService>,
    gateway: ExecutionGateway,
    kill_switch: Arc<KillSwitchController>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl ExecutionPipeline {
    pub fn new(
        guardrail: Arc<GuardrailService>,
        gateway: ExecutionGateway,
        kill_switch: Arc<KillSwitchController>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guardrail,
            gateway,
            kill_switch,
            audit,
            clock,
        }
    }

    pub fn guardrail(&self) -> &Arc<GuardrailService> {
        &self.guardrail
    }

    /// Admit the intent, then submit it to the broker.
    ///
    /// The slot reserved at admission is bound to the broker position on a
    /// fill and given back otherwise. A fill that lands after the kill
    /// switch fired is closed again at once.
    pub async fn execute(&self, intent: &TradeIntent) -> ExecutionReport {
        let admission = self.guardrail.admit_trade(intent).await;
        let mut report = ExecutionReport {
            intent_id: intent.id.clone(),
            user_id: intent.user_id.clone(),
            decision: admission.decision,
            execution: None,
            flattened: false,
        };
        if !report.decision.is_allow() {
            return report;
        }

        let outcome = self.gateway.submit(intent).await;
        match &outcome {
            ExecutionOutcome::Filled { position_id, .. } => {
                if let Err(e) = self
                    .guardrail
                    .confirm_fill(&intent.user_id, position_id)
                    .await
                {
                    error!(user_id = %intent.user_id, error = %e, "Failed to record fill");
                }
                if self.guardrail.board().is_triggered(&intent.user_id) {
                    report.flattened = self.flatten_late_fill(intent, position_id).await;
                }
            }
            ExecutionOutcome::Halted { .. } => {
                self.release(intent, admission.reserved).await;
                report.decision = Decision::reject(
                    RejectCode::Halted,
                    "Kill switch triggered before submission",
                );
            }
            ExecutionOutcome::Rejected { .. } | ExecutionOutcome::Exhausted { .. } => {
                self.release(intent, admission.reserved).await;
            }
        }
        report.execution = Some(outcome);
        report
    }

    async fn flatten_late_fill(&self, intent: &TradeIntent, position_id: &str) -> bool {
        warn!(
            user_id = %intent.user_id,
            intent_id = %intent.id,
            position_id,
            "Fill landed after kill switch, closing"
        );
        self.audit.record(
            AuditRecord::new(
                AuditActor::Gateway,
                &intent.user_id,
                intent.id.as_str(),
                AuditEvent::TradeRejected,
                self.clock.now(),
            )
            .with_reason(format!(
                "{}: Filled as {position_id} after kill switch, closing",
                RejectCode::Halted.as_str()
            )),
        );

        if !self
            .kill_switch
            .close_position(&intent.user_id, position_id)
            .await
        {
            return false;
        }
        if let Err(e) = self
            .guardrail
            .release_position(&intent.user_id, position_id)
            .await
        {
            error!(user_id = %intent.user_id, error = %e, "Failed to release position slot");
        }
        true
    }

    async fn release(&self, intent: &TradeIntent, reserved: bool) {
        if !reserved {
            return;
        }
        if let Err(e) = self.guardrail.release_slot(&intent.user_id).await {
            error!(user_id = %intent.user_id, error = %e, "Failed to release position slot");
        }
    }
}

impl IntentRouter for ExecutionPipeline {
    fn route(&self, intent: TradeIntent) -> BoxFuture<'_, RouteOutcome> {
        Box::pin(async move {
            let report = self.execute(&intent).await;
            if report.flattened {
                return RouteOutcome::Rejected {
                    reasons: vec![format!(
                        "{}: fill closed after kill switch",
                        RejectCode::Halted.as_str()
                    )],
                };
            }
            match (report.decision, report.execution) {
                (Decision::Reject(reasons), _) => RouteOutcome::Rejected {
                    reasons: reasons.iter().map(ToString::to_string).collect(),
                },
                (
                    Decision::Allow,
                    Some(ExecutionOutcome::Filled {
                        broker_order_id,
                        fill_price,
                        ..
                    }),
                ) => RouteOutcome::Filled {
                    broker_order_id,
                    fill_price,
                },
                (Decision::Allow, Some(ExecutionOutcome::Rejected { reason, .. })) => {
                    RouteOutcome::BrokerFailed {
                        reason: format!("broker rejected: {reason}"),
                    }
                }
                (
                    Decision::Allow,
                    Some(ExecutionOutcome::Exhausted {
                        last_error,
                        attempts,
                    }),
                ) => RouteOutcome::BrokerFailed {
                    reason: format!("broker unreachable after {attempts} attempts: {last_error}"),
                },
                (Decision::Allow, Some(ExecutionOutcome::Halted { .. }) | None) => {
                    RouteOutcome::BrokerFailed {
                        reason: "intent was not submitted".to_string(),
                    }
                }
            }
        })
    }
}
