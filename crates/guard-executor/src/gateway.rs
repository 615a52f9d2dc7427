//! Execution gateway.
//!
//! Forwards validated intents to the broker. Transport failures are
//! retried with exponential backoff up to the policy's attempt budget; a
//! broker rejection is final and is not retried. The user's kill switch
//! is consulted before every attempt, so a halt raised during backoff
//! stops the retries. Every attempt and the final outcome are audited.

use crate::broker::{BrokerExecution, BrokerOrder, SubmitOutcome};
use crate::retry::RetryPolicy;
use guard_core::{Clock, Price, TradeIntent};
use guard_persistence::{AuditActor, AuditEvent, AuditLog, AuditRecord};
use guard_risk::{KillSwitchBoard, RejectCode};
use guard_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Final result of routing an intent to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Filled {
        broker_order_id: String,
        position_id: String,
        fill_price: Price,
        attempts: u32,
    },
    Rejected {
        reason: String,
        attempts: u32,
    },
    Exhausted {
        last_error: String,
        attempts: u32,
    },
    /// Kill switch found triggered before an attempt. `attempts` counts
    /// the attempts already made.
    Halted {
        attempts: u32,
    },
}

impl ExecutionOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled { .. })
    }
}

pub struct ExecutionGateway {
    broker: Arc<dyn BrokerExecution>,
    policy: RetryPolicy,
    board: Arc<KillSwitchBoard>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl ExecutionGateway {
    pub fn new(
        broker: Arc<dyn BrokerExecution>,
        policy: RetryPolicy,
        board: Arc<KillSwitchBoard>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            broker,
            policy,
            board,
            audit,
            clock,
        }
    }

    pub fn broker(&self) -> &Arc<dyn BrokerExecution> {
        &self.broker
    }

    fn audit(&self, intent: &TradeIntent, event: AuditEvent, reason: Option<String>) {
        let mut record = AuditRecord::new(
            AuditActor::Gateway,
            &intent.user_id,
            intent.id.as_str(),
            event,
            self.clock.now(),
        );
        if let Some(reason) = reason {
            record = record.with_reason(reason);
        }
        self.audit.record(record);
    }

    /// Submit an intent, retrying transport failures.
    pub async fn submit(&self, intent: &TradeIntent) -> ExecutionOutcome {
        let max_attempts = self.policy.attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
            }

            if self.board.is_triggered(&intent.user_id) {
                let attempts = attempt - 1;
                warn!(
                    user_id = %intent.user_id,
                    intent_id = %intent.id,
                    attempts,
                    "Kill switch triggered, submission stopped"
                );
                self.audit(
                    intent,
                    AuditEvent::TradeRejected,
                    Some(format!(
                        "{}: Kill switch triggered before attempt {attempt}",
                        RejectCode::Halted.as_str()
                    )),
                );
                return ExecutionOutcome::Halted { attempts };
            }

            self.audit(intent, AuditEvent::BrokerAttempt { attempt }, None);
            let started = Instant::now();
            let result = self.broker.submit_order(BrokerOrder::from(intent)).await;
            Metrics::broker_latency("submit", started.elapsed().as_secs_f64() * 1000.0);

            match result {
                Ok(SubmitOutcome::Filled {
                    broker_order_id,
                    position_id,
                    fill_price,
                }) => {
                    Metrics::broker_attempt("filled");
                    self.audit(
                        intent,
                        AuditEvent::BrokerFilled {
                            broker_order_id: broker_order_id.clone(),
                        },
                        Some(format!("fill price {fill_price}")),
                    );
                    info!(
                        user_id = %intent.user_id,
                        intent_id = %intent.id,
                        broker_order_id = %broker_order_id,
                        %fill_price,
                        attempt,
                        "Order filled"
                    );
                    return ExecutionOutcome::Filled {
                        broker_order_id,
                        position_id,
                        fill_price,
                        attempts: attempt,
                    };
                }
                Ok(SubmitOutcome::Rejected { reason }) => {
                    Metrics::broker_attempt("rejected");
                    self.audit(intent, AuditEvent::BrokerRejected, Some(reason.clone()));
                    warn!(
                        user_id = %intent.user_id,
                        intent_id = %intent.id,
                        reason = %reason,
                        "Broker rejected order"
                    );
                    return ExecutionOutcome::Rejected {
                        reason,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    Metrics::broker_attempt("error");
                    last_error = e.to_string();
                    warn!(
                        user_id = %intent.user_id,
                        intent_id = %intent.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Broker submission failed"
                    );
                }
            }
        }

        self.audit(
            intent,
            AuditEvent::BrokerExhausted {
                attempts: max_attempts,
            },
            Some(last_error.clone()),
        );
        ExecutionOutcome::Exhausted {
            last_error,
            attempts: max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperBroker;
    use chrono::Utc;
    use guard_core::{Pair, Size, SystemClock, TradeAction, UserId};
    use rust_decimal_macros::dec;

    fn intent() -> TradeIntent {
        TradeIntent::manual(
            UserId::from("u1"),
            Pair::parse("EUR/USD").unwrap(),
            TradeAction::Sell,
            Size::new(dec!(1000)),
            Price::new(dec!(1.2)),
            Utc::now(),
        )
    }

    fn gateway(broker: Arc<PaperBroker>, attempts: u32) -> (ExecutionGateway, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let gw = ExecutionGateway::new(
            broker,
            RetryPolicy::immediate(attempts),
            Arc::new(KillSwitchBoard::new()),
            Arc::clone(&audit),
            Arc::new(SystemClock),
        );
        (gw, audit)
    }

    fn backoff_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_transport_errors_then_fills() {
        let broker = Arc::new(PaperBroker::new());
        broker.fail_next_submits(2, "connection reset");
        let (gw, audit) = gateway(Arc::clone(&broker), 3);

        let outcome = gw.submit(&intent()).await;
        assert!(matches!(outcome, ExecutionOutcome::Filled { attempts: 3, .. }));
        assert_eq!(broker.submit_count(), 3);

        let attempts = audit
            .query_since(&UserId::from("u1"), 0)
            .into_iter()
            .filter(|e| matches!(e.event, AuditEvent::BrokerAttempt { .. }))
            .count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_reported_and_audited() {
        let broker = Arc::new(PaperBroker::new());
        broker.fail_next_submits(5, "down");
        let (gw, audit) = gateway(Arc::clone(&broker), 3);

        let outcome = gw.submit(&intent()).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Exhausted {
                last_error: "Broker transport error: down".to_string(),
                attempts: 3
            }
        );
        let last = audit.query_since(&UserId::from("u1"), 0).pop().unwrap();
        assert_eq!(last.event, AuditEvent::BrokerExhausted { attempts: 3 });
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let broker = Arc::new(PaperBroker::new());
        broker.reject_next("market closed");
        let (gw, _audit) = gateway(Arc::clone(&broker), 3);

        let outcome = gw.submit(&intent()).await;
        assert!(matches!(outcome, ExecutionOutcome::Rejected { attempts: 1, .. }));
        assert_eq!(broker.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let broker = Arc::new(PaperBroker::new());
        broker.fail_next_submits(2, "busy");
        let gw = ExecutionGateway::new(
            broker,
            backoff_policy(),
            Arc::new(KillSwitchBoard::new()),
            Arc::new(AuditLog::new()),
            Arc::new(SystemClock),
        );

        let started = tokio::time::Instant::now();
        assert!(gw.submit(&intent()).await.is_filled());
        assert!(started.elapsed() >= std::time::Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_backoff_stops_retries() {
        let broker = Arc::new(PaperBroker::new());
        broker.fail_next_submits(1, "connection reset");
        let board = Arc::new(KillSwitchBoard::new());
        let audit = Arc::new(AuditLog::new());
        let gw = Arc::new(ExecutionGateway::new(
            Arc::clone(&broker) as Arc<dyn BrokerExecution>,
            backoff_policy(),
            Arc::clone(&board),
            Arc::clone(&audit),
            Arc::new(SystemClock),
        ));

        let submit = {
            let gw = Arc::clone(&gw);
            tokio::spawn(async move { gw.submit(&intent()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        board.trigger(&UserId::from("u1"), "manual", Utc::now());

        let outcome = submit.await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Halted { attempts: 1 });
        assert_eq!(broker.submit_count(), 1);
        assert!(broker.positions(&UserId::from("u1")).is_empty());

        let last = audit.query_since(&UserId::from("u1"), 0).pop().unwrap();
        assert_eq!(last.event, AuditEvent::TradeRejected);
        assert!(last.reasons[0].starts_with("HALTED"));
    }

    #[tokio::test]
    async fn test_already_halted_makes_no_attempt() {
        let broker = Arc::new(PaperBroker::new());
        let board = Arc::new(KillSwitchBoard::new());
        board.trigger(&UserId::from("u1"), "manual", Utc::now());
        let gw = ExecutionGateway::new(
            Arc::clone(&broker) as Arc<dyn BrokerExecution>,
            RetryPolicy::immediate(3),
            board,
            Arc::new(AuditLog::new()),
            Arc::new(SystemClock),
        );

        assert_eq!(gw.submit(&intent()).await, ExecutionOutcome::Halted { attempts: 0 });
        assert_eq!(broker.submit_count(), 0);
    }
}
