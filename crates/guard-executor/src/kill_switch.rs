//! Kill switch controller.
//!
//! `trigger` flips the user's latch and returns at once. Closing the
//! user's open positions runs as a spawned task: each position is closed
//! independently with bounded retries, every attempt is audited, and
//! progress is published to the board as `CloseAllStatus`.
//!
//! `reset` requires the operator token, compared in constant time. It
//! clears the halt but does not reopen anything that was closed.

use crate::broker::{BrokerExecution, BrokerPosition};
use crate::error::{ExecutorError, ExecutorResult};
use crate::retry::RetryPolicy;
use futures_util::future::join_all;
use guard_core::{Clock, UserId};
use guard_persistence::{AuditActor, AuditEvent, AuditLog, AuditRecord};
use guard_risk::{CloseAllStatus, KillSwitchBoard, KillSwitchSnapshot, TriggerOutcome};
use guard_telemetry::Metrics;
use parking_lot::Mutex;
use ring::hmac;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Final close-all status plus the broker ids of the positions it closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseAllReport {
    pub status: CloseAllStatus,
    pub closed_positions: Vec<String>,
}

/// Result of a trigger call.
///
/// `close_all` is set only for the call that actually flipped the switch.
#[derive(Debug)]
pub struct KillSwitchTrigger {
    pub outcome: TriggerOutcome,
    pub close_all: Option<JoinHandle<CloseAllReport>>,
}

/// Operator token kept as an HMAC tag under a per-process random key.
///
/// Verification goes through `hmac::verify`, which compares in constant
/// time and hides the token length.
struct ResetToken {
    key: hmac::Key,
    tag: hmac::Tag,
}

impl ResetToken {
    fn new(token: &str) -> Self {
        let key = hmac::Key::new(hmac::HMAC_SHA256, Uuid::new_v4().as_bytes());
        let tag = hmac::sign(&key, token.as_bytes());
        Self { key, tag }
    }

    fn verify(&self, candidate: &str) -> bool {
        hmac::verify(&self.key, candidate.as_bytes(), self.tag.as_ref()).is_ok()
    }
}

#[derive(Clone)]
struct CloseAllContext {
    board: Arc<KillSwitchBoard>,
    broker: Arc<dyn BrokerExecution>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

pub struct KillSwitchController {
    ctx: CloseAllContext,
    reset_token: Option<ResetToken>,
}

impl KillSwitchController {
    /// `reset_token = None` disables resets entirely.
    pub fn new(
        board: Arc<KillSwitchBoard>,
        broker: Arc<dyn BrokerExecution>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        close_policy: RetryPolicy,
        reset_token: Option<String>,
    ) -> Self {
        Self {
            ctx: CloseAllContext {
                board,
                broker,
                audit,
                clock,
                policy: close_policy,
            },
            reset_token: reset_token.as_deref().map(ResetToken::new),
        }
    }

    pub fn board(&self) -> &Arc<KillSwitchBoard> {
        &self.ctx.board
    }

    /// Halt the user. Idempotent: while triggered, re-logs the reason only.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, user_id: &UserId, reason: &str) -> KillSwitchTrigger {
        let now = self.ctx.clock.now();
        let outcome = self.ctx.board.trigger(user_id, reason, now);

        let event = match outcome {
            TriggerOutcome::Transitioned => AuditEvent::KillSwitchTriggered,
            TriggerOutcome::AlreadyTriggered => AuditEvent::KillSwitchAlreadyTriggered,
        };
        self.ctx.audit.record(
            AuditRecord::new(AuditActor::KillSwitch, user_id, user_id.as_str(), event, now)
                .with_reason(reason),
        );

        let close_all = match outcome {
            TriggerOutcome::Transitioned => {
                let ctx = self.ctx.clone();
                let user_id = user_id.clone();
                Some(tokio::spawn(async move { ctx.close_all(user_id).await }))
            }
            TriggerOutcome::AlreadyTriggered => None,
        };

        KillSwitchTrigger { outcome, close_all }
    }

    /// Re-arm the user's kill switch.
    ///
    /// Returns `Ok(true)` if it was triggered, `Ok(false)` if already armed.
    pub fn reset(&self, user_id: &UserId, token: &str) -> ExecutorResult<bool> {
        let now = self.ctx.clock.now();
        let authorized = self
            .reset_token
            .as_ref()
            .is_some_and(|expected| expected.verify(token));
        if !authorized {
            warn!(user_id = %user_id, "Kill switch reset denied");
            self.ctx.audit.record(
                AuditRecord::new(
                    AuditActor::Operator,
                    user_id,
                    user_id.as_str(),
                    AuditEvent::KillSwitchResetDenied,
                    now,
                )
                .with_reason("invalid or missing operator token"),
            );
            return Err(ExecutorError::Unauthorized);
        }

        let was_triggered = self.ctx.board.reset(user_id);
        if was_triggered {
            self.ctx.audit.record(AuditRecord::new(
                AuditActor::Operator,
                user_id,
                user_id.as_str(),
                AuditEvent::KillSwitchReset,
                now,
            ));
        }
        Ok(was_triggered)
    }

    pub fn snapshot(&self, user_id: &UserId) -> KillSwitchSnapshot {
        self.ctx.board.snapshot(user_id)
    }

    /// Close one position with the close-all retry policy.
    ///
    /// Used for fills that land after the switch was triggered, which the
    /// close-all pass may already have missed.
    pub async fn close_position(&self, user_id: &UserId, position_id: &str) -> bool {
        self.ctx.close_one(user_id, position_id).await
    }
}

impl CloseAllContext {
    fn record(&self, user_id: &UserId, subject: &str, event: AuditEvent, reason: Option<String>) {
        let mut record = AuditRecord::new(
            AuditActor::KillSwitch,
            user_id,
            subject,
            event,
            self.clock.now(),
        );
        if let Some(reason) = reason {
            record = record.with_reason(reason);
        }
        self.audit.record(record);
    }

    async fn list_positions(&self, user_id: &UserId) -> ExecutorResult<Vec<BrokerPosition>> {
        let attempts = self.policy.attempts();
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
            }
            let started = Instant::now();
            let result = self.broker.list_open_positions(user_id.clone()).await;
            Metrics::broker_latency("list", started.elapsed().as_secs_f64() * 1000.0);
            match result {
                Ok(positions) => return Ok(positions),
                Err(e) => {
                    warn!(user_id = %user_id, attempt, error = %e, "Listing positions failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(ExecutorError::RetryExhausted {
            attempts,
            last_error,
        })
    }

    async fn close_one(&self, user_id: &UserId, position_id: &str) -> bool {
        let attempts = self.policy.attempts();
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
            }
            self.record(
                user_id,
                position_id,
                AuditEvent::PositionCloseAttempt {
                    position_id: position_id.to_string(),
                    attempt,
                },
                None,
            );

            let started = Instant::now();
            let result = self
                .broker
                .close_position(user_id.clone(), position_id.to_string())
                .await;
            Metrics::broker_latency("close", started.elapsed().as_secs_f64() * 1000.0);

            match result {
                Ok(()) => {
                    Metrics::position_close("closed");
                    self.record(
                        user_id,
                        position_id,
                        AuditEvent::PositionClosed {
                            position_id: position_id.to_string(),
                        },
                        None,
                    );
                    return true;
                }
                // Already gone at the broker: nothing left to close.
                Err(ExecutorError::PositionNotFound(_)) => {
                    Metrics::position_close("closed");
                    self.record(
                        user_id,
                        position_id,
                        AuditEvent::PositionClosed {
                            position_id: position_id.to_string(),
                        },
                        Some("position not found at broker".to_string()),
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        position_id = %position_id,
                        attempt,
                        error = %e,
                        "Position close failed"
                    );
                    if attempt == attempts {
                        Metrics::position_close("failed");
                        self.record(
                            user_id,
                            position_id,
                            AuditEvent::PositionCloseFailed {
                                position_id: position_id.to_string(),
                            },
                            Some(e.to_string()),
                        );
                    }
                }
            }
        }
        false
    }

    async fn close_all(&self, user_id: UserId) -> CloseAllReport {
        let positions = match self.list_positions(&user_id).await {
            Ok(p) => p,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Close-all could not list positions");
                let status = CloseAllStatus::Partial {
                    closed: 0,
                    failed: 0,
                };
                self.board.set_close_all(&user_id, status);
                self.record(
                    &user_id,
                    user_id.as_str(),
                    AuditEvent::CloseAllFinished {
                        closed: 0,
                        failed: 0,
                    },
                    Some(e.to_string()),
                );
                return CloseAllReport {
                    status,
                    closed_positions: Vec::new(),
                };
            }
        };

        let total = positions.len() as u32;
        info!(user_id = %user_id, total, "Closing all positions");
        self.board.set_close_all(
            &user_id,
            CloseAllStatus::InProgress {
                total,
                closed: 0,
                failed: 0,
            },
        );

        let closed_ids = Mutex::new(Vec::with_capacity(positions.len()));
        let failed = Mutex::new(0u32);
        {
            let (closed_ids, failed, user_id) = (&closed_ids, &failed, &user_id);
            join_all(positions.iter().map(|p| async move {
                if self.close_one(user_id, &p.position_id).await {
                    closed_ids.lock().push(p.position_id.clone());
                } else {
                    *failed.lock() += 1;
                }
                let closed = closed_ids.lock().len() as u32;
                let failed = *failed.lock();
                self.board.set_close_all(
                    user_id,
                    CloseAllStatus::InProgress {
                        total,
                        closed,
                        failed,
                    },
                );
            }))
            .await;
        }

        let closed_positions = closed_ids.into_inner();
        let closed = closed_positions.len() as u32;
        let failed = failed.into_inner();
        let status = if failed == 0 {
            CloseAllStatus::Completed { closed }
        } else {
            CloseAllStatus::Partial { closed, failed }
        };
        self.board.set_close_all(&user_id, status);
        self.record(
            &user_id,
            user_id.as_str(),
            AuditEvent::CloseAllFinished { closed, failed },
            None,
        );
        info!(user_id = %user_id, closed, failed, "Close-all finished");
        CloseAllReport {
            status,
            closed_positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperBroker;
    use guard_core::{Pair, Price, Size, SystemClock, TradeAction};
    use guard_risk::KillSwitchStatus;
    use rust_decimal_macros::dec;

    fn user() -> UserId {
        UserId::from("u1")
    }

    fn position(id: &str) -> BrokerPosition {
        BrokerPosition {
            position_id: id.to_string(),
            user_id: user(),
            pair: Pair::parse("EUR/USD").unwrap(),
            action: TradeAction::Buy,
            size: Size::new(dec!(1000)),
            entry_price: Price::new(dec!(1.1)),
        }
    }

    fn controller(broker: Arc<PaperBroker>) -> (KillSwitchController, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let c = KillSwitchController::new(
            Arc::new(KillSwitchBoard::new()),
            broker,
            Arc::clone(&audit),
            Arc::new(SystemClock),
            RetryPolicy::immediate(3),
            Some("op-secret".to_string()),
        );
        (c, audit)
    }

    #[tokio::test]
    async fn test_trigger_closes_all_positions() {
        let broker = Arc::new(PaperBroker::new());
        broker.open_position(position("p1"));
        broker.open_position(position("p2"));
        let (c, audit) = controller(Arc::clone(&broker));

        let trigger = c.trigger(&user(), "daily loss breached");
        assert_eq!(trigger.outcome, TriggerOutcome::Transitioned);
        assert_eq!(c.board().status(&user()), KillSwitchStatus::Triggered);

        let report = trigger.close_all.unwrap().await.unwrap();
        assert_eq!(report.status, CloseAllStatus::Completed { closed: 2 });
        let mut closed = report.closed_positions.clone();
        closed.sort();
        assert_eq!(closed, vec!["p1".to_string(), "p2".to_string()]);
        assert!(broker.positions(&user()).is_empty());
        assert_eq!(c.snapshot(&user()).close_all, report.status);

        let entries = audit.query_since(&user(), 0);
        assert_eq!(entries[0].event, AuditEvent::KillSwitchTriggered);
        assert_eq!(
            entries.last().unwrap().event,
            AuditEvent::CloseAllFinished { closed: 2, failed: 0 }
        );
    }

    #[tokio::test]
    async fn test_partial_close_retries_each_position() {
        let broker = Arc::new(PaperBroker::new());
        broker.open_position(position("p1"));
        broker.open_position(position("p2"));
        broker.fail_close("p1", 1);
        broker.fail_close("p2", 10);
        let (c, audit) = controller(Arc::clone(&broker));

        let report = c
            .trigger(&user(), "manual")
            .close_all
            .unwrap()
            .await
            .unwrap();
        assert_eq!(report.status, CloseAllStatus::Partial { closed: 1, failed: 1 });
        assert_eq!(report.closed_positions, vec!["p1".to_string()]);
        assert_eq!(broker.close_calls(), 2 + 3);

        let failed: Vec<_> = audit
            .query_since(&user(), 0)
            .into_iter()
            .filter(|e| matches!(e.event, AuditEvent::PositionCloseFailed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].subject_id, "p2");
    }

    #[tokio::test]
    async fn test_second_trigger_is_noop() {
        let broker = Arc::new(PaperBroker::new());
        let (c, audit) = controller(broker);

        let first = c.trigger(&user(), "a");
        first.close_all.unwrap().await.unwrap();
        let second = c.trigger(&user(), "b");
        assert_eq!(second.outcome, TriggerOutcome::AlreadyTriggered);
        assert!(second.close_all.is_none());
        assert_eq!(c.snapshot(&user()).reason.as_deref(), Some("a"));

        let again = audit
            .query_since(&user(), 0)
            .into_iter()
            .find(|e| e.event == AuditEvent::KillSwitchAlreadyTriggered)
            .unwrap();
        assert_eq!(again.reasons, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_requires_token() {
        let broker = Arc::new(PaperBroker::new());
        let (c, _audit) = controller(broker);
        c.trigger(&user(), "x").close_all.unwrap().await.unwrap();

        assert!(matches!(
            c.reset(&user(), "wrong"),
            Err(ExecutorError::Unauthorized)
        ));
        assert!(matches!(
            c.reset(&user(), "op-secret-longer"),
            Err(ExecutorError::Unauthorized)
        ));
        assert!(matches!(c.reset(&user(), ""), Err(ExecutorError::Unauthorized)));
        assert!(c.board().is_triggered(&user()));

        assert!(c.reset(&user(), "op-secret").unwrap());
        assert!(!c.board().is_triggered(&user()));
        assert!(!c.reset(&user(), "op-secret").unwrap());
    }

    #[tokio::test]
    async fn test_reset_disabled_without_token() {
        let c = KillSwitchController::new(
            Arc::new(KillSwitchBoard::new()),
            Arc::new(PaperBroker::new()),
            Arc::new(AuditLog::new()),
            Arc::new(SystemClock),
            RetryPolicy::immediate(1),
            None,
        );
        assert!(matches!(c.reset(&user(), ""), Err(ExecutorError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_list_failure_reports_partial() {
        let broker = Arc::new(PaperBroker::new());
        broker.fail_list(5);
        let (c, _audit) = controller(broker);

        let report = c.trigger(&user(), "x").close_all.unwrap().await.unwrap();
        assert_eq!(report.status, CloseAllStatus::Partial { closed: 0, failed: 0 });
        assert!(report.closed_positions.is_empty());
        assert!(c.board().is_triggered(&user()));
    }
}
