//! Simulated broker bridge.
//!
//! Fills every order at its requested price and tracks the resulting
//! positions per user. Failures can be scripted so callers can exercise
//! retry, rejection and partial close-all paths without a real broker.

use crate::broker::{BrokerExecution, BrokerOrder, BrokerPosition, SubmitOutcome};
use crate::error::{ExecutorError, ExecutorResult};
use futures_util::future::BoxFuture;
use guard_core::UserId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum ScriptedSubmit {
    TransportError(String),
    Reject(String),
}

/// Paper trading broker.
#[derive(Debug, Default)]
pub struct PaperBroker {
    positions: Mutex<HashMap<UserId, Vec<BrokerPosition>>>,
    submits: Mutex<Vec<BrokerOrder>>,
    script: Mutex<VecDeque<ScriptedSubmit>>,
    /// Remaining forced close failures per position id.
    close_failures: Mutex<HashMap<String, u32>>,
    close_calls: AtomicU32,
    list_failures: AtomicU32,
    /// Latency applied to every submission before it is answered.
    submit_delay: Mutex<Option<Duration>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submissions with a transport error.
    pub fn fail_next_submits(&self, n: u32, error: &str) {
        let mut script = self.script.lock();
        for _ in 0..n {
            script.push_back(ScriptedSubmit::TransportError(error.to_string()));
        }
    }

    /// Reject the next submission.
    pub fn reject_next(&self, reason: &str) {
        self.script
            .lock()
            .push_back(ScriptedSubmit::Reject(reason.to_string()));
    }

    /// Fail closing `position_id` the next `times` attempts.
    pub fn fail_close(&self, position_id: &str, times: u32) {
        self.close_failures
            .lock()
            .insert(position_id.to_string(), times);
    }

    /// Hold every submission for `delay` before answering it.
    pub fn delay_submits(&self, delay: Duration) {
        *self.submit_delay.lock() = Some(delay);
    }

    /// Fail the next `n` position listings.
    pub fn fail_list(&self, n: u32) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    /// Seed an open position (e.g. restored from a previous session).
    pub fn open_position(&self, position: BrokerPosition) {
        self.positions
            .lock()
            .entry(position.user_id.clone())
            .or_default()
            .push(position);
    }

    /// Orders received so far, including failed attempts.
    pub fn submits(&self) -> Vec<BrokerOrder> {
        self.submits.lock().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().len()
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn positions(&self, user_id: &UserId) -> Vec<BrokerPosition> {
        self.positions
            .lock()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn paper_id() -> String {
    format!("paper_{}", &Uuid::new_v4().simple().to_string()[..14])
}

impl BrokerExecution for PaperBroker {
    fn submit_order(&self, order: BrokerOrder) -> BoxFuture<'_, ExecutorResult<SubmitOutcome>> {
        Box::pin(async move {
            self.submits.lock().push(order.clone());

            let delay = *self.submit_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(scripted) = self.script.lock().pop_front() {
                return match scripted {
                    ScriptedSubmit::TransportError(e) => Err(ExecutorError::Transport(e)),
                    ScriptedSubmit::Reject(reason) => Ok(SubmitOutcome::Rejected { reason }),
                };
            }

            let broker_order_id = paper_id();
            self.open_position(BrokerPosition {
                position_id: broker_order_id.clone(),
                user_id: order.user_id.clone(),
                pair: order.pair.clone(),
                action: order.action,
                size: order.size,
                entry_price: order.price,
            });
            debug!(broker_order_id = %broker_order_id, pair = %order.pair, "Paper fill");

            Ok(SubmitOutcome::Filled {
                position_id: broker_order_id.clone(),
                broker_order_id,
                fill_price: order.price,
            })
        })
    }

    fn list_open_positions(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, ExecutorResult<Vec<BrokerPosition>>> {
        Box::pin(async move {
            let failed = self
                .list_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(ExecutorError::Transport("list positions unavailable".to_string()));
            }
            Ok(self.positions(&user_id))
        })
    }

    fn close_position(
        &self,
        user_id: UserId,
        position_id: String,
    ) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            self.close_calls.fetch_add(1, Ordering::SeqCst);

            {
                let mut failures = self.close_failures.lock();
                if let Some(remaining) = failures.get_mut(&position_id) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(ExecutorError::Transport(format!(
                            "close {position_id} timed out"
                        )));
                    }
                }
            }

            let mut positions = self.positions.lock();
            let open = positions.entry(user_id).or_default();
            let before = open.len();
            open.retain(|p| p.position_id != position_id);
            if open.len() == before {
                return Err(ExecutorError::PositionNotFound(position_id));
            }
            Ok(())
        })
    }
}
