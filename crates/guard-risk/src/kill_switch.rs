//! Per-user kill switch state.
//!
//! Each user has a latch: once triggered it stays triggered until an
//! explicit reset. The ARMED -> TRIGGERED flip is a compare-and-swap, so
//! concurrent triggers resolve to exactly one transition and every reader
//! after the flip observes TRIGGERED.
//!
//! The board only holds state. Authorization of resets and the close-all
//! action live in the executor's controller.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use guard_core::UserId;
use guard_telemetry::Metrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Kill switch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillSwitchStatus {
    Armed,
    Triggered,
}

/// Progress of the close-all action that follows a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CloseAllStatus {
    NotStarted,
    InProgress { total: u32, closed: u32, failed: u32 },
    Completed { closed: u32 },
    Partial { closed: u32, failed: u32 },
}

/// Result of a trigger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// This call flipped ARMED -> TRIGGERED.
    Transitioned,
    /// Already triggered; the original reason is kept.
    AlreadyTriggered,
}

/// Point-in-time view of a user's kill switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchSnapshot {
    pub user_id: UserId,
    pub status: KillSwitchStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub close_all: CloseAllStatus,
}

#[derive(Debug)]
struct LatchDetails {
    triggered_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    close_all: CloseAllStatus,
}

#[derive(Debug)]
struct KillSwitchLatch {
    triggered: AtomicBool,
    details: RwLock<LatchDetails>,
}

impl KillSwitchLatch {
    fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            details: RwLock::new(LatchDetails {
                triggered_at: None,
                reason: None,
                close_all: CloseAllStatus::NotStarted,
            }),
        }
    }
}

/// Per-user kill switch latches.
#[derive(Debug, Default)]
pub struct KillSwitchBoard {
    latches: DashMap<UserId, Arc<KillSwitchLatch>>,
}

impl KillSwitchBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn latch(&self, user_id: &UserId) -> Arc<KillSwitchLatch> {
        if let Some(latch) = self.latches.get(user_id) {
            return Arc::clone(latch.value());
        }
        Arc::clone(
            self.latches
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(KillSwitchLatch::new()))
                .value(),
        )
    }

    /// Current status. Users never seen are ARMED.
    #[must_use]
    pub fn status(&self, user_id: &UserId) -> KillSwitchStatus {
        match self.latches.get(user_id) {
            Some(latch) if latch.triggered.load(Ordering::SeqCst) => KillSwitchStatus::Triggered,
            _ => KillSwitchStatus::Armed,
        }
    }

    #[must_use]
    pub fn is_triggered(&self, user_id: &UserId) -> bool {
        self.status(user_id) == KillSwitchStatus::Triggered
    }

    /// Trigger the kill switch.
    ///
    /// If already triggered, this is a no-op that keeps the original reason.
    pub fn trigger(&self, user_id: &UserId, reason: &str, at: DateTime<Utc>) -> TriggerOutcome {
        let latch = self.latch(user_id);
        // Details are written under the lock before the flag becomes visible.
        let mut details = latch.details.write();
        if latch
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            details.triggered_at = Some(at);
            details.reason = Some(reason.to_string());
            details.close_all = CloseAllStatus::NotStarted;
            drop(details);

            Metrics::kill_switch_triggered();
            error!(user_id = %user_id, reason = %reason, "KILL SWITCH TRIGGERED");
            TriggerOutcome::Transitioned
        } else {
            warn!(
                user_id = %user_id,
                new_reason = %reason,
                original_reason = ?details.reason,
                "Kill switch already triggered, ignoring new trigger"
            );
            TriggerOutcome::AlreadyTriggered
        }
    }

    /// Reset to ARMED. Returns `true` if the switch was triggered.
    ///
    /// Callers are responsible for authorizing the reset.
    pub fn reset(&self, user_id: &UserId) -> bool {
        let Some(latch) = self.latches.get(user_id).map(|l| Arc::clone(l.value())) else {
            return false;
        };
        let mut details = latch.details.write();
        if latch
            .triggered
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(user_id = %user_id, previous_reason = ?details.reason, "Kill switch reset");
            details.triggered_at = None;
            details.reason = None;
            details.close_all = CloseAllStatus::NotStarted;
            Metrics::kill_switch_reset();
            true
        } else {
            false
        }
    }

    /// Publish close-all progress.
    pub fn set_close_all(&self, user_id: &UserId, status: CloseAllStatus) {
        let latch = self.latch(user_id);
        latch.details.write().close_all = status;
    }

    #[must_use]
    pub fn snapshot(&self, user_id: &UserId) -> KillSwitchSnapshot {
        match self.latches.get(user_id).map(|l| Arc::clone(l.value())) {
            Some(latch) => {
                let details = latch.details.read();
                KillSwitchSnapshot {
                    user_id: user_id.clone(),
                    status: if latch.triggered.load(Ordering::SeqCst) {
                        KillSwitchStatus::Triggered
                    } else {
                        KillSwitchStatus::Armed
                    },
                    triggered_at: details.triggered_at,
                    reason: details.reason.clone(),
                    close_all: details.close_all,
                }
            }
            None => KillSwitchSnapshot {
                user_id: user_id.clone(),
                status: KillSwitchStatus::Armed,
                triggered_at: None,
                reason: None,
                close_all: CloseAllStatus::NotStarted,
            },
        }
    }
}
