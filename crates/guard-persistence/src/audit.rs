//! Append-only audit log.
//!
//! Every guardrail decision, order transition and kill-switch event is
//! recorded here. Entries are immutable once written and carry a global
//! sequence number, so a reader that stops mid-stream can resume with
//! `query_since` without missing or duplicating entries.
//!
//! Entries for one user are stored in a per-user shard; the sequence
//! number is assigned while holding that shard, so per-user order and
//! sequence order always agree.

use crate::writer::JsonLinesWriter;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use guard_core::UserId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Component that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActor {
    Guardrail,
    Monitor,
    Gateway,
    KillSwitch,
    Operator,
}

impl fmt::Display for AuditActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Guardrail => "guardrail",
            Self::Monitor => "monitor",
            Self::Gateway => "gateway",
            Self::KillSwitch => "kill_switch",
            Self::Operator => "operator",
        };
        f.write_str(s)
    }
}

/// Decision or transition being recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    TradeAllowed,
    TradeRejected,
    OrderRegistered,
    OrderTransition { from: String, to: String },
    BrokerAttempt { attempt: u32 },
    BrokerFilled { broker_order_id: String },
    BrokerRejected,
    BrokerExhausted { attempts: u32 },
    KillSwitchTriggered,
    KillSwitchAlreadyTriggered,
    KillSwitchReset,
    KillSwitchResetDenied,
    PositionCloseAttempt { position_id: String, attempt: u32 },
    PositionClosed { position_id: String },
    PositionCloseFailed { position_id: String },
    CloseAllFinished { closed: u32, failed: u32 },
}

/// Entry as submitted by a component, before sequencing.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub actor: AuditActor,
    pub user_id: UserId,
    pub subject_id: String,
    pub event: AuditEvent,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor: AuditActor,
        user_id: &UserId,
        subject_id: impl Into<String>,
        event: AuditEvent,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            actor,
            user_id: user_id.clone(),
            subject_id: subject_id.into(),
            event,
            reasons: Vec::new(),
            timestamp,
        }
    }

    pub fn with_reasons(mut self, reasons: impl IntoIterator<Item = String>) -> Self {
        self.reasons.extend(reasons);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

/// Sequenced, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub actor: AuditActor,
    pub user_id: UserId,
    pub subject_id: String,
    pub event: AuditEvent,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit log.
pub struct AuditLog {
    next_seq: AtomicU64,
    shards: DashMap<UserId, Vec<AuditEntry>>,
    sink: Option<Mutex<JsonLinesWriter<AuditEntry>>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// In-memory log without a durable sink.
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            shards: DashMap::new(),
            sink: None,
        }
    }

    /// Log that also appends every entry to a JSON Lines sink.
    pub fn with_sink(sink: JsonLinesWriter<AuditEntry>) -> Self {
        Self {
            sink: Some(Mutex::new(sink)),
            ..Self::new()
        }
    }

    /// Append an entry. Returns the sequenced entry.
    ///
    /// Sink failures are logged; the in-memory entry is always kept.
    pub fn record(&self, record: AuditRecord) -> AuditEntry {
        let entry = {
            let mut shard = self.shards.entry(record.user_id.clone()).or_default();
            let entry = AuditEntry {
                seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                actor: record.actor,
                user_id: record.user_id,
                subject_id: record.subject_id,
                event: record.event,
                reasons: record.reasons,
                timestamp: record.timestamp,
            };
            shard.push(entry.clone());
            entry
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.lock().add_record(entry.clone()) {
                warn!(error = %e, seq = entry.seq, "Failed to write audit entry to sink");
            }
        }

        entry
    }

    /// Entries for a user with `from <= timestamp <= to`, oldest first.
    pub fn query(&self, user_id: &UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<AuditEntry> {
        self.shards
            .get(user_id)
            .map(|shard| {
                shard
                    .iter()
                    .filter(|e| e.timestamp >= from && e.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entries for a user with `seq > after_seq`, oldest first.
    pub fn query_since(&self, user_id: &UserId, after_seq: u64) -> Vec<AuditEntry> {
        self.shards
            .get(user_id)
            .map(|shard| {
                let start = shard.partition_point(|e| e.seq <= after_seq);
                shard[start..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Entries recorded about a single subject (order or intent id).
    pub fn for_subject(&self, user_id: &UserId, subject_id: &str) -> Vec<AuditEntry> {
        self.shards
            .get(user_id)
            .map(|shard| {
                shard
                    .iter()
                    .filter(|e| e.subject_id == subject_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of entries across all users.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the durable sink, if any.
    pub fn flush(&self) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.lock().flush() {
                warn!(error = %e, "Failed to flush audit sink");
            }
        }
    }
}
