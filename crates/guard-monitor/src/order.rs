//! Conditional order and its state machine.
//!
//! ```text
//! PENDING --cancel--> CANCELLED
//! PENDING --expiry--> EXPIRED
//! PENDING --conditions met--> TRIGGERED --> EXECUTING --> FILLED | FAILED
//! ```
//!
//! Status lives in an `AtomicU8`; every transition is a compare-and-swap
//! from the expected state, so when cancel, expiry and trigger race for
//! the same PENDING order exactly one of them wins.

use crate::condition::{conditions_met, Combinator, Condition};
use chrono::{DateTime, Utc};
use guard_core::{
    IntentId, MarketTick, OrderId, Pair, Price, Size, TradeAction, TradingSession, UserId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum OrderStatus {
    Pending = 0,
    Triggered = 1,
    Executing = 2,
    Filled = 3,
    Failed = 4,
    Expired = 5,
    Cancelled = 6,
}

impl OrderStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Triggered,
            2 => Self::Executing,
            3 => Self::Filled,
            4 => Self::Failed,
            5 => Self::Expired,
            _ => Self::Cancelled,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Failed | Self::Expired | Self::Cancelled
        )
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Triggered => "TRIGGERED",
            Self::Executing => "EXECUTING",
            Self::Filled => "FILLED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: UserId,
    pub pair: Pair,
    pub action: TradeAction,
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub combinator: Combinator,
    pub position_size: Size,
    /// Defaults to the tick price at trigger time.
    #[serde(default)]
    pub entry_price: Option<Price>,
    #[serde(default)]
    pub stop_loss: Option<Price>,
    #[serde(default)]
    pub take_profit: Option<Price>,
    #[serde(default)]
    pub session_filter: Option<TradingSession>,
    /// Defaults to the monitor's default expiry.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderRequest {
    pub fn new(
        user_id: UserId,
        pair: Pair,
        action: TradeAction,
        position_size: Size,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            user_id,
            pair,
            action,
            conditions,
            combinator: Combinator::All,
            position_size,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            session_filter: None,
            expires_at: None,
            notes: None,
        }
    }

    pub fn with_stop_loss(mut self, price: Price) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: Price) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_entry_price(mut self, price: Price) -> Self {
        self.entry_price = Some(price);
        self
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }

    pub fn with_session(mut self, session: TradingSession) -> Self {
        self.session_filter = Some(session);
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// What happened to the order after it left PENDING.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub triggered_at: Option<DateTime<Utc>>,
    pub trigger_price: Option<Price>,
    pub intent_id: Option<IntentId>,
    pub broker_order_id: Option<String>,
    pub fill_price: Option<Price>,
    pub failure_reasons: Vec<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ConditionalOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub pair: Pair,
    pub action: TradeAction,
    pub conditions: Vec<Condition>,
    pub combinator: Combinator,
    pub position_size: Size,
    pub entry_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub session_filter: Option<TradingSession>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    status: AtomicU8,
    outcome: Mutex<OrderOutcome>,
}

impl ConditionalOrder {
    pub fn from_request(
        request: OrderRequest,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id: request.user_id,
            pair: request.pair,
            action: request.action,
            conditions: request.conditions,
            combinator: request.combinator,
            position_size: request.position_size,
            entry_price: request.entry_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            session_filter: request.session_filter,
            notes: request.notes,
            created_at,
            expires_at,
            status: AtomicU8::new(OrderStatus::Pending as u8),
            outcome: Mutex::new(OrderOutcome::default()),
        }
    }

    #[must_use]
    pub fn status(&self) -> OrderStatus {
        OrderStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// CAS `from -> to`. On failure returns the status actually observed.
    pub fn transition(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderStatus> {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(OrderStatus::from_u8)
    }

    /// Strictly after expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn conditions_met(&self, tick: &MarketTick) -> bool {
        conditions_met(&self.conditions, self.combinator, tick)
    }

    pub fn update_outcome(&self, f: impl FnOnce(&mut OrderOutcome)) {
        f(&mut self.outcome.lock());
    }

    pub fn outcome(&self) -> OrderOutcome {
        self.outcome.lock().clone()
    }

    pub fn view(&self) -> OrderView {
        OrderView {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            pair: self.pair.clone(),
            action: self.action,
            conditions: self.conditions.clone(),
            combinator: self.combinator,
            position_size: self.position_size,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            session_filter: self.session_filter,
            notes: self.notes.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            status: self.status(),
            outcome: self.outcome(),
        }
    }
}

/// Serializable snapshot of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: OrderId,
    pub user_id: UserId,
    pub pair: Pair,
    pub action: TradeAction,
    pub conditions: Vec<Condition>,
    pub combinator: Combinator,
    pub position_size: Size,
    pub entry_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub session_filter: Option<TradingSession>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub outcome: OrderOutcome,
}
