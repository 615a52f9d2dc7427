//! Request and response bodies.

use chrono::{DateTime, Utc};
use guard_core::{Pair, Price, Size, TradeAction, TradeIntent, UserId};
use guard_monitor::{OrderRequest, OrderStatus};
use guard_risk::RiskProfile;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade intent as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub user_id: UserId,
    pub pair: Pair,
    pub action: TradeAction,
    pub position_size: Size,
    pub entry_price: Price,
    #[serde(default)]
    pub stop_loss: Option<Price>,
    #[serde(default)]
    pub take_profit: Option<Price>,
}

impl TradeRequest {
    pub fn into_intent(self, now: DateTime<Utc>) -> TradeIntent {
        let mut intent = TradeIntent::manual(
            self.user_id,
            self.pair,
            self.action,
            self.position_size,
            self.entry_price,
            now,
        );
        intent.stop_loss = self.stop_loss;
        intent.take_profit = self.take_profit;
        intent
    }
}

/// Conditional order registration.
///
/// `expiry_hours` registers a time-bound order. A session filter without
/// any explicit expiry registers a session-aware order.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterOrderRequest {
    #[serde(flatten)]
    pub order: OrderRequest,
    #[serde(default)]
    pub expiry_hours: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub user_id: UserId,
    /// `false` when the switch was already armed.
    pub was_triggered: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Resume after this sequence number; overrides the time range.
    #[serde(default)]
    pub after_seq: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigureProfileRequest {
    pub profile: RiskProfile,
    #[serde(default)]
    pub equity: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeClosedRequest {
    pub pnl: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending_orders: usize,
}
