//! Broker execution interface.
//!
//! The wire protocol of any particular broker is out of scope. Brokers are
//! reached through this trait; `Err` means a transport failure that may be
//! retried, while `SubmitOutcome::Rejected` is a definitive broker answer.

use crate::error::ExecutorResult;
use futures_util::future::BoxFuture;
use guard_core::{IntentId, Pair, Price, Size, TradeAction, TradeIntent, UserId};
use serde::{Deserialize, Serialize};

/// Validated order handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub intent_id: IntentId,
    pub user_id: UserId,
    pub pair: Pair,
    pub action: TradeAction,
    pub size: Size,
    pub price: Price,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
}

impl From<&TradeIntent> for BrokerOrder {
    fn from(intent: &TradeIntent) -> Self {
        Self {
            intent_id: intent.id.clone(),
            user_id: intent.user_id.clone(),
            pair: intent.pair.clone(),
            action: intent.action,
            size: intent.position_size,
            price: intent.entry_price,
            stop_loss: intent.stop_loss,
            take_profit: intent.take_profit,
        }
    }
}

/// Broker answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// `position_id` names the position the fill opened, as later
    /// reported by `list_open_positions`.
    Filled {
        broker_order_id: String,
        position_id: String,
        fill_price: Price,
    },
    Rejected {
        reason: String,
    },
}

/// Open position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub position_id: String,
    pub user_id: UserId,
    pub pair: Pair,
    pub action: TradeAction,
    pub size: Size,
    pub entry_price: Price,
}

/// Broker execution interface.
pub trait BrokerExecution: Send + Sync {
    /// Submit an order.
    fn submit_order(&self, order: BrokerOrder) -> BoxFuture<'_, ExecutorResult<SubmitOutcome>>;

    /// List a user's open positions.
    fn list_open_positions(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, ExecutorResult<Vec<BrokerPosition>>>;

    /// Close one position at market.
    fn close_position(
        &self,
        user_id: UserId,
        position_id: String,
    ) -> BoxFuture<'_, ExecutorResult<()>>;
}
