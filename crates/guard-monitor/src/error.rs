//! Monitor error types.

use crate::order::OrderStatus;
use guard_core::OrderId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid conditional order: {0}")]
    InvalidOrder(String),

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The order already left PENDING through another path.
    #[error("Order {order_id} is {status}, not PENDING")]
    NotPending { order_id: OrderId, status: OrderStatus },

    /// Attempt to mutate an order in a terminal state.
    #[error("Invariant violation: order {order_id} is terminal ({status})")]
    InvariantViolation { order_id: OrderId, status: OrderStatus },

    #[error("Tick dispatcher closed")]
    DispatcherClosed,
}

pub type MonitorResult<T> = Result<T, MonitorError>;
