//! Downstream path for synthesized intents.
//!
//! The monitor does not talk to the guardrail or the broker itself. A
//! triggered order's intent is handed to an `IntentRouter`, which runs
//! the same validation and execution path a manual trade takes.

use futures_util::future::BoxFuture;
use guard_core::{Price, TradeIntent};

/// Result of routing one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Filled {
        broker_order_id: String,
        fill_price: Price,
    },
    /// Guardrail rejection; one entry per failed check.
    Rejected { reasons: Vec<String> },
    /// Broker rejection or retries exhausted.
    BrokerFailed { reason: String },
}

pub trait IntentRouter: Send + Sync {
    fn route(&self, intent: TradeIntent) -> BoxFuture<'_, RouteOutcome>;
}
