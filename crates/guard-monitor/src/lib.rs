//! Conditional order monitor for the trade guardrail engine.
//!
//! Stores conditional, time-bound and session-aware orders and
//! re-evaluates them on every market tick for their pair.
//!
//! # Key Components
//!
//! - [`Condition`]: closed set of trigger conditions
//! - [`ConditionalOrder`]: order with a CAS-guarded status
//! - [`ConditionalOrderMonitor`]: registration, cancellation, tick evaluation
//! - [`IntentRouter`]: downstream path for synthesized intents
//! - [`TickDispatcher`]: one worker per pair
//! - [`spawn_expiry_sweeper`]: background expiry for quiet pairs

pub mod book;
pub mod condition;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod order;
pub mod router;
pub mod sweep;

pub use book::OrderBook;
pub use condition::{conditions_met, Combinator, Comparison, Condition, ConditionKind};
pub use dispatcher::TickDispatcher;
pub use error::{MonitorError, MonitorResult};
pub use monitor::{ConditionalOrderMonitor, MonitorConfig, TickReport};
pub use order::{ConditionalOrder, OrderOutcome, OrderRequest, OrderStatus, OrderView};
pub use router::{IntentRouter, RouteOutcome};
pub use sweep::spawn_expiry_sweeper;
