//! Core domain types for the trade guardrail engine.
//!
//! This crate provides fundamental types used throughout the engine:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `UserId`, `OrderId`, `IntentId`, `Pair`: Identifiers
//! - `TradeIntent`: A proposed BUY/SELL action awaiting validation
//! - `MarketTick`: Price update pushed by the market data feed
//! - `TradingSession`: Session classification from a UTC timestamp
//! - `Clock`: Time source abstraction for deterministic tests

pub mod clock;
pub mod decimal;
pub mod error;
pub mod intent;
pub mod market;
pub mod order;
pub mod trading_session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use intent::{IntentSource, TradeIntent};
pub use market::{Indicator, IndicatorReadings, MarketTick, TrendDirection};
pub use order::{IntentId, OrderId, Pair, TradeAction, UserId};
pub use trading_session::{session_at, SessionProfile, SessionWindow, SessionWindows, TradingSession};
