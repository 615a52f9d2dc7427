//! Test harness: the application wired to a paper broker and a manual clock.

use chrono::{DateTime, TimeZone, Utc};
use guard_core::{ManualClock, Pair, Price, Size, TradeAction, TradeIntent, UserId};
use guard_daemon::{AppConfig, Application};
use guard_engine::GuardrailEngine;
use guard_executor::PaperBroker;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Two users: `alice` with a 100000 unit size cap and a 2% daily loss
/// limit, `bob` with defaults. Resets need the `op` token.
pub const BASE_CONFIG: &str = r#"
[risk]
default_equity = "100000"

[[risk.users]]
user_id = "alice"
[risk.users.profile]
max_trade_size = "100000"
daily_loss_limit_pct = "2.0"

[[risk.users]]
user_id = "bob"

[retry]
max_attempts = 2
initial_backoff_ms = 0
max_backoff_ms = 0

[kill_switch]
reset_token = "op"
[kill_switch.close_retry]
max_attempts = 3
initial_backoff_ms = 0
max_backoff_ms = 0

[api]
enabled = false
"#;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

pub fn alice() -> UserId {
    UserId::from("alice")
}

pub fn bob() -> UserId {
    UserId::from("bob")
}

pub fn eur_usd() -> Pair {
    Pair::parse("EUR/USD").unwrap()
}

pub struct Harness {
    pub app: Application,
    pub broker: Arc<PaperBroker>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BASE_CONFIG)
    }

    pub fn with_config(toml: &str) -> Self {
        let config = AppConfig::parse(toml).unwrap();
        let broker = Arc::new(PaperBroker::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let app = Application::with_parts(config, broker.clone(), clock.clone()).unwrap();
        Self { app, broker, clock }
    }

    pub fn engine(&self) -> &Arc<GuardrailEngine> {
        self.app.engine()
    }
}

/// Buy intent on EUR/USD at 1.1000 with stop 1.0900 and target 1.1200.
pub fn buy(user: UserId, size: Decimal) -> TradeIntent {
    TradeIntent::manual(
        user,
        eur_usd(),
        TradeAction::Buy,
        Size::new(size),
        Price::new(Decimal::new(11000, 4)),
        t0(),
    )
    .with_stop_loss(Price::new(Decimal::new(10900, 4)))
    .with_take_profit(Price::new(Decimal::new(11200, 4)))
}

/// Poll `check` until it holds or a second elapses.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
