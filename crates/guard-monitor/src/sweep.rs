//! Periodic expiry sweep.
//!
//! Ticks expire orders for their own pair; the sweep catches orders on
//! pairs that stopped ticking.

use crate::monitor::ConditionalOrderMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub fn spawn_expiry_sweeper(
    monitor: Arc<ConditionalOrderMonitor>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = monitor.sweep_expired();
                    if !expired.is_empty() {
                        debug!(count = expired.len(), "Sweep expired orders");
                    }
                }
            }
        }
        info!("Expiry sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Comparison, Condition};
    use crate::monitor::MonitorConfig;
    use crate::order::{OrderRequest, OrderStatus};
    use crate::router::{IntentRouter, RouteOutcome};
    use chrono::{TimeZone, Utc};
    use futures_util::future::BoxFuture;
    use guard_core::{
        Clock, ManualClock, Pair, SessionWindows, Size, TradeAction, TradeIntent, UserId,
    };
    use guard_persistence::AuditLog;
    use rust_decimal_macros::dec;

    struct Unreachable;

    impl IntentRouter for Unreachable {
        fn route(&self, _intent: TradeIntent) -> BoxFuture<'_, RouteOutcome> {
            Box::pin(async {
                RouteOutcome::BrokerFailed {
                    reason: "unexpected".to_string(),
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_expires_and_stops() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        ));
        let monitor = Arc::new(ConditionalOrderMonitor::new(
            Arc::new(Unreachable),
            Arc::new(AuditLog::new()),
            clock.clone(),
            SessionWindows::default(),
            MonitorConfig::default(),
        ));
        let id = monitor
            .register(
                OrderRequest::new(
                    UserId::from("u1"),
                    Pair::parse("USD/JPY").unwrap(),
                    TradeAction::Sell,
                    Size::new(dec!(1)),
                    vec![Condition::price(Comparison::Gt, dec!(200))],
                )
                .expiring_at(clock.now() + chrono::Duration::minutes(5)),
            )
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn_expiry_sweeper(
            Arc::clone(&monitor),
            Duration::from_secs(1),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(monitor.status(&id).unwrap(), OrderStatus::Pending);

        clock.advance(chrono::Duration::minutes(6));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(monitor.status(&id).unwrap(), OrderStatus::Expired);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
