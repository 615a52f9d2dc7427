//! Conditional order monitor.
//!
//! Work happens only on ticks, registrations/cancellations and the
//! periodic expiry sweep. On a tick for pair P only PENDING orders for P
//! are examined. For each one, in order:
//!
//! 1. expiry (`now > expires_at` wins over everything else)
//! 2. session filter, classified at the tick's timestamp
//! 3. conditions, combined with the order's combinator
//!
//! A satisfied order is moved to TRIGGERED by CAS, its intent is
//! synthesized and handed to the `IntentRouter` (EXECUTING), and the
//! result settles it as FILLED or FAILED.

use crate::book::OrderBook;
use crate::error::{MonitorError, MonitorResult};
use crate::order::{ConditionalOrder, OrderRequest, OrderStatus, OrderView};
use crate::router::{IntentRouter, RouteOutcome};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use guard_core::{
    Clock, IntentId, IntentSource, MarketTick, OrderId, SessionWindows, TradeIntent,
    TradingSession, UserId,
};
use guard_persistence::{AuditActor, AuditEvent, AuditLog, AuditRecord};
use guard_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// MonitorConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Expiry applied when a registration does not carry one.
    #[serde(default = "default_expiry_hours")]
    pub default_expiry_hours: u32,

    /// Validity of session-aware orders.
    #[serde(default = "default_session_order_hours")]
    pub session_order_hours: u32,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Per-pair tick queue capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Settled orders kept per user for status and history queries.
    #[serde(default = "default_history_per_user")]
    pub history_per_user: usize,
}

fn default_expiry_hours() -> u32 {
    12
}

fn default_session_order_hours() -> u32 {
    24
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

fn default_channel_capacity() -> usize {
    1_024
}

fn default_history_per_user() -> usize {
    1_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_expiry_hours: default_expiry_hours(),
            session_order_hours: default_session_order_hours(),
            sweep_interval_ms: default_sweep_interval_ms(),
            channel_capacity: default_channel_capacity(),
            history_per_user: default_history_per_user(),
        }
    }
}

/// Orders that settled while processing one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub expired: Vec<OrderId>,
    pub filled: Vec<OrderId>,
    pub failed: Vec<OrderId>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.filled.is_empty() && self.failed.is_empty()
    }
}

// ============================================================================
// ConditionalOrderMonitor
// ============================================================================

pub struct ConditionalOrderMonitor {
    book: OrderBook,
    router: Arc<dyn IntentRouter>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    sessions: SessionWindows,
    config: MonitorConfig,
}

impl ConditionalOrderMonitor {
    pub fn new(
        router: Arc<dyn IntentRouter>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        sessions: SessionWindows,
        config: MonitorConfig,
    ) -> Self {
        Self {
            book: OrderBook::new(config.history_per_user),
            router,
            audit,
            clock,
            sessions,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionWindows {
        &self.sessions
    }

    /// Session at the monitor's current time.
    pub fn current_session(&self) -> TradingSession {
        self.sessions.session_at(self.clock.now())
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a conditional order. Without an explicit expiry it lives
    /// for the configured default.
    pub fn register(&self, request: OrderRequest) -> MonitorResult<OrderId> {
        let now = self.clock.now();
        let expires_at = request
            .expires_at
            .unwrap_or_else(|| now + Duration::hours(i64::from(self.config.default_expiry_hours)));
        self.insert(request, now, expires_at)
    }

    /// Register an order valid for `hours` from now.
    pub fn register_time_bound(&self, request: OrderRequest, hours: u32) -> MonitorResult<OrderId> {
        if hours == 0 {
            return Err(MonitorError::InvalidOrder(
                "expiry window must be at least one hour".to_string(),
            ));
        }
        let now = self.clock.now();
        self.insert(request, now, now + Duration::hours(i64::from(hours)))
    }

    /// Register an order that may only trigger during `session`.
    pub fn register_session_aware(
        &self,
        request: OrderRequest,
        session: TradingSession,
    ) -> MonitorResult<OrderId> {
        let now = self.clock.now();
        let expires_at = now + Duration::hours(i64::from(self.config.session_order_hours));
        self.insert(request.with_session(session), now, expires_at)
    }

    fn insert(
        &self,
        request: OrderRequest,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> MonitorResult<OrderId> {
        validate_request(&request, now, expires_at)?;

        let order = Arc::new(ConditionalOrder::from_request(request, now, expires_at));
        let id = order.id.clone();
        self.book.insert(Arc::clone(&order));
        Metrics::pending_orders_inc();

        let summary: Vec<String> = order.conditions.iter().map(|c| c.description.clone()).collect();
        self.audit.record(
            AuditRecord::new(
                AuditActor::Monitor,
                &order.user_id,
                id.as_str(),
                AuditEvent::OrderRegistered,
                now,
            )
            .with_reasons(summary),
        );
        info!(
            order_id = %id,
            user_id = %order.user_id,
            pair = %order.pair,
            action = %order.action,
            conditions = order.conditions.len(),
            expires_at = %expires_at,
            session = ?order.session_filter,
            "Conditional order registered"
        );
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn status(&self, id: &OrderId) -> MonitorResult<OrderStatus> {
        self.book
            .get(id)
            .map(|o| o.status())
            .ok_or_else(|| MonitorError::NotFound(id.clone()))
    }

    pub fn order(&self, id: &OrderId) -> MonitorResult<OrderView> {
        self.book
            .get(id)
            .map(|o| o.view())
            .ok_or_else(|| MonitorError::NotFound(id.clone()))
    }

    /// Orders that have not reached a terminal state.
    pub fn active_orders(&self, user_id: &UserId) -> Vec<OrderView> {
        self.book
            .for_user(user_id)
            .iter()
            .filter(|o| o.status().is_active())
            .map(|o| o.view())
            .collect()
    }

    /// Every order of the user, oldest first.
    pub fn history(&self, user_id: &UserId) -> Vec<OrderView> {
        self.book.for_user(user_id).iter().map(|o| o.view()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.book.pending().len()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn transition(
        &self,
        order: &ConditionalOrder,
        from: OrderStatus,
        to: OrderStatus,
        reasons: Vec<String>,
    ) -> Result<(), OrderStatus> {
        order.transition(from, to)?;

        let now = self.clock.now();
        if from == OrderStatus::Pending {
            self.book.unindex(order);
            Metrics::pending_orders_dec();
        }
        if to.is_terminal() {
            order.update_outcome(|o| o.closed_at = Some(now));
            self.book.archive(order);
        }
        Metrics::order_transition(to.as_str());
        self.audit.record(
            AuditRecord::new(
                AuditActor::Monitor,
                &order.user_id,
                order.id.as_str(),
                AuditEvent::OrderTransition {
                    from: from.as_str().to_string(),
                    to: to.as_str().to_string(),
                },
                now,
            )
            .with_reasons(reasons),
        );
        debug!(order_id = %order.id, from = %from, to = %to, "Order transition");
        Ok(())
    }

    /// Cancel a PENDING order.
    pub fn cancel(&self, id: &OrderId) -> MonitorResult<()> {
        let order = self
            .book
            .get(id)
            .ok_or_else(|| MonitorError::NotFound(id.clone()))?;

        match self.transition(
            &order,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            vec!["cancelled by user".to_string()],
        ) {
            Ok(()) => {
                info!(order_id = %id, user_id = %order.user_id, "Conditional order cancelled");
                Ok(())
            }
            Err(status) if status.is_terminal() => {
                warn!(order_id = %id, status = %status, "Refusing to mutate terminal order");
                Err(MonitorError::InvariantViolation {
                    order_id: id.clone(),
                    status,
                })
            }
            Err(status) => Err(MonitorError::NotPending {
                order_id: id.clone(),
                status,
            }),
        }
    }

    fn expire(&self, order: &ConditionalOrder) -> bool {
        let expired = self
            .transition(
                order,
                OrderStatus::Pending,
                OrderStatus::Expired,
                vec![format!("expired at {}", order.expires_at)],
            )
            .is_ok();
        if expired {
            info!(order_id = %order.id, user_id = %order.user_id, "Conditional order expired");
        }
        expired
    }

    /// Expire every PENDING order past its expiry.
    pub fn sweep_expired(&self) -> Vec<OrderId> {
        let now = self.clock.now();
        self.book
            .pending()
            .into_iter()
            .filter(|o| o.is_expired(now) && self.expire(o))
            .map(|o| o.id.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Tick processing
    // ------------------------------------------------------------------

    /// Evaluate the PENDING orders for the tick's pair.
    pub async fn on_tick(&self, tick: &MarketTick) -> TickReport {
        Metrics::tick_processed();
        let now = self.clock.now();
        let session = self.sessions.session_at(tick.timestamp);
        let mut report = TickReport::default();
        let mut triggered = Vec::new();

        for order in self.book.pending_for_pair(&tick.pair) {
            if order.is_expired(now) {
                if self.expire(&order) {
                    report.expired.push(order.id.clone());
                }
                continue;
            }
            if order.session_filter.is_some_and(|s| s != session) {
                continue;
            }
            if !order.conditions_met(tick) {
                continue;
            }

            let met: Vec<String> = order
                .conditions
                .iter()
                .filter(|c| c.is_met(tick))
                .map(|c| c.description.clone())
                .collect();
            // Losing to a concurrent cancel or expiry is silent.
            if self
                .transition(&order, OrderStatus::Pending, OrderStatus::Triggered, met)
                .is_ok()
            {
                order.update_outcome(|o| {
                    o.triggered_at = Some(now);
                    o.trigger_price = Some(tick.price);
                });
                info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    pair = %order.pair,
                    price = %tick.price,
                    "Conditional order triggered"
                );
                triggered.push(order);
            }
        }

        let settled = join_all(triggered.iter().map(|o| self.execute(o, tick, now))).await;
        for (order, status) in triggered.iter().zip(settled) {
            match status {
                OrderStatus::Filled => report.filled.push(order.id.clone()),
                OrderStatus::Failed => report.failed.push(order.id.clone()),
                _ => {}
            }
        }
        report
    }

    fn synthesize_intent(
        &self,
        order: &ConditionalOrder,
        tick: &MarketTick,
        now: DateTime<Utc>,
    ) -> TradeIntent {
        TradeIntent {
            id: IntentId::new(),
            user_id: order.user_id.clone(),
            pair: order.pair.clone(),
            action: order.action,
            position_size: order.position_size,
            entry_price: order.entry_price.unwrap_or(tick.price),
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            source: IntentSource::Conditional(order.id.clone()),
            created_at: now,
        }
    }

    async fn execute(
        &self,
        order: &ConditionalOrder,
        tick: &MarketTick,
        now: DateTime<Utc>,
    ) -> OrderStatus {
        let intent = self.synthesize_intent(order, tick, now);
        let intent_id = intent.id.clone();
        order.update_outcome(|o| o.intent_id = Some(intent_id.clone()));

        if let Err(status) = self.transition(
            order,
            OrderStatus::Triggered,
            OrderStatus::Executing,
            vec![format!("intent {intent_id}")],
        ) {
            warn!(order_id = %order.id, status = %status, "Triggered order changed state before execution");
            return status;
        }

        let (to, reasons) = match self.router.route(intent).await {
            RouteOutcome::Filled {
                broker_order_id,
                fill_price,
            } => {
                let reason = format!("filled at {fill_price} ({broker_order_id})");
                order.update_outcome(|o| {
                    o.broker_order_id = Some(broker_order_id);
                    o.fill_price = Some(fill_price);
                });
                (OrderStatus::Filled, vec![reason])
            }
            RouteOutcome::Rejected { reasons } => (OrderStatus::Failed, reasons),
            RouteOutcome::BrokerFailed { reason } => (OrderStatus::Failed, vec![reason]),
        };

        if to == OrderStatus::Failed {
            order.update_outcome(|o| o.failure_reasons = reasons.clone());
            warn!(order_id = %order.id, reasons = ?reasons, "Conditional order failed");
        } else {
            info!(order_id = %order.id, "Conditional order filled");
        }

        match self.transition(order, OrderStatus::Executing, to, reasons) {
            Ok(()) => to,
            Err(status) => status,
        }
    }
}

fn validate_request(
    request: &OrderRequest,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> MonitorResult<()> {
    if request.conditions.is_empty() {
        return Err(MonitorError::InvalidOrder(
            "at least one condition is required".to_string(),
        ));
    }
    for condition in &request.conditions {
        condition.check().map_err(MonitorError::InvalidOrder)?;
    }
    if !request.position_size.is_positive() {
        return Err(MonitorError::InvalidOrder(format!(
            "position size must be positive, got {}",
            request.position_size
        )));
    }
    let prices = [
        ("entry price", request.entry_price),
        ("stop loss", request.stop_loss),
        ("take profit", request.take_profit),
    ];
    for (name, price) in prices {
        if let Some(p) = price {
            if !p.is_positive() {
                return Err(MonitorError::InvalidOrder(format!(
                    "{name} must be positive, got {p}"
                )));
            }
        }
    }
    if expires_at <= now {
        return Err(MonitorError::InvalidOrder(format!(
            "expiry {expires_at} is not in the future"
        )));
    }
    Ok(())
}
