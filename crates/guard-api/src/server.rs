//! HTTP server implementation using axum.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use guard_core::{MarketTick, OrderId, UserId};
use guard_engine::{ExecutionReport, GuardrailEngine, SessionInfo};
use guard_monitor::{OrderView, TickDispatcher};
use guard_persistence::AuditEntry;
use guard_risk::{DailyTradingStats, Decision, KillSwitchSnapshot, RiskAssessment};
use guard_telemetry::Metrics;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::types::{
    AuditQuery, ConfigureProfileRequest, HealthResponse, OrderStatusResponse,
    RegisterOrderRequest, ResetResponse, TradeClosedRequest, TradeRequest, TriggerRequest,
};

/// Header carrying the operator token for kill switch resets.
pub const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<GuardrailEngine>,
    dispatcher: Option<Arc<TickDispatcher>>,
}

impl AppState {
    pub fn new(engine: Arc<GuardrailEngine>) -> Self {
        Self {
            engine,
            dispatcher: None,
        }
    }

    /// Route `POST /ticks` through a pair-partitioned dispatcher instead of
    /// evaluating inline.
    pub fn with_dispatcher(mut self, dispatcher: Arc<TickDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/session", get(current_session))
        .route("/trades/validate", post(validate_trade))
        .route("/trades/execute", post(execute_trade))
        .route("/orders", post(register_order))
        .route("/orders/{order_id}", get(get_order).delete(cancel_order))
        .route("/users/{user_id}/orders", get(list_orders))
        .route("/kill-switch/{user_id}", get(kill_switch_status))
        .route("/kill-switch/{user_id}/trigger", post(trigger_kill_switch))
        .route("/kill-switch/{user_id}/reset", post(reset_kill_switch))
        .route("/audit/{user_id}", get(audit_log))
        .route("/ticks", post(market_tick))
        .route("/risk/{user_id}", get(risk_assessment))
        .route("/risk/{user_id}/profile", put(configure_profile))
        .route("/risk/{user_id}/trades/close", post(trade_closed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Meta
// ============================================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pending_orders: state.engine.monitor().pending_count(),
    })
}

async fn metrics() -> ApiResult<Response> {
    let body = Metrics::render().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

async fn current_session(State(state): State<AppState>) -> Json<SessionInfo> {
    Json(state.engine.current_session())
}

// ============================================================================
// Trades
// ============================================================================

async fn validate_trade(
    State(state): State<AppState>,
    Json(body): Json<TradeRequest>,
) -> Json<Decision> {
    let intent = body.into_intent(state.engine.now());
    Json(state.engine.validate_trade(&intent).await)
}

async fn execute_trade(
    State(state): State<AppState>,
    Json(body): Json<TradeRequest>,
) -> Json<ExecutionReport> {
    let intent = body.into_intent(state.engine.now());
    Json(state.engine.execute_trade(&intent).await)
}

// ============================================================================
// Conditional orders
// ============================================================================

async fn register_order(
    State(state): State<AppState>,
    Json(body): Json<RegisterOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderStatusResponse>)> {
    let RegisterOrderRequest {
        order,
        expiry_hours,
    } = body;
    let engine = &state.engine;
    let order_id = match (expiry_hours, order.session_filter, order.expires_at) {
        (Some(hours), _, _) => engine.register_time_bound_order(order, hours)?,
        (None, Some(session), None) => engine.register_session_order(order, session)?,
        _ => engine.register_conditional_order(order)?,
    };
    let status = engine.order_status(&order_id)?;
    Ok((
        StatusCode::CREATED,
        Json(OrderStatusResponse {
            order_id: order_id.to_string(),
            status,
        }),
    ))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<OrderView>> {
    Ok(Json(state.engine.order(&OrderId::from_string(order_id))?))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<OrderStatusResponse>> {
    let order_id = OrderId::from_string(order_id);
    state.engine.cancel_order(&order_id)?;
    let status = state.engine.order_status(&order_id)?;
    Ok(Json(OrderStatusResponse {
        order_id: order_id.to_string(),
        status,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct OrderListQuery {
    #[serde(default)]
    active: bool,
}

async fn list_orders(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<OrderListQuery>,
) -> Json<Vec<OrderView>> {
    let user_id = UserId::new(user_id);
    if query.active {
        Json(state.engine.active_orders(&user_id))
    } else {
        Json(state.engine.order_history(&user_id))
    }
}

async fn market_tick(
    State(state): State<AppState>,
    Json(tick): Json<MarketTick>,
) -> ApiResult<Response> {
    match &state.dispatcher {
        Some(dispatcher) => {
            dispatcher.dispatch(tick).await?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        None => {
            let report = state.engine.on_market_tick(&tick).await;
            Ok(Json(report).into_response())
        }
    }
}

// ============================================================================
// Kill switch
// ============================================================================

async fn kill_switch_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<KillSwitchSnapshot> {
    Json(state.engine.kill_switch_status(&UserId::new(user_id)))
}

async fn trigger_kill_switch(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<TriggerRequest>,
) -> Json<serde_json::Value> {
    let user_id = UserId::new(user_id);
    let outcome = state.engine.trigger_kill_switch(&user_id, &body.reason);
    info!(user_id = %user_id, ?outcome, "Kill switch trigger requested");
    Json(json!({ "user_id": user_id, "outcome": outcome }))
}

async fn reset_kill_switch(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ResetResponse>> {
    let user_id = UserId::new(user_id);
    let token = headers
        .get(OPERATOR_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let was_triggered = state.engine.reset_kill_switch(&user_id, token)?;
    Ok(Json(ResetResponse {
        user_id,
        was_triggered,
    }))
}

// ============================================================================
// Audit
// ============================================================================

async fn audit_log(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    let user_id = UserId::new(user_id);
    if let Some(after_seq) = query.after_seq {
        return Ok(Json(state.engine.audit_since(&user_id, after_seq)));
    }
    let to = query.to.unwrap_or_else(|| state.engine.now());
    let from = query.from.unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
    Ok(Json(state.engine.query_audit_log(&user_id, from, to)?))
}

// ============================================================================
// Risk
// ============================================================================

async fn risk_assessment(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<RiskAssessment>> {
    Ok(Json(
        state.engine.risk_assessment(&UserId::new(user_id)).await?,
    ))
}

async fn configure_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<ConfigureProfileRequest>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .configure_risk_profile(&UserId::new(user_id), body.profile, body.equity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trade_closed(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<TradeClosedRequest>,
) -> ApiResult<Json<DailyTradingStats>> {
    Ok(Json(
        state
            .engine
            .record_trade_closed(&UserId::new(user_id), body.pnl)
            .await?,
    ))
}

// ============================================================================
// Server
// ============================================================================

/// Bind and serve until `shutdown` is cancelled.
pub async fn run_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
