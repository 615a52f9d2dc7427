//! Service wiring and lifecycle.

use crate::config::AppConfig;
use crate::error::AppResult;
use guard_api::AppState;
use guard_core::{Clock, SystemClock};
use guard_engine::GuardrailEngine;
use guard_executor::{BrokerExecution, PaperBroker};
use guard_monitor::{spawn_expiry_sweeper, TickDispatcher};
use guard_persistence::{AuditLog, JsonLinesWriter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Application {
    config: AppConfig,
    engine: Arc<GuardrailEngine>,
    dispatcher: Arc<TickDispatcher>,
    audit: Arc<AuditLog>,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the service against the paper broker and the system clock.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        warn!("No live broker adapter configured, executing against the paper broker");
        Self::with_parts(config, Arc::new(PaperBroker::new()), Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: AppConfig,
        broker: Arc<dyn BrokerExecution>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        config.validate()?;

        let audit = Arc::new(if config.audit.enabled {
            info!(
                data_dir = %config.audit.data_dir,
                prefix = %config.audit.prefix,
                "Audit sink enabled"
            );
            AuditLog::with_sink(JsonLinesWriter::new(
                &config.audit.data_dir,
                &config.audit.prefix,
                config.audit.buffer_size,
            ))
        } else {
            AuditLog::new()
        });

        let engine = Arc::new(GuardrailEngine::new(
            &config.engine,
            broker,
            Arc::clone(&audit),
            clock,
        )?);

        let shutdown = CancellationToken::new();
        let dispatcher = Arc::new(TickDispatcher::new(
            Arc::clone(engine.monitor()),
            config.engine.monitor.channel_capacity,
            shutdown.child_token(),
        ));

        Ok(Self {
            config,
            engine,
            dispatcher,
            audit,
            shutdown,
        })
    }

    pub fn engine(&self) -> &Arc<GuardrailEngine> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &Arc<TickDispatcher> {
        &self.dispatcher
    }

    /// Cancelling this token stops `run`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until ctrl-c or the shutdown token fires, then drain.
    pub async fn run(self) -> AppResult<()> {
        let sweeper = spawn_expiry_sweeper(
            Arc::clone(self.engine.monitor()),
            Duration::from_millis(self.config.engine.monitor.sweep_interval_ms),
            self.shutdown.child_token(),
        );

        let server = if self.config.api.enabled {
            let state = AppState::new(Arc::clone(&self.engine))
                .with_dispatcher(Arc::clone(&self.dispatcher));
            let api_config = self.config.api.clone();
            let token = self.shutdown.child_token();
            Some(tokio::spawn(async move {
                guard_api::run_server(state, &api_config, token).await
            }))
        } else {
            info!("API server disabled");
            None
        };

        info!("Guardrail service running");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            _ = self.shutdown.cancelled() => info!("Shutdown requested"),
        }
        self.shutdown.cancel();

        self.dispatcher.shutdown().await;
        if let Err(e) = sweeper.await {
            error!(error = %e, "Expiry sweeper task failed");
        }
        if let Some(server) = server {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task failed"),
            }
        }
        self.audit.flush();

        info!(
            pending_orders = self.engine.monitor().pending_count(),
            audit_entries = self.audit.len(),
            "Shutdown complete"
        );
        Ok(())
    }
}
