//! Pair-partitioned tick dispatch.
//!
//! One worker task per pair, fed by a bounded mpsc channel. Ticks for a
//! pair are processed strictly in arrival order; different pairs are
//! evaluated in parallel.

use crate::error::{MonitorError, MonitorResult};
use crate::monitor::ConditionalOrderMonitor;
use dashmap::DashMap;
use guard_core::{MarketTick, Pair};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct TickDispatcher {
    monitor: Arc<ConditionalOrderMonitor>,
    workers: DashMap<Pair, mpsc::Sender<MarketTick>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
    shutdown: CancellationToken,
}

impl TickDispatcher {
    pub fn new(
        monitor: Arc<ConditionalOrderMonitor>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            monitor,
            workers: DashMap::new(),
            handles: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            shutdown,
        }
    }

    fn sender(&self, pair: &Pair) -> mpsc::Sender<MarketTick> {
        if let Some(tx) = self.workers.get(pair) {
            return tx.clone();
        }
        self.workers
            .entry(pair.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.capacity);
                let handle = tokio::spawn(run_worker(
                    pair.clone(),
                    Arc::clone(&self.monitor),
                    rx,
                    self.shutdown.clone(),
                ));
                self.handles.lock().push(handle);
                debug!(pair = %pair, "Tick worker spawned");
                tx
            })
            .clone()
    }

    /// Queue a tick for its pair's worker. Waits when the queue is full.
    pub async fn dispatch(&self, tick: MarketTick) -> MonitorResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(MonitorError::DispatcherClosed);
        }
        let tx = self.sender(&tick.pair);
        tx.send(tick)
            .await
            .map_err(|_| MonitorError::DispatcherClosed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting ticks, drain queued ones and wait for the workers.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.workers.clear();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("Tick dispatcher stopped");
    }
}

async fn run_worker(
    pair: Pair,
    monitor: Arc<ConditionalOrderMonitor>,
    mut rx: mpsc::Receiver<MarketTick>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(tick) => {
                    let report = monitor.on_tick(&tick).await;
                    if !report.is_empty() {
                        debug!(
                            pair = %pair,
                            expired = report.expired.len(),
                            filled = report.filled.len(),
                            failed = report.failed.len(),
                            "Tick settled orders"
                        );
                    }
                }
                None => break,
            },
            _ = shutdown.cancelled() => {
                rx.close();
                while let Some(tick) = rx.recv().await {
                    monitor.on_tick(&tick).await;
                }
                break;
            }
        }
    }
    debug!(pair = %pair, "Tick worker stopped");
}
