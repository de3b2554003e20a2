//! Result fan-out from supervisors to the store and exporters.
//!
//! Every supervisor publishes into one bounded queue. A single task reads
//! each result once, records it in the store and pushes it to every started
//! exporter in turn before taking the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineSettings;
use crate::exporter::{Export, Exporter};
use crate::healthcheck::CheckResult;
use crate::store::MemoryStore;

/// Exporters by name, shared between the engine and the dispatcher
pub type ExporterRegistry = Arc<RwLock<HashMap<String, Arc<Exporter>>>>;

/// Sending half handed to every supervisor
#[derive(Debug, Clone)]
pub struct ResultPublisher {
    tx: mpsc::Sender<Arc<CheckResult>>,
}

impl ResultPublisher {
    pub fn new(tx: mpsc::Sender<Arc<CheckResult>>) -> Self {
        Self { tx }
    }

    /// Queue a result without waiting. A full queue drops the result.
    pub fn publish(&self, result: CheckResult) {
        match self.tx.try_send(Arc::new(result)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(result)) => {
                warn!(name = %result.name, "Result queue is full, dropping result");
            }
            Err(mpsc::error::TrySendError::Closed(result)) => {
                debug!(name = %result.name, "Result queue is closed, dropping result");
            }
        }
    }
}

pub struct Dispatcher {
    rx: mpsc::Receiver<Arc<CheckResult>>,
    store: Arc<MemoryStore>,
    exporters: ExporterRegistry,
    push_timeout: Duration,
    reconnect_interval: Duration,
}

impl Dispatcher {
    /// Spawn the fan-out task. It drains the queue and returns once `token`
    /// is cancelled.
    pub fn spawn(
        settings: &EngineSettings,
        store: Arc<MemoryStore>,
        exporters: ExporterRegistry,
        token: CancellationToken,
    ) -> (ResultPublisher, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.queue_size.max(1));
        let dispatcher = Self {
            rx,
            store,
            exporters,
            push_timeout: settings.push_timeout,
            reconnect_interval: settings.reconnect_interval,
        };
        (ResultPublisher::new(tx), tokio::spawn(dispatcher.run(token)))
    }

    async fn run(mut self, token: CancellationToken) {
        let mut reconnect = interval(self.reconnect_interval);
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reconnect.tick().await;

        let mut closing = false;
        loop {
            tokio::select! {
                maybe_result = self.rx.recv() => match maybe_result {
                    Some(result) => self.deliver(result).await,
                    None => break,
                },
                _ = reconnect.tick() => self.reconnect_unhealthy().await,
                _ = token.cancelled(), if !closing => {
                    // Stop accepting results, keep delivering what is queued
                    closing = true;
                    self.rx.close();
                }
            }
        }
        info!("Result dispatcher stopped");
    }

    async fn deliver(&self, result: Arc<CheckResult>) {
        self.store.set(result.clone());

        let exporters: Vec<Arc<Exporter>> = self.exporters.read().await.values().cloned().collect();
        for exporter in exporters.iter().filter(|e| e.is_started()) {
            let pushed = match timeout(self.push_timeout, exporter.push(&result)).await {
                Ok(pushed) => pushed,
                Err(_) => Err(crate::error::ExportError::Timeout(self.push_timeout)),
            };

            match pushed {
                Ok(()) => debug!(exporter = exporter.name(), name = %result.name, "Result pushed"),
                Err(e) => {
                    error!(exporter = exporter.name(), name = %result.name, error = %e, "Fail to push result, stopping exporter");
                    if let Err(e) = exporter.stop().await {
                        error!(exporter = exporter.name(), error = %e, "Fail to stop exporter");
                    }
                }
            }
        }
    }

    async fn reconnect_unhealthy(&self) {
        let exporters: Vec<Arc<Exporter>> = self.exporters.read().await.values().cloned().collect();
        for exporter in exporters.iter().filter(|e| !e.is_started()) {
            info!(exporter = exporter.name(), "Reconnecting exporter");
            if let Err(e) = exporter.reconnect().await {
                error!(exporter = exporter.name(), error = %e, "Fail to reconnect exporter");
            }
        }
    }
}
