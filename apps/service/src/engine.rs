//! Engine - coordinates checks, exporters and the result pipeline
//!
//! The engine owns:
//! - One supervisor per registered check
//! - The exporter registry, shared with the dispatcher
//! - The dispatcher task and the store purge task
//!
//! Registries are only locked while membership changes; executions and
//! pushes never run under those locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::dispatcher::{Dispatcher, ExporterRegistry, ResultPublisher};
use crate::error::EngineError;
use crate::exporter::{Export, Exporter, ExporterConfig};
use crate::healthcheck::{Healthcheck, Probe, ProbeConfig, Supervisor};
use crate::store::MemoryStore;

struct RegisteredCheck {
    config: ProbeConfig,
    supervisor: Supervisor,
}

/// Main coordinator of the daemon
pub struct Engine {
    settings: EngineSettings,
    checks: RwLock<HashMap<String, RegisteredCheck>>,
    exporters: ExporterRegistry,
    store: Arc<MemoryStore>,
    publisher: ResultPublisher,
    closing: AtomicBool,
    background_token: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    purge: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Create the engine and start its dispatcher. Must be called from
    /// within a tokio runtime.
    pub fn new(settings: EngineSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let exporters = ExporterRegistry::default();
        let background_token = CancellationToken::new();

        let (publisher, dispatcher) =
            Dispatcher::spawn(&settings, store.clone(), exporters.clone(), background_token.clone());
        let purge = settings
            .result_ttl
            .map(|ttl| store.clone().spawn_purge(ttl, background_token.clone()));

        Self {
            settings,
            checks: RwLock::new(HashMap::new()),
            exporters,
            store,
            publisher,
            closing: AtomicBool::new(false),
            background_token,
            dispatcher: Mutex::new(Some(dispatcher)),
            purge: Mutex::new(purge),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }

    /// Validate, initialize and start a check.
    ///
    /// Nothing is registered when validation or setup fails. A running
    /// check with the same name is retired and replaced.
    pub async fn add_check(&self, probe: Probe) -> Result<(), EngineError> {
        self.ensure_running()?;

        let prepared = Supervisor::prepare(probe)?;
        let config = prepared.check().config();
        let name = prepared.check().identify().to_string();

        let replaced = {
            let mut checks = self.checks.write().await;
            // Shutdown drains under this lock, nothing may be spawned after it
            self.ensure_running()?;
            let replaced = checks.remove(&name);
            if let Some(old) = &replaced {
                old.supervisor.cancel();
            }
            let supervisor = prepared.spawn(self.publisher.clone(), self.settings.shutdown_grace);
            checks.insert(name.clone(), RegisteredCheck { config, supervisor });
            replaced
        };

        if let Some(old) = replaced {
            info!(name = %name, "Replacing existing healthcheck");
            old.supervisor.join().await;
        }
        Ok(())
    }

    /// Retire a check and wait for its task to return
    pub async fn remove_check(&self, name: &str) -> Result<(), EngineError> {
        let removed = {
            let mut checks = self.checks.write().await;
            checks.retain(|_, c| !c.supervisor.is_finished());
            checks.remove(name)
        };

        match removed {
            Some(check) => {
                info!(name, "Removing healthcheck");
                check.supervisor.retire().await;
                Ok(())
            }
            None => Err(EngineError::CheckNotFound(name.to_string())),
        }
    }

    /// Configurations of the checks still scheduled, sorted by name
    pub async fn list_checks(&self) -> Vec<ProbeConfig> {
        let checks = self.checks.read().await;
        let mut configs: Vec<ProbeConfig> = checks
            .values()
            .filter(|c| !c.supervisor.is_finished())
            .map(|c| c.config.clone())
            .collect();
        configs.sort_by(|a, b| a.base().name.cmp(&b.base().name));
        configs
    }

    /// Start an exporter and register it with the dispatcher
    pub async fn add_exporter(&self, exporter: Exporter) -> Result<(), EngineError> {
        self.ensure_running()?;

        let name = exporter.name().to_string();
        if self.exporters.read().await.contains_key(&name) {
            return Err(EngineError::ExporterExists(name));
        }

        exporter.start().await?;
        let exporter = Arc::new(exporter);

        let rejected = {
            let mut exporters = self.exporters.write().await;
            if let Err(e) = self.ensure_running() {
                Some((exporter, e))
            } else if exporters.contains_key(&name) {
                Some((exporter, EngineError::ExporterExists(name.clone())))
            } else {
                exporters.insert(name.clone(), exporter);
                None
            }
        };

        match rejected {
            Some((exporter, e)) => {
                if let Err(stop) = exporter.stop().await {
                    warn!(exporter = %name, error = %stop, "Fail to stop rejected exporter");
                }
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Unregister an exporter, then stop it
    pub async fn remove_exporter(&self, name: &str) -> Result<(), EngineError> {
        let removed = self.exporters.write().await.remove(name);
        match removed {
            Some(exporter) => {
                exporter.stop().await?;
                Ok(())
            }
            None => Err(EngineError::ExporterNotFound(name.to_string())),
        }
    }

    pub async fn list_exporters(&self) -> Vec<ExporterConfig> {
        let exporters = self.exporters.read().await;
        let mut configs: Vec<ExporterConfig> = exporters.values().map(|e| e.config()).collect();
        configs.sort_by(|a, b| match (a, b) {
            (ExporterConfig::Http(a), ExporterConfig::Http(b)) => a.name.cmp(&b.name),
        });
        configs
    }

    /// Retire every check, drain the dispatcher, then stop every exporter.
    ///
    /// Checks stop producing before sinks are torn down. Calling this more
    /// than once is harmless.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        info!("Shutting down the engine");

        let checks: Vec<RegisteredCheck> = self.checks.write().await.drain().map(|(_, c)| c).collect();
        for check in &checks {
            check.supervisor.cancel();
        }
        join_all(checks.into_iter().map(|c| c.supervisor.join())).await;

        self.background_token.cancel();
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            if let Err(e) = dispatcher.await {
                error!(error = %e, "Result dispatcher ended abnormally");
            }
        }
        if let Some(purge) = self.purge.lock().await.take() {
            if let Err(e) = purge.await {
                warn!(error = %e, "Store purge task ended abnormally");
            }
        }

        let exporters: Vec<Arc<Exporter>> =
            self.exporters.write().await.drain().map(|(_, e)| e).collect();
        for exporter in exporters {
            if let Err(e) = exporter.stop().await {
                warn!(exporter = exporter.name(), error = %e, "Fail to stop exporter");
            }
        }
        info!("Engine stopped");
    }
}
