/// Exporter module - sinks receiving every check result
///
/// An exporter goes `Stopped -> Started -> Stopped`. It never retries a
/// failed push itself: the dispatcher stops it and the reconnect ticker
/// brings it back.
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ExportError};
use crate::healthcheck::CheckResult;

pub use http::{HttpExporter, HttpExporterConfig};

/// Lifecycle every exporter variant provides
#[async_trait]
pub trait Export: Send + Sync {
    /// Acquire whatever the exporter needs to push
    async fn start(&self) -> Result<(), ExportError>;

    /// Go back to started after a failure, without a full stop/start cycle
    async fn reconnect(&self) -> Result<(), ExportError>;

    /// Release resources. Stopping twice is harmless.
    async fn stop(&self) -> Result<(), ExportError>;

    /// Deliver one result. Fails when the exporter is not started.
    async fn push(&self, result: &CheckResult) -> Result<(), ExportError>;

    fn is_started(&self) -> bool;

    fn name(&self) -> &str;

    fn config(&self) -> ExporterConfig;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExporterConfig {
    Http(HttpExporterConfig),
}

/// The closed set of exporters the engine can drive
#[derive(Debug)]
pub enum Exporter {
    Http(HttpExporter),
}

impl TryFrom<ExporterConfig> for Exporter {
    type Error = EngineError;

    fn try_from(config: ExporterConfig) -> Result<Self, Self::Error> {
        match config {
            ExporterConfig::Http(c) => Ok(Exporter::Http(HttpExporter::new(c)?)),
        }
    }
}

impl Exporter {
    fn inner(&self) -> &dyn Export {
        match self {
            Exporter::Http(e) => e,
        }
    }
}

#[async_trait]
impl Export for Exporter {
    async fn start(&self) -> Result<(), ExportError> {
        self.inner().start().await
    }

    async fn reconnect(&self) -> Result<(), ExportError> {
        self.inner().reconnect().await
    }

    async fn stop(&self) -> Result<(), ExportError> {
        self.inner().stop().await
    }

    async fn push(&self, result: &CheckResult) -> Result<(), ExportError> {
        self.inner().push(result).await
    }

    fn is_started(&self) -> bool {
        self.inner().is_started()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn config(&self) -> ExporterConfig {
        self.inner().config()
    }
}
