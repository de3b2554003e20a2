/// Healthcheck module - probes and their execution lifecycle
///
/// This module is responsible for:
/// - The probe contract shared by every check variant
/// - TCP and HTTP probes
/// - Validating check configurations
/// - Supervising the recurring (or one-off) execution of each check
pub mod http;
pub mod scheduler;
pub mod tcp;
pub mod types;
pub mod validation;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ConfigError, SetupError};

pub use http::{HttpConfig, HttpHealthcheck};
pub use scheduler::{Lifecycle, Supervisor};
pub use tcp::{TcpConfig, TcpHealthcheck};
pub use types::{Base, CheckResult, Protocol};

/// Capabilities every healthcheck variant provides.
#[async_trait]
pub trait Healthcheck: Send + Sync {
    /// Check required fields, ranges and the interval/timeout relation
    fn validate(&self) -> Result<(), ConfigError>;

    /// Derive state needed by `execute`. Idempotent.
    fn initialize(&mut self) -> Result<(), SetupError>;

    /// Run exactly one attempt bounded by `deadline`. Every failure ends up
    /// in the returned result, this never errors.
    async fn execute(&self, deadline: Instant) -> CheckResult;

    fn summary(&self) -> String;

    fn base(&self) -> &Base;

    /// Upper bound of a single execution
    fn timeout(&self) -> Duration;

    fn config(&self) -> ProbeConfig;

    fn set_source(&mut self, source: &str);

    fn identify(&self) -> &str {
        &self.base().name
    }
}

/// Serializable configuration of any probe variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeConfig {
    Tcp(TcpConfig),
    Http(HttpConfig),
}

impl ProbeConfig {
    pub fn base(&self) -> &Base {
        match self {
            ProbeConfig::Tcp(c) => &c.base,
            ProbeConfig::Http(c) => &c.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut Base {
        match self {
            ProbeConfig::Tcp(c) => &mut c.base,
            ProbeConfig::Http(c) => &mut c.base,
        }
    }
}

/// The closed set of probes the engine knows how to run
#[derive(Debug, Clone)]
pub enum Probe {
    Tcp(TcpHealthcheck),
    Http(HttpHealthcheck),
}

impl From<ProbeConfig> for Probe {
    fn from(config: ProbeConfig) -> Self {
        match config {
            ProbeConfig::Tcp(c) => Probe::Tcp(TcpHealthcheck::new(c)),
            ProbeConfig::Http(c) => Probe::Http(HttpHealthcheck::new(c)),
        }
    }
}

impl Probe {
    fn inner(&self) -> &dyn Healthcheck {
        match self {
            Probe::Tcp(c) => c,
            Probe::Http(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Healthcheck {
        match self {
            Probe::Tcp(c) => c,
            Probe::Http(c) => c,
        }
    }
}

#[async_trait]
impl Healthcheck for Probe {
    fn validate(&self) -> Result<(), ConfigError> {
        self.inner().validate()
    }

    fn initialize(&mut self) -> Result<(), SetupError> {
        self.inner_mut().initialize()
    }

    async fn execute(&self, deadline: Instant) -> CheckResult {
        self.inner().execute(deadline).await
    }

    fn summary(&self) -> String {
        self.inner().summary()
    }

    fn base(&self) -> &Base {
        self.inner().base()
    }

    fn timeout(&self) -> Duration {
        self.inner().timeout()
    }

    fn config(&self) -> ProbeConfig {
        self.inner().config()
    }

    fn set_source(&mut self, source: &str) {
        self.inner_mut().set_source(source);
    }
}

/// `host:port`, bracketing IPv6 literals
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
