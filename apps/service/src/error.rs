use std::io::Error as IoError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A configuration was rejected before anything got scheduled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The {0} is missing")]
    Missing(&'static str),
    #[error("The healthcheck interval should be greater than 2 seconds, got {0:?}")]
    IntervalTooShort(Duration),
    #[error("The healthcheck interval ({interval:?}) should be greater than the timeout ({timeout:?})")]
    IntervalBelowTimeout { interval: Duration, timeout: Duration },
    #[error("Invalid certificates: key and cert must be set together")]
    CertificatePair,
    #[error("Duplicate name '{0}' in configuration")]
    DuplicateName(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One-time setup of a check or exporter failed.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Failed to read TLS material {path}: {source}")]
    TlsRead {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("Invalid TLS material: {0}")]
    Tls(#[source] reqwest::Error),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Invalid URL {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// A push to an exporter failed. Never retried by the exporter itself.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Exporter {0} is not started")]
    NotStarted(String),
    #[error("Fail to convert result to json: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Fail to send healthchecks to {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} failed, status {status}")]
    Status { url: String, status: u16 },
    #[error("Push timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors reported synchronously to callers of the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Healthcheck {0} not found")]
    CheckNotFound(String),
    #[error("Exporter {0} not found")]
    ExporterNotFound(String),
    #[error("Exporter {0} already exists")]
    ExporterExists(String),
    #[error("The engine is shutting down")]
    ShuttingDown,
}

/// The admin API could not be bound.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid admin API address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error("Failed to bind the admin API: {0}")]
    Bind(#[source] IoError),
}
