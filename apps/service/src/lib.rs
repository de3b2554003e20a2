#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod healthcheck;
pub mod store;
pub mod tls;

pub use config::Config;
pub use engine::Engine;
pub use error::{ApiError, ConfigError, EngineError, ExportError, SetupError};
pub use exporter::{Export, Exporter, ExporterConfig};
pub use healthcheck::{CheckResult, Healthcheck, Probe, ProbeConfig};
