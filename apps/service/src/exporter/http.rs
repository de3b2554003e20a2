use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, redirect};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use super::{Export, ExporterConfig};
use crate::error::{ConfigError, EngineError, ExportError, SetupError};
use crate::healthcheck::validation::validate_certificates;
use crate::healthcheck::{CheckResult, Protocol};
use crate::healthcheck::join_host_port;
use crate::tls::TlsConfig;

/// Timeout of a single push request
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// The configuration for the HTTP exporter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpExporterConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(flatten)]
    pub tls: TlsConfig,
}

impl HttpExporterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("Invalid host for the HTTP exporter configuration".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("Invalid name for the HTTP exporter configuration".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("Invalid port for the HTTP exporter configuration".into()));
        }
        validate_certificates(self.tls.key.as_ref(), self.tls.cert.as_ref())
    }

    /// scheme://host:port/path, the path may be empty
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.protocol, join_host_port(&self.host, self.port), self.path)
    }
}

/// POSTs every result as a single-element JSON array.
///
/// The client is built once and reused across pushes. Redirects are not
/// followed, a redirect response is the final answer.
#[derive(Debug)]
pub struct HttpExporter {
    config: HttpExporterConfig,
    url: Url,
    client: Client,
    started: AtomicBool,
}

impl HttpExporter {
    /// Validate the configuration and build the client
    pub fn new(config: HttpExporterConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let raw_url = config.url();
        let url = Url::parse(&raw_url).map_err(|source| SetupError::Url { url: raw_url, source })?;
        let builder = Client::builder().timeout(PUSH_TIMEOUT).redirect(redirect::Policy::none());
        let client = config.tls.apply(builder)?.build().map_err(SetupError::Client)?;

        Ok(Self { config, url, client, started: AtomicBool::new(false) })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Export for HttpExporter {
    async fn start(&self) -> Result<(), ExportError> {
        info!(exporter = %self.config.name, url = %self.url, "Starting the HTTP healthcheck exporter");
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), ExportError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ExportError> {
        if self.started.swap(false, Ordering::SeqCst) {
            info!(exporter = %self.config.name, "Stopping the HTTP exporter");
        }
        Ok(())
    }

    async fn push(&self, result: &CheckResult) -> Result<(), ExportError> {
        if !self.is_started() {
            return Err(ExportError::NotStarted(self.config.name.clone()));
        }

        let payload = serde_json::to_vec(&[result])?;
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|source| ExportError::Request { url: self.url.to_string(), source })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(ExportError::Status { url: self.url.to_string(), status });
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> ExporterConfig {
        ExporterConfig::Http(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> HttpExporterConfig {
        HttpExporterConfig {
            name: "foo".into(),
            host: server.address().ip().to_string(),
            port: server.address().port(),
            path: "/results".into(),
            ..HttpExporterConfig::default()
        }
    }

    #[test]
    fn test_config_validation() {
        let valid = HttpExporterConfig {
            name: "foo".into(),
            host: "localhost".into(),
            port: 8080,
            ..HttpExporterConfig::default()
        };
        assert!(valid.validate().is_ok());

        let mut c = valid.clone();
        c.host.clear();
        assert!(c.validate().is_err());

        let mut c = valid.clone();
        c.name.clear();
        assert!(c.validate().is_err());

        let mut c = valid.clone();
        c.port = 0;
        assert!(c.validate().is_err());

        let mut c = valid.clone();
        c.tls.key = Some("key.pem".into());
        assert!(matches!(c.validate(), Err(ConfigError::CertificatePair)));

        let mut c = valid;
        c.tls.key = Some("key.pem".into());
        c.tls.cert = Some("cert.pem".into());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_url_construction() {
        let mut c = HttpExporterConfig {
            name: "foo".into(),
            host: "localhost".into(),
            port: 8080,
            ..HttpExporterConfig::default()
        };
        assert_eq!(c.url(), "http://localhost:8080");

        c.protocol = Protocol::Https;
        c.path = "/push".into();
        assert_eq!(c.url(), "https://localhost:8080/push");
    }

    #[tokio::test]
    async fn test_push_posts_single_element_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/results"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let exporter = HttpExporter::new(config(&server)).unwrap();
        exporter.start().await.unwrap();
        exporter.push(&CheckResult::success("foo", "message")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Vec<CheckResult> = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].name, "foo");
        assert!(body[0].success);
    }

    #[tokio::test]
    async fn test_push_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let exporter = HttpExporter::new(config(&server)).unwrap();
        exporter.start().await.unwrap();
        let err = exporter.push(&CheckResult::success("foo", "")).await.unwrap_err();
        assert!(matches!(err, ExportError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_redirect_is_final_response() {
        let server = MockServer::start().await;
        Mock::given(path("/results"))
            .respond_with(ResponseTemplate::new(307).insert_header("Location", "/moved"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/moved"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let exporter = HttpExporter::new(config(&server)).unwrap();
        exporter.start().await.unwrap();
        assert!(exporter.push(&CheckResult::success("foo", "")).await.is_ok());
    }

    #[tokio::test]
    async fn test_push_after_stop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let exporter = HttpExporter::new(config(&server)).unwrap();
        exporter.start().await.unwrap();
        exporter.stop().await.unwrap();

        let err = exporter.push(&CheckResult::success("foo", "")).await.unwrap_err();
        assert!(matches!(err, ExportError::NotStarted(_)));
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let server = MockServer::start().await;
        let exporter = HttpExporter::new(config(&server)).unwrap();

        exporter.start().await.unwrap();
        exporter.stop().await.unwrap();
        exporter.stop().await.unwrap();
        assert!(!exporter.is_started());

        exporter.reconnect().await.unwrap();
        assert!(exporter.is_started());
    }
}
