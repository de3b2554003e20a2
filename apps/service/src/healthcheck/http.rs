use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, redirect};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};
use tracing::debug;
use url::Url;

use crate::config::duration;
use crate::error::{ConfigError, SetupError};
use crate::tls::TlsConfig;

use super::types::{Base, CheckResult, Protocol};
use super::validation::validate_common;
use super::{Healthcheck, ProbeConfig, join_host_port};

fn default_method() -> String {
    "GET".to_string()
}

fn default_valid_status() -> Vec<u16> {
    vec![200]
}

/// HTTP healthcheck configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    #[serde(flatten)]
    pub base: Base,

    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub path: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// Status codes considered healthy
    #[serde(default = "default_valid_status")]
    pub valid_status: Vec<u16>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<IpAddr>,

    #[serde(default, with = "duration")]
    pub timeout: Duration,

    #[serde(flatten)]
    pub tls: TlsConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base: Base::default(),
            target: String::new(),
            port: 0,
            protocol: Protocol::default(),
            path: String::new(),
            method: default_method(),
            valid_status: default_valid_status(),
            headers: BTreeMap::new(),
            source_ip: None,
            timeout: Duration::ZERO,
            tls: TlsConfig::default(),
        }
    }
}

impl HttpConfig {
    fn url(&self) -> String {
        format!("{}://{}{}", self.protocol, join_host_port(&self.target, self.port), self.path)
    }

    fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ConfigError::Invalid(format!("Invalid HTTP header name: {key}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ConfigError::Invalid(format!("Invalid value for HTTP header {key}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

/// Sends one request per execution and checks the response status.
///
/// Redirects are never followed: a 3xx is judged like any other status.
#[derive(Debug, Clone)]
pub struct HttpHealthcheck {
    config: HttpConfig,
    prepared: Option<(Client, Url, Method)>,
}

impl HttpHealthcheck {
    pub fn new(config: HttpConfig) -> Self {
        Self { config, prepared: None }
    }

    fn finish(&self, success: bool, message: String, started: Instant) -> CheckResult {
        let result = if success {
            CheckResult::success(&self.config.base.name, message)
        } else {
            CheckResult::failure(&self.config.base.name, message)
        };
        result.with_duration(started.elapsed()).with_summary(self.summary())
    }
}

#[async_trait]
impl Healthcheck for HttpHealthcheck {
    fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.config;
        validate_common(&c.base, &c.target, c.port, c.timeout)?;
        if c.valid_status.is_empty() {
            return Err(ConfigError::Missing("healthcheck valid-status list"));
        }
        if let Some(code) = c.valid_status.iter().find(|code| !(100..600).contains(*code)) {
            return Err(ConfigError::Invalid(format!("Invalid HTTP status code {code}")));
        }
        Method::from_bytes(c.method.to_uppercase().as_bytes())
            .map_err(|_| ConfigError::Invalid(format!("Unsupported HTTP method: {}", c.method)))?;
        c.header_map()?;
        c.tls.validate()
    }

    fn initialize(&mut self) -> Result<(), SetupError> {
        if self.prepared.is_some() {
            return Ok(());
        }

        let raw_url = self.config.url();
        let url = Url::parse(&raw_url).map_err(|source| SetupError::Url { url: raw_url, source })?;
        let method = Method::from_bytes(self.config.method.to_uppercase().as_bytes())
            .unwrap_or(Method::GET);

        let builder = Client::builder()
            .timeout(self.config.timeout)
            .redirect(redirect::Policy::none())
            .default_headers(self.config.header_map().unwrap_or_default())
            .local_address(self.config.source_ip);
        let client = self.config.tls.apply(builder)?.build().map_err(SetupError::Client)?;

        self.prepared = Some((client, url, method));
        Ok(())
    }

    async fn execute(&self, deadline: Instant) -> CheckResult {
        let started = Instant::now();
        let Some((client, url, method)) = &self.prepared else {
            return self.finish(false, "healthcheck is not initialized".into(), started);
        };
        debug!(name = %self.config.base.name, %url, "start executing healthcheck");

        let request = client.request(method.clone(), url.clone());
        match timeout_at(deadline, request.send()).await {
            Err(_) => self.finish(
                false,
                format!("HTTP request failed on {url}: timeout after {:?}", self.config.timeout),
                started,
            ),
            Ok(Err(e)) => self.finish(false, format!("HTTP request failed on {url}: {e}"), started),
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                if self.config.valid_status.contains(&status) {
                    self.finish(true, format!("success, status {status}"), started)
                } else {
                    self.finish(
                        false,
                        format!(
                            "HTTP request failed on {url}: status {status} not in {:?}",
                            self.config.valid_status
                        ),
                        started,
                    )
                }
            }
        }
    }

    fn summary(&self) -> String {
        let c = &self.config;
        let url = c.url();
        if c.base.description.is_empty() {
            format!("on {url}")
        } else {
            format!("{} on {url}", c.base.description)
        }
    }

    fn base(&self) -> &Base {
        &self.config.base
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn config(&self) -> ProbeConfig {
        ProbeConfig::Http(self.config.clone())
    }

    fn set_source(&mut self, source: &str) {
        self.config.base.source = source.to_string();
    }
}
