use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::config::duration;
use crate::error::{ConfigError, SetupError};

use super::types::{Base, CheckResult};
use super::validation::validate_common;
use super::{Healthcheck, ProbeConfig, join_host_port};

/// TCP healthcheck configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TcpConfig {
    #[serde(flatten)]
    pub base: Base,

    /// Host name or IP address
    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub port: u16,

    /// Local address to bind before connecting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<IpAddr>,

    #[serde(default, with = "duration")]
    pub timeout: Duration,

    /// The check passes when the connection fails
    #[serde(default)]
    pub should_fail: bool,
}

/// Checks that a TCP connection can (or cannot) be established
#[derive(Debug, Clone)]
pub struct TcpHealthcheck {
    config: TcpConfig,
    address: Option<String>,
}

impl TcpHealthcheck {
    pub fn new(config: TcpConfig) -> Self {
        Self { config, address: None }
    }

    /// The `host:port` string, once initialized
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    async fn connect(&self, address: &str) -> std::io::Result<TcpStream> {
        let Some(source_ip) = self.config.source_ip else {
            return TcpStream::connect(address).await;
        };

        let remote = lookup_host(address)
            .await?
            .find(|addr| addr.is_ipv4() == source_ip.is_ipv4())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("no address of {address} matches the source IP {source_ip} family"),
                )
            })?;

        let socket = if source_ip.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.bind(SocketAddr::new(source_ip, 0))?;
        socket.connect(remote).await
    }

    fn failure(&self, message: String, started: Instant) -> CheckResult {
        CheckResult::failure(&self.config.base.name, message)
            .with_duration(started.elapsed())
            .with_summary(self.summary())
    }

    fn success(&self, message: String, started: Instant) -> CheckResult {
        CheckResult::success(&self.config.base.name, message)
            .with_duration(started.elapsed())
            .with_summary(self.summary())
    }
}

#[async_trait]
impl Healthcheck for TcpHealthcheck {
    fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.config;
        validate_common(&c.base, &c.target, c.port, c.timeout)
    }

    fn initialize(&mut self) -> Result<(), SetupError> {
        self.address = Some(join_host_port(&self.config.target, self.config.port));
        Ok(())
    }

    async fn execute(&self, deadline: Instant) -> CheckResult {
        let started = Instant::now();
        let Some(address) = self.address() else {
            return self.failure("healthcheck is not initialized".into(), started);
        };
        debug!(name = %self.config.base.name, address, "start executing healthcheck");

        let outcome = match timeout_at(deadline, self.connect(address)).await {
            // The stream is dropped right here, closing the connection
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(format!("TCP connection failed on {address}: {e}")),
            Err(_) => Err(format!(
                "TCP connection failed on {address}: timeout after {:?}",
                self.config.timeout
            )),
        };

        match (outcome, self.config.should_fail) {
            (Ok(()), false) => self.success(format!("TCP connection established on {address}"), started),
            (Ok(()), true) => self.failure(
                format!("TCP check is successful on {address} but an error was expected"),
                started,
            ),
            (Err(e), false) => self.failure(e, started),
            (Err(e), true) => self.success(format!("TCP check failed as expected: {e}"), started),
        }
    }

    fn summary(&self) -> String {
        let c = &self.config;
        let mut summary = if c.base.description.is_empty() {
            format!("on {}:{}", c.target, c.port)
        } else {
            format!("{} on {}:{}", c.base.description, c.target, c.port)
        };
        if c.should_fail {
            summary.push_str(". This healthcheck has should-fail=true.");
        }
        summary
    }

    fn base(&self) -> &Base {
        &self.config.base
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn config(&self) -> ProbeConfig {
        ProbeConfig::Tcp(self.config.clone())
    }

    fn set_source(&mut self, source: &str) {
        self.config.base.source = source.to_string();
    }
}
