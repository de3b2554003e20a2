//! Secure transport settings shared by HTTP checks and exporters.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::{Certificate, ClientBuilder, Identity};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SetupError};
use crate::healthcheck::validation::validate_certificates;

/// Key, certificate and CA paths plus the insecure flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cacert: Option<PathBuf>,
    #[serde(default)]
    pub insecure: bool,
}

fn read_pem(path: &Path) -> Result<Vec<u8>, SetupError> {
    fs::read(path).map_err(|source| SetupError::TlsRead { path: path.to_path_buf(), source })
}

impl TlsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_certificates(self.key.as_ref(), self.cert.as_ref())
    }

    /// Apply these settings to a client under construction.
    pub fn apply(&self, mut builder: ClientBuilder) -> Result<ClientBuilder, SetupError> {
        if let Some(cacert) = &self.cacert {
            let pem = read_pem(cacert)?;
            let certificate = Certificate::from_pem(&pem).map_err(SetupError::Tls)?;
            builder = builder.add_root_certificate(certificate);
        }

        if let (Some(key), Some(cert)) = (&self.key, &self.cert) {
            let mut pem = read_pem(cert)?;
            pem.push(b'\n');
            pem.extend(read_pem(key)?);
            let identity = Identity::from_pem(&pem).map_err(SetupError::Tls)?;
            builder = builder.identity(identity);
        }

        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(builder)
    }
}
