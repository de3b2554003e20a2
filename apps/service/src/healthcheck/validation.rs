//! Field validation shared by every healthcheck variant.
//!
//! Rules are checked in a fixed order so the first failing rule always
//! produces the same error for a given configuration.

use std::time::Duration;

use crate::error::ConfigError;

use super::types::Base;

/// Shortest interval accepted for recurring checks
pub const MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Validate the name, present on every check
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Missing("healthcheck name"));
    }
    Ok(())
}

/// Validate the target host or IP
pub fn validate_target(target: &str) -> Result<(), ConfigError> {
    if target.trim().is_empty() {
        return Err(ConfigError::Missing("healthcheck target"));
    }
    if target.contains(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("Target '{target}' cannot contain spaces")));
    }
    Ok(())
}

/// Validate port is in valid range
pub fn validate_port(port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::Missing("healthcheck port"));
    }
    Ok(())
}

/// Validate the timeout is set
pub fn validate_timeout(timeout: Duration) -> Result<(), ConfigError> {
    if timeout.is_zero() {
        return Err(ConfigError::Missing("healthcheck timeout"));
    }
    Ok(())
}

/// Validate the interval against the timeout, recurring checks only
pub fn validate_schedule(base: &Base, timeout: Duration) -> Result<(), ConfigError> {
    if base.one_off {
        return Ok(());
    }
    if base.interval < MIN_INTERVAL {
        return Err(ConfigError::IntervalTooShort(base.interval));
    }
    if base.interval < timeout {
        return Err(ConfigError::IntervalBelowTimeout { interval: base.interval, timeout });
    }
    Ok(())
}

/// Key and certificate come as a pair or not at all
pub fn validate_certificates<K, C>(key: Option<K>, cert: Option<C>) -> Result<(), ConfigError> {
    match (key, cert) {
        (Some(_), None) | (None, Some(_)) => Err(ConfigError::CertificatePair),
        _ => Ok(()),
    }
}

/// Validation common to every probe: name, target, port, timeout, schedule
pub fn validate_common(
    base: &Base,
    target: &str,
    port: u16,
    timeout: Duration,
) -> Result<(), ConfigError> {
    validate_name(&base.name)?;
    validate_target(target)?;
    validate_port(port)?;
    validate_timeout(timeout)?;
    validate_schedule(base, timeout)
}
