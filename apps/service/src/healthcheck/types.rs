use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::duration;

/// Transport used by HTTP checks and exporters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Configuration fields shared by every healthcheck variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Base {
    /// Identity of the check: scheduling, result tagging, store key
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Cadence between executions, ignored for one-off checks
    #[serde(default, with = "duration")]
    pub interval: Duration,

    /// Execute exactly once, then retire
    #[serde(default)]
    pub one_off: bool,

    /// Where this check came from, set after construction
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// Outcome of a single healthcheck execution.
///
/// Produced once per execution and shared as `Arc<CheckResult>` by the
/// dispatcher; nothing mutates it after it leaves the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check that produced this result
    pub name: String,

    pub success: bool,

    /// Unix timestamp (seconds) at which the execution completed
    #[serde(rename = "healthcheck_timestamp")]
    pub timestamp: u64,

    /// Error text on failure, status detail on success
    pub message: String,

    /// Execution latency in milliseconds
    #[serde(rename = "duration_ms", default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl CheckResult {
    fn new(name: impl Into<String>, success: bool, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success,
            timestamp: unix_now(),
            message: message.into(),
            duration_ms: None,
            summary: None,
        }
    }

    /// A passing result
    pub fn success(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, true, message)
    }

    /// A failing result with its diagnostic
    pub fn failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, false, message)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_wire_format() {
        let result = CheckResult {
            name: "foo".into(),
            success: true,
            timestamp: 1_700_000_000,
            message: "message".into(),
            duration_ms: None,
            summary: None,
        };

        let value = serde_json::to_value(vec![&result]).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "name": "foo",
                "success": true,
                "healthcheck_timestamp": 1_700_000_000u64,
                "message": "message",
            }])
        );
    }

    #[test]
    fn test_result_builders() {
        let result = CheckResult::failure("db", "connection refused")
            .with_duration(Duration::from_millis(42))
            .with_summary("on 10.0.0.4:5432");

        assert!(!result.success);
        assert_eq!(result.duration_ms, Some(42));
        assert_eq!(result.summary.as_deref(), Some("on 10.0.0.4:5432"));
        assert!(result.timestamp > 0);
    }

    #[test]
    fn test_protocol_scheme() {
        assert_eq!(Protocol::Http.scheme(), "http");
        assert_eq!(Protocol::Https.to_string(), "https");
        assert_eq!(Protocol::default(), Protocol::Http);
    }
}
