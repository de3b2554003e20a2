use std::collections::HashSet;
use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::exporter::HttpExporterConfig;
use crate::healthcheck::{HttpConfig, ProbeConfig, TcpConfig};

/// Source tag given to checks coming from the configuration file.
pub const CONFIGURATION_SOURCE: &str = "configuration";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub http: ApiConfig,
    #[serde(default)]
    pub tcp_checks: Vec<TcpConfig>,
    #[serde(default)]
    pub http_checks: Vec<HttpConfig>,
    #[serde(default)]
    pub exporters: ExportersConfig,
}

/// Runtime knobs of the engine and its dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineSettings {
    /// Capacity of the dispatcher ingress queue
    pub queue_size: usize,
    /// Upper bound on in-flight executions once a check is retired
    #[serde(with = "duration")]
    pub shutdown_grace: Duration,
    /// How often exporters marked unhealthy get a reconnect attempt
    #[serde(with = "duration")]
    pub reconnect_interval: Duration,
    /// Upper bound on a single push, on top of the exporter's own timeout
    #[serde(with = "duration")]
    pub push_timeout: Duration,
    /// Results older than this are purged from the store
    #[serde(with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub result_ttl: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            shutdown_grace: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(10),
            push_timeout: Duration::from_secs(5),
            result_ttl: None,
        }
    }
}

impl EngineSettings {
    /// Reject values the dispatcher and the purge task cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_size == 0 {
            return Err(ConfigError::Invalid("The engine queue-size should be greater than 0".into()));
        }
        let periods = [
            ("reconnect-interval", Some(self.reconnect_interval)),
            ("push-timeout", Some(self.push_timeout)),
            ("result-ttl", self.result_ttl),
        ];
        for (key, period) in periods {
            if period.is_some_and(|p| p.is_zero()) {
                return Err(ConfigError::Invalid(format!("The engine {key} should be greater than 0")));
            }
        }
        Ok(())
    }
}

/// Administrative API listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enabled: true, host: "127.0.0.1".into(), port: 9013 }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExportersConfig {
    #[serde(default)]
    pub http: Vec<HttpExporterConfig>,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/lookout/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::Invalid("no configuration directory available".into()));
    };

    Ok(path.join("lookout/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration State:")?;
        write_title_1(f, "Engine")?;
        write_1(f, "Queue Size", &self.engine.queue_size)?;
        write_1(f, "Shutdown Grace", &duration::format(self.engine.shutdown_grace))?;
        write_1(f, "Reconnect Interval", &duration::format(self.engine.reconnect_interval))?;
        write_title_1(f, "API")?;
        write_1(f, "Enabled", &self.http.enabled)?;
        write_1(f, "Listen", &format!("{}:{}", self.http.host, self.http.port))?;
        write_title_1(f, "Healthchecks")?;
        write_1(f, "TCP", &self.tcp_checks.len())?;
        write_1(f, "HTTP", &self.http_checks.len())?;
        write_title_1(f, "Exporters")?;
        write_1(f, "HTTP", &self.exporters.http.len())?;

        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(raw)?;
        config.engine.validate()?;
        config.check_names()?;
        Ok(config)
    }
}

impl Config {
    /// Read and parse the configuration file.
    ///
    /// Falls back to `$XDG_CONFIG_HOME/lookout/config.toml` when no path is
    /// given. Individual checks are not validated here, the engine does it
    /// when they get registered.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let raw_string = fs::read_to_string(&config_path)
            .map_err(|source| ConfigError::Read { path: config_path.clone(), source })?;
        raw_string.parse()
    }

    /// Every configured check, tagged with the configuration source.
    pub fn probes(&self) -> Vec<ProbeConfig> {
        let tcp = self.tcp_checks.iter().cloned().map(ProbeConfig::Tcp);
        let http = self.http_checks.iter().cloned().map(ProbeConfig::Http);
        tcp.chain(http)
            .map(|mut probe| {
                probe.base_mut().source = CONFIGURATION_SOURCE.to_string();
                probe
            })
            .collect()
    }

    fn check_names(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        let check_names = self
            .tcp_checks
            .iter()
            .map(|c| &c.base.name)
            .chain(self.http_checks.iter().map(|c| &c.base.name));
        for name in check_names {
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
        }

        let mut seen = HashSet::new();
        for exporter in &self.exporters.http {
            if !seen.insert(&exporter.name) {
                return Err(ConfigError::DuplicateName(exporter.name.clone()));
            }
        }
        Ok(())
    }
}

/// Human readable durations: `500ms`, `10s`, `5m`, `1h`. Bare integers are
/// seconds.
pub mod duration {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<Duration, String> {
        let raw = raw.trim();
        let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
        let (value, unit) = raw.split_at(split);
        let value: u64 = value.parse().map_err(|_| format!("invalid duration '{raw}'"))?;
        let scaled = |factor: u64| {
            value.checked_mul(factor).map(Duration::from_secs).ok_or_else(|| format!("duration '{raw}' is too large"))
        };
        match unit.trim() {
            "ms" => Ok(Duration::from_millis(value)),
            "" | "s" => Ok(Duration::from_secs(value)),
            "m" => scaled(60),
            "h" => scaled(3600),
            other => Err(format!("unknown duration unit '{other}' in '{raw}'")),
        }
    }

    pub fn format(duration: Duration) -> String {
        if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration such as \"500ms\", \"10s\" or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse(v).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("negative duration {v}")))
        }
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] Duration);

            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(d)| d))
        }
    }
}
