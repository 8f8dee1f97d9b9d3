//! Configuration loading and typed config structures for Logtally.
//!
//! Configuration lives in a YAML file (`logtally.yaml` by default, or the
//! path named by `LOGTALLY_CONFIG`). Every field has a default, so a missing
//! file or a missing section yields a working configuration. Selected values
//! can be overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `LOGTALLY_ATTRIBUTE_KEY` | `aggregation.attribute_key` |
//! | `LOGTALLY_WINDOW_MS` | `aggregation.window_ms` |
//! | `LOGTALLY_MAX_QUEUE` | `aggregation.max_queue` |
//! | `LOGTALLY_LISTEN_ADDR` | `server.listen_addr` |
//! | `LOGTALLY_OUTPUT_FORMAT` | `output.format` |
//! | `LOGTALLY_OUTPUT_FILE` | `output.file` |
//!
//! [`LogtallyConfig::validate`] must pass before anything is started.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::aggregator::{AggregatorConfig, MAX_QUEUE_CAPACITY};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LOGTALLY_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "logtally.yaml";

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {name}: {message}")]
    Override {
        /// The environment variable name.
        name: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// A field holds a value outside its allowed range.
    #[error("invalid config field {field}: {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogtallyConfig {
    /// Aggregation engine settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// HTTP ingress settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Snapshot output settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Process logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LogtallyConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment overrides are applied after parsing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Override`] if an override does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from the file named by `LOGTALLY_CONFIG` (or `logtally.yaml`).
    ///
    /// A missing file is not an error: defaults plus environment overrides
    /// are returned instead.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file) for an existing file.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        if path.exists() {
            Self::from_file(&path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }

    /// Parse configuration from a YAML string without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides read from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Override`] if a variable is set but invalid.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Override`] if a variable is set but invalid.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("LOGTALLY_ATTRIBUTE_KEY") {
            self.aggregation.attribute_key = key;
        }
        if let Some(raw) = lookup("LOGTALLY_WINDOW_MS") {
            self.aggregation.window_ms = parse_override("LOGTALLY_WINDOW_MS", &raw)?;
        }
        if let Some(raw) = lookup("LOGTALLY_MAX_QUEUE") {
            self.aggregation.max_queue = parse_override("LOGTALLY_MAX_QUEUE", &raw)?;
        }
        if let Some(addr) = lookup("LOGTALLY_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(raw) = lookup("LOGTALLY_OUTPUT_FORMAT") {
            self.output.format = parse_override("LOGTALLY_OUTPUT_FORMAT", &raw)?;
        }
        if let Some(file) = lookup("LOGTALLY_OUTPUT_FILE") {
            self.output.file = if file.is_empty() {
                None
            } else {
                Some(PathBuf::from(file))
            };
        }
        Ok(())
    }

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation.attribute_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "aggregation.attribute_key",
                message: String::from("must not be empty"),
            });
        }
        if self.aggregation.window_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "aggregation.window_ms",
                message: String::from("must be greater than zero"),
            });
        }
        if self.aggregation.max_queue > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid {
                field: "aggregation.max_queue",
                message: format!("must not exceed {MAX_QUEUE_CAPACITY}"),
            });
        }
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Invalid {
                field: "server.listen_addr",
                message: String::from("must not be empty"),
            });
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "server.max_body_bytes",
                message: String::from("must be greater than zero"),
            });
        }
        if self.server.graceful_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "server.graceful_timeout_ms",
                message: String::from("must be greater than zero"),
            });
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid {
                field: "logging.format",
                message: format!("expected text or json, got {:?}", self.logging.format),
            });
        }
        Ok(())
    }
}

fn parse_override<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Override {
        name,
        message: format!("{raw:?}: {e}"),
    })
}

/// Aggregation engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AggregationConfig {
    /// Attribute whose value groups the counts.
    #[serde(default = "default_attribute_key")]
    pub attribute_key: String,

    /// Window length in milliseconds. Must be greater than zero.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Ingestion queue capacity. Zero rejects every enqueue.
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
}

impl AggregationConfig {
    /// The window length as a [`Duration`].
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// The engine-facing slice of this section.
    pub fn to_aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            window: self.window(),
            queue_capacity: self.max_queue,
            attribute_key: self.attribute_key.clone(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            attribute_key: default_attribute_key(),
            window_ms: default_window_ms(),
            max_queue: default_max_queue(),
        }
    }
}

fn default_attribute_key() -> String {
    String::from("foo")
}

const fn default_window_ms() -> u64 {
    10_000
}

const fn default_max_queue() -> usize {
    100_000
}

/// HTTP ingress configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Upper bound for each shutdown phase, in milliseconds.
    #[serde(default = "default_graceful_timeout_ms")]
    pub graceful_timeout_ms: u64,
}

impl ServerConfig {
    /// The graceful shutdown bound as a [`Duration`].
    pub const fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
            graceful_timeout_ms: default_graceful_timeout_ms(),
        }
    }
}

fn default_listen_addr() -> String {
    String::from("127.0.0.1:4318")
}

/// 16 MiB.
const fn default_max_body_bytes() -> usize {
    16_777_216
}

const fn default_graceful_timeout_ms() -> u64 {
    10_000
}

/// Where finalized snapshots go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Structured log events.
    Log,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "log" => Ok(Self::Log),
            other => Err(format!("unknown output format {other:?} (expected json or log)")),
        }
    }
}

/// Snapshot output configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Append JSON lines to this file instead of stdout.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Process logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("text")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = LogtallyConfig::default();
        assert_eq!(config.aggregation.attribute_key, "foo");
        assert_eq!(config.aggregation.window(), Duration::from_secs(10));
        assert_eq!(config.aggregation.max_queue, 100_000);
        assert_eq!(config.server.listen_addr, "127.0.0.1:4318");
        assert_eq!(config.server.max_body_bytes, 16_777_216);
        assert_eq!(config.server.graceful_timeout(), Duration::from_secs(10));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.file.is_none());
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_yaml_fills_defaults() {
        let yaml = r"
aggregation:
  attribute_key: service.name
  window_ms: 250
output:
  format: log
";
        let config = LogtallyConfig::parse(yaml).unwrap();
        assert_eq!(config.aggregation.attribute_key, "service.name");
        assert_eq!(config.aggregation.window_ms, 250);
        assert_eq!(config.aggregation.max_queue, 100_000);
        assert_eq!(config.output.format, OutputFormat::Log);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = LogtallyConfig::parse("{}").unwrap();
        assert_eq!(config, LogtallyConfig::default());
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let err = LogtallyConfig::parse("aggregation: [not, a, map]").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = LogtallyConfig::default();
        config
            .apply_overrides_from(lookup(&[
                ("LOGTALLY_ATTRIBUTE_KEY", "tenant"),
                ("LOGTALLY_WINDOW_MS", "500"),
                ("LOGTALLY_MAX_QUEUE", "0"),
                ("LOGTALLY_LISTEN_ADDR", "0.0.0.0:9000"),
                ("LOGTALLY_OUTPUT_FORMAT", "LOG"),
                ("LOGTALLY_OUTPUT_FILE", "/tmp/out.jsonl"),
            ]))
            .unwrap();
        assert_eq!(config.aggregation.attribute_key, "tenant");
        assert_eq!(config.aggregation.window_ms, 500);
        assert_eq!(config.aggregation.max_queue, 0);
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.output.format, OutputFormat::Log);
        assert_eq!(config.output.file, Some(PathBuf::from("/tmp/out.jsonl")));
    }

    #[test]
    fn unparseable_override_is_an_error() {
        let mut config = LogtallyConfig::default();
        let err = config
            .apply_overrides_from(lookup(&[("LOGTALLY_WINDOW_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Override {
                name: "LOGTALLY_WINDOW_MS",
                ..
            }
        ));
    }

    #[test]
    fn zero_window_fails_validation() {
        let mut config = LogtallyConfig::default();
        config.aggregation.window_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "aggregation.window_ms",
                ..
            }
        ));
    }

    #[test]
    fn oversized_max_queue_fails_validation() {
        let config =
            LogtallyConfig::parse("aggregation:\n  max_queue: 4611686018427387903\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "aggregation.max_queue",
                ..
            }
        ));

        let mut config = LogtallyConfig::default();
        config.aggregation.max_queue = MAX_QUEUE_CAPACITY;
        config.validate().unwrap();
    }

    #[test]
    fn empty_attribute_key_fails_validation() {
        let mut config = LogtallyConfig::default();
        config.aggregation.attribute_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_log_format_fails_validation() {
        let mut config = LogtallyConfig::default();
        config.logging.format = String::from("xml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn aggregator_slice_carries_engine_fields() {
        let mut config = AggregationConfig::default();
        config.window_ms = 20;
        config.max_queue = 4;
        let engine = config.to_aggregator_config();
        assert_eq!(engine.window, Duration::from_millis(20));
        assert_eq!(engine.queue_capacity, 4);
        assert_eq!(engine.attribute_key, "foo");
    }

    #[test]
    fn sample_config_matches_defaults() {
        let config = LogtallyConfig::parse(include_str!("../../../logtally.yaml")).unwrap();
        assert_eq!(config, LogtallyConfig::default());
        config.validate().unwrap();
    }
}
