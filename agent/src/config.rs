//! Agent configuration
//!
//! Same layering as the collector: defaults, optional file, flags, then
//! environment variables (`ADDRESS`, `POLL_INTERVAL`, `RATE_LIMIT`, ...).

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Command-line flags of `metrics-agent`
#[derive(Debug, Default, Clone, Parser, Serialize)]
#[command(name = "metrics-agent", version, about = "Metrics reporting agent")]
pub struct AgentArgs {
    /// Collector address, host:port
    #[arg(short = 'a', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Shared HMAC key
    #[arg(short = 'k', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Poll interval in seconds
    #[arg(short = 'p', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,

    /// Report interval in seconds
    #[arg(short = 'r', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_interval: Option<u64>,

    /// Maximum number of concurrent reports
    #[arg(short = 'l', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<usize>,

    /// Path of the collector's RSA public key
    #[arg(short = 'c', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<String>,

    /// Log filter, e.g. `info` or `agent=debug`
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Configuration file (JSON or TOML)
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub address: String,
    pub key: String,
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    #[serde(with = "duration_serde")]
    pub report_interval: Duration,
    pub rate_limit: usize,
    pub crypto_key: String,
    /// Per-attempt HTTP timeout
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Bound for in-flight reports to finish after a shutdown signal
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
    /// Sample OS-level gauges besides the process ones
    pub collect_system: bool,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            key: String::new(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            rate_limit: 1,
            crypto_key: String::new(),
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
            collect_system: true,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from every layer, reading the process environment
    pub fn load(args: &AgentArgs) -> Result<Self, ConfigError> {
        let file = args
            .config
            .clone()
            .or_else(|| std::env::var_os("CONFIG").map(PathBuf::from));
        Self::from_sources(args, file.as_deref(), Environment::default())
    }

    /// Load configuration with an explicit environment source
    pub fn from_sources(
        args: &AgentArgs,
        file: Option<&Path>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = file {
            info!("Loading configuration from: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: AgentConfig = builder
            .add_source(Config::try_from(args)?)
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| {
            Err(ConfigError::Message(format!(
                "Configuration validation error: {}",
                msg
            )))
        };
        if self.address.trim().is_empty() {
            return invalid("address must not be empty");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll_interval must be positive");
        }
        if self.report_interval.is_zero() {
            return invalid("report_interval must be positive");
        }
        if self.rate_limit == 0 {
            return invalid("rate_limit must be at least 1");
        }
        Ok(())
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::from_sources(&AgentArgs::default(), None, env(&[])).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_layering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(
            &path,
            r#"{"address":"collector:9000","poll_interval":5,"rate_limit":4}"#,
        )
        .unwrap();

        let args = AgentArgs::parse_from(["metrics-agent", "-p", "3", "-k", "secret"]);
        let config =
            AgentConfig::from_sources(&args, Some(&path), env(&[("RATE_LIMIT", "8")])).unwrap();

        assert_eq!(config.address, "collector:9000");
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.report_interval, Duration::from_secs(10));
        assert_eq!(config.rate_limit, 8);
        assert_eq!(config.key, "secret");
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        for vars in [
            [("POLL_INTERVAL", "0")],
            [("REPORT_INTERVAL", "0")],
            [("RATE_LIMIT", "0")],
        ] {
            assert!(AgentConfig::from_sources(&AgentArgs::default(), None, env(&vars)).is_err());
        }
    }
}
