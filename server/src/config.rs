//! Collector configuration
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional
//! JSON/TOML file (`--config` or `CONFIG`), command-line flags, environment
//! variables (`ADDRESS`, `STORE_INTERVAL`, ...).

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Command-line flags of `metrics-server`
///
/// Only flags that were given are layered over the file and defaults.
#[derive(Debug, Default, Clone, Parser, Serialize)]
#[command(name = "metrics-server", version, about = "Metrics collector server")]
pub struct ServerArgs {
    /// Listen address, host:port
    #[arg(short = 'a', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Snapshot interval in seconds; 0 disables periodic saving
    #[arg(short = 'i', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_interval: Option<u64>,

    /// Snapshot file; empty disables saving
    #[arg(short = 'f', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_storage_path: Option<String>,

    /// Restore the snapshot on startup
    #[arg(short = 'r', long, num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<bool>,

    /// Database DSN; selects the relational backend
    #[arg(short = 'd', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_dsn: Option<String>,

    /// Shared HMAC key
    #[arg(short = 'k', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Path of the RSA private key
    #[arg(short = 'c', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<String>,

    /// Audit events file
    #[arg(short = 'p', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_file: Option<String>,

    /// Audit events endpoint
    #[arg(short = 'u', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_url: Option<String>,

    /// Log filter, e.g. `info` or `server=debug`
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Configuration file (JSON or TOML)
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    #[serde(with = "duration_serde")]
    pub store_interval: Duration,
    pub file_storage_path: String,
    pub restore: bool,
    pub database_dsn: String,
    pub key: String,
    pub crypto_key: String,
    pub audit_file: String,
    pub audit_url: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            store_interval: Duration::from_secs(300),
            file_storage_path: "storage.json".to_string(),
            restore: false,
            database_dsn: String::new(),
            key: String::new(),
            crypto_key: String::new(),
            audit_file: String::new(),
            audit_url: String::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from every layer, reading the process environment
    pub fn load(args: &ServerArgs) -> Result<Self, ConfigError> {
        let file = args
            .config
            .clone()
            .or_else(|| std::env::var_os("CONFIG").map(PathBuf::from));
        Self::from_sources(args, file.as_deref(), Environment::default())
    }

    /// Load configuration with an explicit environment source
    pub fn from_sources(
        args: &ServerArgs,
        file: Option<&Path>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = file {
            info!("Loading configuration from: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: ServerConfig = builder
            .add_source(Config::try_from(args)?)
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Message(
                "Configuration validation error: address must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot file, `None` when saving is disabled
    ///
    /// The relational backend persists on its own, so file snapshots are
    /// off whenever a DSN is configured.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        if self.file_storage_path.is_empty() || !self.database_dsn.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.file_storage_path))
        }
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
        let config = ServerConfig::from_sources(&ServerArgs::default(), None, env(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.store_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_flags_override_file_and_env_overrides_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(
            &path,
            r#"{"address":"0.0.0.0:9000","store_interval":60,"restore":true,"key":"from-file"}"#,
        )
        .unwrap();

        let args = ServerArgs::parse_from(["metrics-server", "-a", "127.0.0.1:7000", "-k", "from-flag"]);
        let config = ServerConfig::from_sources(
            &args,
            Some(&path),
            env(&[("KEY", "from-env"), ("STORE_INTERVAL", "0")]),
        )
        .unwrap();

        assert_eq!(config.address, "127.0.0.1:7000");
        assert_eq!(config.key, "from-env");
        assert_eq!(config.store_interval, Duration::ZERO);
        assert!(config.restore);
    }

    #[test]
    fn test_restore_flag_without_value() {
        let args = ServerArgs::parse_from(["metrics-server", "-r"]);
        assert_eq!(args.restore, Some(true));
        let config = ServerConfig::from_sources(&args, None, env(&[])).unwrap();
        assert!(config.restore);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = ServerConfig::from_sources(
            &ServerArgs::default(),
            Some(Path::new("/nonexistent/server.json")),
            env(&[]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_path() {
        let mut config = ServerConfig::default();
        assert_eq!(config.snapshot_path(), Some(PathBuf::from("storage.json")));
        config.file_storage_path.clear();
        assert_eq!(config.snapshot_path(), None);
    }

    #[test]
    fn test_database_disables_file_snapshot() {
        let config = ServerConfig {
            database_dsn: "metrics.db".to_string(),
            restore: true,
            ..ServerConfig::default()
        };
        assert_eq!(config.snapshot_path(), None);
    }
}
