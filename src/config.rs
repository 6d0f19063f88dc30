//! Process configuration: backend connection, retention tiers, logging.
//!
//! ```toml
//! [backend]
//! kind = "remote"
//! addr = "127.0.0.1:6379"
//! connect_timeout = 1000   # ms
//! io_timeout = 5000        # ms
//!
//! [[retentions]]
//! interval = 10            # seconds
//! samples = 360
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use crate::backend::{Backend, MemoryBackend, RemoteBackend, RemoteConfig};
use crate::error::{BackendResult, ConfigError};
use crate::observability::LoggingConfig;
use crate::retention::RetentionTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TIERSTORE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierstoreConfig {
    pub backend: BackendConfig,
    /// Finest first
    pub retentions: Vec<RetentionConfig>,
    pub logging: LoggingConfig,
}

impl Default for TierstoreConfig {
    fn default() -> Self {
        TierstoreConfig {
            backend: BackendConfig::default(),
            retentions: vec![
                RetentionConfig::new(10, 360),
                RetentionConfig::new(60, 10_080),
                RetentionConfig::new(600, 52_594),
            ],
            logging: LoggingConfig::default(),
        }
    }
}

impl TierstoreConfig {
    /// In-memory backend and short tiers, for tests.
    pub fn test() -> Self {
        TierstoreConfig {
            backend: BackendConfig::Memory,
            retentions: vec![
                RetentionConfig::new(10, 6),
                RetentionConfig::new(60, 10),
                RetentionConfig::new(300, 12),
            ],
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load the file named by `TIERSTORE_CONFIG`, or the defaults when unset.
    /// Logging env overrides apply either way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.logging = config.logging.with_env_overrides();
        Ok(config)
    }

    /// Validated retention table.
    pub fn retention_table(&self) -> Result<RetentionTable, ConfigError> {
        RetentionTable::new(self.retentions.iter().map(|r| (r.interval, r.samples)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process-local keyspace; contents die with the process
    Memory,
    Remote(RemoteConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Remote(RemoteConfig::default())
    }
}

impl BackendConfig {
    /// Build the configured backend. Remote backends connect eagerly.
    pub fn connect(&self) -> BackendResult<Box<dyn Backend>> {
        Ok(match self {
            BackendConfig::Memory => Box::new(MemoryBackend::new()),
            BackendConfig::Remote(remote) => Box::new(RemoteBackend::connect(remote.clone())?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    #[serde(default)]
    pub samples: u64,
}

impl RetentionConfig {
    pub fn new(interval_secs: u64, samples: u64) -> Self {
        RetentionConfig {
            interval: Duration::from_secs(interval_secs),
            samples,
        }
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TierstoreConfig::default();
        let table = config.retention_table().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.finest().interval(), Duration::from_secs(10));
        assert!(matches!(config.backend, BackendConfig::Remote(_)));
    }

    #[test]
    fn test_parse_full_file() {
        let config = TierstoreConfig::from_toml_str(
            r#"
            [backend]
            kind = "remote"
            addr = "10.1.2.3:6380"
            io_timeout = 250

            [[retentions]]
            interval = 10
            samples = 6

            [[retentions]]
            interval = 60

            [logging]
            json = true
            "#,
        )
        .unwrap();

        match &config.backend {
            BackendConfig::Remote(remote) => {
                assert_eq!(remote.addr, "10.1.2.3:6380");
                assert_eq!(remote.io_timeout, Duration::from_millis(250));
                assert_eq!(remote.connect_timeout, Duration::from_secs(1));
            }
            other => panic!("expected remote backend, got {:?}", other),
        }
        assert_eq!(
            config.retentions,
            vec![RetentionConfig::new(10, 6), RetentionConfig::new(60, 0)]
        );
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_memory_backend_kind() {
        let config = TierstoreConfig::from_toml_str("[backend]\nkind = \"memory\"\n").unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
        assert_eq!(config.retentions.len(), 3);
    }

    #[test]
    fn test_invalid_retentions_rejected() {
        let config = TierstoreConfig::from_toml_str(
            "[[retentions]]\ninterval = 60\n[[retentions]]\ninterval = 10\n",
        )
        .unwrap();
        assert!(matches!(
            config.retention_table(),
            Err(ConfigError::NotIncreasing { index: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            TierstoreConfig::from_toml_str("retentions = 5"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nkind = \"memory\"").unwrap();

        let config = TierstoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            TierstoreConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = TierstoreConfig::test();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(TierstoreConfig::from_toml_str(&text).unwrap(), config);
    }
}
