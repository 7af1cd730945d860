//! Configuration for the deployer

use crate::error::{DeployError, Result};
use bosun_types::{RetentionPolicy, Severity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main deployer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// How many server groups survive a deploy
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Pipeline monitoring
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Worst severity a batch may reach and still succeed
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: Severity,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub connect: ConnectConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            monitor: MonitorConfig::default(),
            failure_threshold: default_failure_threshold(),
            cache: CacheConfig::default(),
            connect: ConnectConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Pipeline monitoring configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between status polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up waiting on an execution after this many seconds
    #[serde(default = "default_monitor_timeout")]
    pub timeout_secs: u64,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            timeout_secs: default_monitor_timeout(),
        }
    }
}

/// Infrastructure cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keys matching this pattern are removed by a flush
    #[serde(default = "default_key_pattern")]
    pub key_pattern: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_pattern: default_key_pattern(),
        }
    }
}

/// Connection script configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectConfig {
    #[serde(default = "default_script_description")]
    pub script_description: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            script_description: default_script_description(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_failure_threshold() -> Severity {
    Severity::Warning
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_monitor_timeout() -> u64 {
    3600
}

fn default_key_pattern() -> String {
    "infrastructure-cache:*".to_string()
}

fn default_script_description() -> String {
    "The generated script will open connections to the API & UI servers using ssh tunnels"
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DeployerConfig {
    /// Load configuration: defaults, then the optional file, then `BOSUN__*`
    /// environment variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DeployerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BOSUN")
                .separator("__")
                .try_parsing(true),
        );

        let config: DeployerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.retention.is_valid() {
            return Err(DeployError::InvalidConfig(
                "retention.max_remaining_versions must be at least 1".to_string(),
            ));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(DeployError::InvalidConfig(
                "monitor.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.monitor.timeout_secs == 0 {
            return Err(DeployError::InvalidConfig(
                "monitor.timeout_secs must be positive".to_string(),
            ));
        }
        if self.cache.key_pattern.is_empty() {
            return Err(DeployError::InvalidConfig(
                "cache.key_pattern must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_config() {
        let config = DeployerConfig::default();
        assert_eq!(config.retention.max_remaining_versions, 2);
        assert_eq!(config.failure_threshold, Severity::Warning);
        assert_eq!(config.monitor.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.cache.key_pattern, "infrastructure-cache:*");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retention_is_rejected() {
        let config = DeployerConfig {
            retention: RetentionPolicy::new(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DeployError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_without_file() {
        let config = DeployerConfig::load(None).unwrap();
        assert_eq!(config.monitor.timeout_secs, 3600);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("bosun-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "failure_threshold = \"error\"\n\n[retention]\nmax_remaining_versions = 4\n\n[monitor]\npoll_interval_ms = 250"
        )
        .unwrap();

        let config = DeployerConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.retention.max_remaining_versions, 4);
        assert_eq!(config.failure_threshold, Severity::Error);
        assert_eq!(config.monitor.poll_interval_ms, 250);
        assert_eq!(config.monitor.timeout_secs, 3600);
    }
}
