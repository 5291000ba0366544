//! Commanding configuration.
//!
//! The configuration is validated exactly once, when the [`Manager`] is built.
//! An invalid configuration is fatal: the manager refuses to build and no
//! listener is ever spawned.
//!
//! ## Environment Variables
//!
//! - `COMMANDING_ACTIVE`: `true`/`false` (default: true)
//! - `COMMANDING_TOPIC`: Commands topic (default: streamhouse_consumers_commands)
//! - `COMMANDING_PAUSE_TIMEOUT_MS`: Backoff after a listener poll error (default: 5000)
//! - `COMMANDING_MAX_WAIT_TIME_MS`: Max blocking time of one poll (default: 2000)
//! - `COMMANDING_BROKER_<KEY>`: Broker property; `__` becomes `.`
//!   (e.g. `COMMANDING_BROKER_BOOTSTRAP__SERVERS=localhost:9092`)
//!
//! [`Manager`]: crate::manager::Manager

use crate::error::{CommandingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default commands topic. Must have exactly one partition.
pub const DEFAULT_TOPIC: &str = "streamhouse_consumers_commands";

const BROKER_ENV_PREFIX: &str = "COMMANDING_BROKER_";

fn default_active() -> bool {
    true
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_pause_timeout_ms() -> u64 {
    5_000
}

fn default_max_wait_time_ms() -> u64 {
    2_000
}

/// Configuration for the commanding subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandingConfig {
    /// Whether this process listens for commands at all.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Single-partition topic carrying commands, acceptances and results.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Backoff applied by the listener after a failed poll.
    #[serde(default = "default_pause_timeout_ms")]
    pub pause_timeout_ms: u64,

    /// Maximum time one listener poll may block.
    #[serde(default = "default_max_wait_time_ms")]
    pub max_wait_time_ms: u64,

    /// Properties for the broker connection used by the listener.
    #[serde(default)]
    pub broker_config: BTreeMap<BrokerKey, serde_json::Value>,
}

impl Default for CommandingConfig {
    fn default() -> Self {
        Self {
            active: default_active(),
            topic: default_topic(),
            pause_timeout_ms: default_pause_timeout_ms(),
            max_wait_time_ms: default_max_wait_time_ms(),
            broker_config: BTreeMap::new(),
        }
    }
}

impl CommandingConfig {
    /// Check every constraint the commanding subsystem relies on.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(CommandingError::Configuration(
                "topic must not be empty".to_string(),
            ));
        }

        if self.pause_timeout_ms == 0 {
            return Err(CommandingError::Configuration(
                "pause_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_wait_time_ms == 0 {
            return Err(CommandingError::Configuration(
                "max_wait_time_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn pause_timeout(&self) -> Duration {
        Duration::from_millis(self.pause_timeout_ms)
    }

    pub fn max_wait_time(&self) -> Duration {
        Duration::from_millis(self.max_wait_time_ms)
    }

    /// Load configuration from `COMMANDING_*` environment variables.
    ///
    /// Unset variables fall back to defaults. Values that fail to parse are
    /// configuration errors rather than silently defaulted.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut config = Self::default();

        for (name, value) in vars {
            match name.as_str() {
                "COMMANDING_ACTIVE" => {
                    config.active = value.trim().parse().map_err(|_| {
                        CommandingError::Configuration(format!(
                            "COMMANDING_ACTIVE must be true or false, got '{}'",
                            value
                        ))
                    })?;
                }
                "COMMANDING_TOPIC" => config.topic = value,
                "COMMANDING_PAUSE_TIMEOUT_MS" => {
                    config.pause_timeout_ms = parse_millis(&name, &value)?;
                }
                "COMMANDING_MAX_WAIT_TIME_MS" => {
                    config.max_wait_time_ms = parse_millis(&name, &value)?;
                }
                _ => {
                    if let Some(suffix) = name.strip_prefix(BROKER_ENV_PREFIX) {
                        let key = BrokerKey::new(suffix.to_lowercase().replace("__", "."))?;
                        config
                            .broker_config
                            .insert(key, serde_json::Value::String(value));
                    }
                }
            }
        }

        Ok(config)
    }
}

fn parse_millis(name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        CommandingError::Configuration(format!(
            "{} must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}

/// A well-formed broker property name such as `bootstrap.servers`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BrokerKey(String);

impl BrokerKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();

        let well_formed = !key.is_empty()
            && key.chars().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
            });

        if !well_formed {
            return Err(CommandingError::Configuration(format!(
                "invalid broker config key '{}'",
                key
            )));
        }

        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BrokerKey {
    type Error = CommandingError;

    fn try_from(value: String) -> Result<Self> {
        BrokerKey::new(value)
    }
}

impl From<BrokerKey> for String {
    fn from(key: BrokerKey) -> Self {
        key.0
    }
}

impl fmt::Display for BrokerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = CommandingConfig::default();
        assert!(config.active);
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.pause_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_wait_time(), Duration::from_secs(2));
        assert!(config.broker_config.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let config = CommandingConfig {
            pause_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CommandingError::Configuration(_))
        ));

        let config = CommandingConfig {
            max_wait_time_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CommandingError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_topic_is_rejected() {
        let config = CommandingConfig {
            topic: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_broker_key_validation() {
        assert!(BrokerKey::new("bootstrap.servers").is_ok());
        assert!(BrokerKey::new("security-protocol_v2").is_ok());
        assert!(BrokerKey::new("").is_err());
        assert!(BrokerKey::new("Bootstrap.Servers").is_err());
        assert!(BrokerKey::new("bootstrap servers").is_err());
    }

    #[test]
    fn test_deserialize_rejects_malformed_broker_key() {
        let json = r#"{"broker_config": {"BAD KEY": "x"}}"#;
        assert!(serde_json::from_str::<CommandingConfig>(json).is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "pause_timeout_ms": 1000,
            "broker_config": {"bootstrap.servers": "localhost:9092"}
        }"#;
        let config: CommandingConfig = serde_json::from_str(json).unwrap();

        assert!(config.active);
        assert_eq!(config.pause_timeout_ms, 1000);
        assert_eq!(config.max_wait_time_ms, 2000);
        let key = BrokerKey::new("bootstrap.servers").unwrap();
        assert_eq!(config.broker_config[&key], "localhost:9092");
    }

    #[test]
    fn test_from_vars() {
        let config = CommandingConfig::from_vars(vars(&[
            ("COMMANDING_ACTIVE", "false"),
            ("COMMANDING_TOPIC", "ops_commands"),
            ("COMMANDING_PAUSE_TIMEOUT_MS", "250"),
            ("COMMANDING_MAX_WAIT_TIME_MS", "100"),
            ("COMMANDING_BROKER_BOOTSTRAP__SERVERS", "kafka:9092"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert!(!config.active);
        assert_eq!(config.topic, "ops_commands");
        assert_eq!(config.pause_timeout_ms, 250);
        assert_eq!(config.max_wait_time_ms, 100);
        assert_eq!(config.broker_config.len(), 1);
        let (key, value) = config.broker_config.iter().next().unwrap();
        assert_eq!(key.as_str(), "bootstrap.servers");
        assert_eq!(value, "kafka:9092");
    }

    #[test]
    fn test_from_vars_rejects_unparseable_values() {
        let result = CommandingConfig::from_vars(vars(&[("COMMANDING_ACTIVE", "sometimes")]));
        assert!(matches!(result, Err(CommandingError::Configuration(_))));

        let result =
            CommandingConfig::from_vars(vars(&[("COMMANDING_MAX_WAIT_TIME_MS", "soon")]));
        assert!(matches!(result, Err(CommandingError::Configuration(_))));
    }
}
