//! Application configuration.
//!
//! Every participant shares the same bus address and topic. The defaults
//! match the fixed deployment (`kafka:9092`, `global.chat`); a YAML file or
//! `CHATBUS__*` environment variables can override them.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::identity::Role;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "chatbus.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CHATBUS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "CHATBUS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "CHATBUS_LOG";
/// Environment variable carrying an explicit participant identity.
pub const CLIENT_ID_ENV_VAR: &str = "CLIENT_ID";

pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "kafka:9092";
pub const DEFAULT_TOPIC: &str = "global.chat";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Shared chat topic.
    pub topic: String,
    /// Consumer group for ordinary participants.
    pub participant_group_id: String,
    /// Consumer group for the broker handler.
    pub auditor_group_id: String,
    /// Per-attempt timeout when listing topics.
    pub probe_timeout_ms: u64,
    /// Delay between readiness attempts for participants.
    pub retry_backoff_ms: u64,
    /// Delay between readiness attempts for the broker handler.
    pub auditor_retry_backoff_ms: u64,
    /// Bounded wait of each consumer poll.
    pub poll_interval_ms: u64,
    /// Directory receiving audit logs.
    pub audit_dir: PathBuf,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub ssl_ca_location: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: DEFAULT_BOOTSTRAP_SERVERS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            participant_group_id: "vm1-client-group".to_string(),
            auditor_group_id: "broker-consumer".to_string(),
            probe_timeout_ms: 1000,
            retry_backoff_ms: 1500,
            auditor_retry_backoff_ms: 2000,
            poll_interval_ms: 300,
            audit_dir: PathBuf::from("logs"),
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
        }
    }
}

impl ChatConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `chatbus.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Consumer group joined by `role`.
    pub fn group_id(&self, role: Role) -> &str {
        match role {
            Role::Participant => &self.participant_group_id,
            Role::Auditor => &self.auditor_group_id,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Readiness backoff used by `role`.
    pub fn retry_backoff(&self, role: Role) -> Duration {
        match role {
            Role::Participant => Duration::from_millis(self.retry_backoff_ms),
            Role::Auditor => Duration::from_millis(self.auditor_retry_backoff_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_config_default() {
        let config = ChatConfig::default();
        assert_eq!(config.bootstrap_servers, "kafka:9092");
        assert_eq!(config.topic, "global.chat");
        assert_eq!(config.probe_timeout(), Duration::from_millis(1000));
        assert_eq!(config.poll_interval(), Duration::from_millis(300));
        assert_eq!(config.audit_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_group_id_per_role() {
        let config = ChatConfig::default();
        assert_eq!(config.group_id(Role::Participant), "vm1-client-group");
        assert_eq!(config.group_id(Role::Auditor), "broker-consumer");
    }

    #[test]
    fn test_retry_backoff_per_role() {
        let config = ChatConfig::default();
        assert_eq!(
            config.retry_backoff(Role::Participant),
            Duration::from_millis(1500)
        );
        assert_eq!(
            config.retry_backoff(Role::Auditor),
            Duration::from_millis(2000)
        );
    }

    #[test]
    #[serial]
    fn test_load_from_explicit_file() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "bootstrap_servers: \"localhost:29092\"").unwrap();
        writeln!(file, "topic: \"test.chat\"").unwrap();
        writeln!(file, "poll_interval_ms: 50").unwrap();

        let config = ChatConfig::load(file.path().to_str()).unwrap();

        assert_eq!(config.bootstrap_servers, "localhost:29092");
        assert_eq!(config.topic, "test.chat");
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        // Untouched fields keep their defaults.
        assert_eq!(config.participant_group_id, "vm1-client-group");
    }

    #[test]
    #[serial]
    fn test_load_missing_explicit_file_fails() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let result = ChatConfig::load(Some("/nonexistent/chatbus-config.yaml"));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "topic: \"from.file\"").unwrap();
        writeln!(file, "retry_backoff_ms: 10").unwrap();

        std::env::set_var("CHATBUS__TOPIC", "from.env");
        let config = ChatConfig::load(file.path().to_str());
        std::env::remove_var("CHATBUS__TOPIC");

        let config = config.unwrap();
        assert_eq!(config.topic, "from.env");
        assert_eq!(config.retry_backoff(Role::Participant), Duration::from_millis(10));
    }
}
