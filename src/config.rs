//! Receiver configuration.
//!
//! Values are layered: defaults, then an optional `webhook.{toml,yaml,json}`
//! file in the working directory, then `IAPTIC_WEBHOOK__*` environment
//! variables (`IAPTIC_WEBHOOK__SECRET`, `IAPTIC_WEBHOOK__SCHEMA_DIR`, ...).
//!
//! ```toml
//! secret = "shared-secret-from-the-iaptic-dashboard"
//! schema_dir = "schema"
//! schema_base_uri = "https://www.example.com/"
//! port = 8080
//! accounts_file = "accounts.json"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::auth::Secret;
use crate::processor::DEFAULT_SCHEMA;
use crate::schema::DEFAULT_BASE_URI;

/// Environment variable prefix, separated from keys by `__`.
pub const ENV_PREFIX: &str = "IAPTIC_WEBHOOK";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid accounts file {}: {message}", .path.display())]
    AccountsFile { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret Iaptic sends as `password`. Required, never empty.
    pub secret: Secret,

    /// Directory holding `*.schema.json` files.
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// URI prefix the schema directory is addressed under.
    #[serde(default = "default_schema_base_uri")]
    pub schema_base_uri: String,

    /// Registry key notifications are validated against.
    #[serde(default = "default_schema_name")]
    pub schema_name: String,

    /// Optional JSON file seeding the in-memory account store.
    #[serde(default)]
    pub accounts_file: Option<PathBuf>,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in KiB
    #[serde(default = "default_max_body_size_kb")]
    pub max_body_size_kb: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl WebhookConfig {
    /// Config with defaults for everything but the secret.
    pub fn with_secret(secret: Secret) -> Self {
        Self {
            secret,
            schema_dir: default_schema_dir(),
            schema_base_uri: default_schema_base_uri(),
            schema_name: default_schema_name(),
            accounts_file: None,
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_kb: default_max_body_size_kb(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
        }
    }

    /// Load configuration from the optional `webhook` file and the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = ::config::Config::builder()
            .add_source(::config::File::with_name("webhook").required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"));
        Self::from_config(builder.build()?)
    }

    pub fn from_config(source: ::config::Config) -> Result<Self, ConfigError> {
        let config: WebhookConfig = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "schema_name cannot be empty".to_string(),
            ));
        }
        if self.schema_base_uri.trim().is_empty() {
            return Err(ConfigError::Validation(
                "schema_base_uri cannot be empty".to_string(),
            ));
        }
        if self.max_body_size_kb == 0 {
            return Err(ConfigError::Validation(
                "max_body_size_kb must be greater than zero".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_kb * 1024
    }
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schema")
}

fn default_schema_base_uri() -> String {
    DEFAULT_BASE_URI.to_string()
}

fn default_schema_name() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_kb() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(toml: &str) -> ::config::Config {
        ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = WebhookConfig::from_config(source(r#"secret = "S""#)).unwrap();
        assert_eq!(cfg.secret.expose(), "S");
        assert_eq!(cfg.schema_dir, PathBuf::from("schema"));
        assert_eq!(cfg.schema_base_uri, "https://www.example.com/");
        assert_eq!(cfg.schema_name, "iaptic-webhook");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_body_size(), 256 * 1024);
        assert!(cfg.accounts_file.is_none());
        assert!(cfg.metrics_enabled);
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let err = WebhookConfig::from_config(source("port = 9000")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let err = WebhookConfig::from_config(source(r#"secret = """#)).unwrap_err();
        assert!(err.to_string().contains("secret cannot be empty"));
    }

    #[test]
    fn test_zero_body_limit_is_rejected() {
        let err = WebhookConfig::from_config(source(
            r#"
            secret = "S"
            max_body_size_kb = 0
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_socket_addr() {
        let mut cfg = WebhookConfig::with_secret(Secret::new("S").unwrap());
        cfg.port = 9100;
        assert_eq!(cfg.socket_addr().unwrap().port(), 9100);

        cfg.bind_addr = "not an address".into();
        assert!(matches!(cfg.socket_addr(), Err(ConfigError::Address(_))));
    }
}
