//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`--config`, or the first of the default paths)
//! - Environment variables (`CHATTER_*`, nested keys separated by `__`)

use anyhow::{bail, Context, Result};
use chatter_core::{MemoryStore, MessageStore, SqliteStore, DEFAULT_OUTBOUND_CAPACITY};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const CONFIG_PATHS: [&str; 3] = [
    "chatter.toml",
    "/etc/chatter/chatter.toml",
    "~/.config/chatter/chatter.toml",
];

/// Secret used when none is configured and `auth.allow_dev_secret` is set.
/// Anyone who has read this file can forge credentials with it.
pub const DEV_JWT_SECRET: &str = "chatter-dev-secret";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Handshake authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Message store.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Frames queued per transport before it is considered dead.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with whatever issues credentials. Falls back to
    /// `CHATTER_JWT_SECRET`; the hub refuses to start if both are empty.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Start with [`DEV_JWT_SECRET`] when no secret is configured.
    #[serde(default)]
    pub allow_dev_secret: bool,

    /// Cookie carrying the credential.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Refuse upgrades without a valid credential instead of admitting them
    /// as anonymous transports.
    #[serde(default)]
    pub reject_anonymous: bool,
}

/// Store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Database file for the SQLite backend. `~` is expanded.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("CHATTER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("CHATTER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_outbound_queue_capacity() -> usize {
    DEFAULT_OUTBOUND_CAPACITY
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_jwt_secret() -> String {
    std::env::var("CHATTER_JWT_SECRET").unwrap_or_default()
}

fn default_cookie_name() -> String {
    "token".to_string()
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_storage_path() -> String {
    "chatter.db".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            allow_dev_secret: false,
            cookie_name: default_cookie_name(),
            reject_anonymous: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the default paths, then apply `CHATTER_*`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// override has the wrong type.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists());

        if let Some(path) = &file {
            info!("Loading configuration from {}", path);
        }

        Self::from_sources(file.as_deref().map(Path::new), environment())
    }

    fn from_sources(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }

        let config: Config = builder
            .add_source(env)
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Check the configuration before the hub starts.
    ///
    /// An empty JWT secret is replaced by [`DEV_JWT_SECRET`] only when
    /// `auth.allow_dev_secret` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if no JWT secret is configured.
    pub fn validate(&mut self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            if !self.auth.allow_dev_secret {
                bail!(
                    "No JWT secret configured; set CHATTER_JWT_SECRET or auth.jwt_secret \
                     (or auth.allow_dev_secret for local development)"
                );
            }
            warn!("Using the development JWT secret; credentials can be forged");
            self.auth.jwt_secret = DEV_JWT_SECRET.to_string();
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Open the configured message store.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite database cannot be opened. The hub
    /// must not start without its store.
    pub fn open(&self) -> Result<Arc<dyn MessageStore>> {
        match self.backend {
            StorageBackend::Sqlite => {
                let path = shellexpand::tilde(&self.path);
                let store = SqliteStore::open(path.as_ref())
                    .with_context(|| format!("Failed to open message store at {}", path))?;
                info!("Message store: sqlite ({})", path);
                Ok(Arc::new(store))
            }
            StorageBackend::Memory => {
                warn!("Message store: memory; messages are lost on restart");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("CHATTER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.transport.outbound_queue_capacity, 256);
        assert_eq!(config.auth.cookie_name, "token");
        assert!(!config.auth.reject_anonymous);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".into();
        config.port = 8080;
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        config.host = "not an address".into();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [auth]
            jwt_secret = "s3cret"
            reject_anonymous = true

            [storage]
            backend = "memory"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert!(config.auth.reject_anonymous);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.transport.websocket_path, "/ws");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatter.toml");
        std::fs::write(&path, "port = 9000\n[transport]\nwebsocket_path = \"/chat\"\n").unwrap();

        let config = Config::from_sources(
            Some(&path),
            env(&[
                ("CHATTER_PORT", "9100"),
                ("CHATTER_AUTH__REJECT_ANONYMOUS", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.transport.websocket_path, "/chat");
        assert!(config.auth.reject_anonymous);
    }

    #[test]
    fn test_missing_secret_refuses_to_start() {
        let mut config = Config::default();
        config.auth.jwt_secret = String::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("No JWT secret configured"));
        assert!(config.auth.jwt_secret.is_empty());
    }

    #[test]
    fn test_dev_secret_requires_opt_in() {
        let mut config = Config::from_sources(
            None,
            env(&[
                ("CHATTER_AUTH__JWT_SECRET", ""),
                ("CHATTER_AUTH__ALLOW_DEV_SECRET", "true"),
            ]),
        )
        .unwrap();
        assert!(config.auth.allow_dev_secret);

        config.validate().unwrap();
        assert_eq!(config.auth.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn test_configured_secret_is_kept() {
        let mut config = Config::default();
        config.auth.jwt_secret = "s3cret".into();
        config.validate().unwrap();
        assert_eq!(config.auth.jwt_secret, "s3cret");
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = Config::from_file("/nonexistent/chatter.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/chatter.toml"));
    }

    #[test]
    fn test_open_memory_store() {
        let storage = StorageConfig {
            backend: StorageBackend::Memory,
            path: String::new(),
        };
        assert_eq!(storage.open().unwrap().name(), "memory");
    }

    #[test]
    fn test_open_sqlite_store_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let storage = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: blocker.join("chatter.db").to_string_lossy().into_owned(),
        };
        assert!(storage.open().is_err());
    }
}
