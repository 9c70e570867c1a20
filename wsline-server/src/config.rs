//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via WSLINE_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wsline_core::{SocketConfig, DEFAULT_HIGH_WATER_MARK, DEFAULT_READ_BUFFER_SIZE};
use wsline_protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9001;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub websocket: WebSocketConfig,
    pub tls: TlsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("WSLINE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: &dyn Fn(&str) -> Option<String>) {
        self.network.apply_overrides(var);
        self.websocket.apply_overrides(var);
        self.tls.apply_overrides(var);
    }

    /// Checks settings that cannot be verified by parsing alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.websocket.validate()?;
        self.tls.validate()
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, var: &dyn Fn(&str) -> Option<String>) {
        if let Some(addr) = var("WSLINE_BIND") {
            match addr.parse() {
                Ok(parsed) => self.bind_addr = parsed,
                Err(_) => tracing::warn!("Ignoring invalid WSLINE_BIND: {}", addr),
            }
        }

        if let Some(n) = var("WSLINE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.max_connections = n;
        }
    }
}

/// Per-connection WebSocket limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Largest accepted message, in bytes.
    pub max_message_size: usize,
    /// Buffered outbound bytes above which sends wait for a flush.
    pub high_water_mark: usize,
    /// Size of a single socket read.
    pub read_buffer_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl WebSocketConfig {
    fn apply_overrides(&mut self, var: &dyn Fn(&str) -> Option<String>) {
        if let Some(n) = var("WSLINE_MAX_MESSAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.max_message_size = n;
        }
        if let Some(n) = var("WSLINE_HIGH_WATER_MARK").and_then(|v| v.parse().ok()) {
            self.high_water_mark = n;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "websocket.max_message_size must be positive".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "websocket.read_buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig::default()
            .with_max_message_size(self.max_message_size)
            .with_high_water_mark(self.high_water_mark)
            .with_read_buffer_size(self.read_buffer_size)
    }
}

/// TLS configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable TLS (`wss://`).
    pub enabled: bool,
    /// Path to PEM-encoded server certificate file.
    pub cert_path: Option<PathBuf>,
    /// Path to PEM-encoded private key file.
    pub key_path: Option<PathBuf>,
    /// Require client certificate authentication (mTLS).
    pub require_client_cert: bool,
    /// Path to PEM-encoded CA certificate(s) for verifying client certs.
    /// Required if require_client_cert is true.
    pub client_ca_path: Option<PathBuf>,
}

impl TlsConfig {
    fn apply_overrides(&mut self, var: &dyn Fn(&str) -> Option<String>) {
        if let Some(enabled) = var("WSLINE_TLS_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
        if let Some(path) = var("WSLINE_TLS_CERT") {
            self.cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("WSLINE_TLS_KEY") {
            self.key_path = Some(PathBuf::from(path));
        }
        if let Some(require) = var("WSLINE_TLS_REQUIRE_CLIENT_CERT") {
            self.require_client_cert = parse_flag(&require);
        }
        if let Some(path) = var("WSLINE_TLS_CLIENT_CA") {
            self.client_ca_path = Some(PathBuf::from(path));
        }
    }

    /// Validates TLS configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        if self.cert_path.is_none() {
            return Err(ConfigError::ValidationError(
                "TLS enabled but cert_path not set".to_string(),
            ));
        }
        if self.key_path.is_none() {
            return Err(ConfigError::ValidationError(
                "TLS enabled but key_path not set".to_string(),
            ));
        }
        if self.require_client_cert && self.client_ca_path.is_none() {
            return Err(ConfigError::ValidationError(
                "mTLS enabled but client_ca_path not set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Socket addresses are written as strings in YAML.
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(addr)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overridden(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::default();
        config.apply_overrides(&|name| vars.get(name).cloned());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.network.max_connections, 1000);
        assert_eq!(config.websocket.max_message_size, 64 * 1024 * 1024);
        assert_eq!(config.websocket.high_water_mark, 64 * 1024);
        assert!(!config.tls.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = overridden(&[
            ("WSLINE_BIND", "0.0.0.0:8080"),
            ("WSLINE_MAX_CONNECTIONS", "16"),
            ("WSLINE_MAX_MESSAGE_SIZE", "4096"),
            ("WSLINE_HIGH_WATER_MARK", "1024"),
            ("WSLINE_TLS_ENABLED", "true"),
            ("WSLINE_TLS_CERT", "/etc/wsline/cert.pem"),
            ("WSLINE_TLS_KEY", "/etc/wsline/key.pem"),
        ]);

        assert_eq!(
            config.network.bind_addr,
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.network.max_connections, 16);
        assert_eq!(config.websocket.max_message_size, 4096);
        assert_eq!(config.websocket.high_water_mark, 1024);
        assert!(config.tls.enabled);
        assert_eq!(
            config.tls.cert_path,
            Some(PathBuf::from("/etc/wsline/cert.pem"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let config = overridden(&[
            ("WSLINE_BIND", "not-an-address"),
            ("WSLINE_MAX_CONNECTIONS", "many"),
        ]);
        assert_eq!(config.network.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.network.max_connections, 1000);
    }

    #[test]
    fn test_tls_validation() {
        let config = overridden(&[("WSLINE_TLS_ENABLED", "1")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cert_path"));

        let config = overridden(&[
            ("WSLINE_TLS_ENABLED", "1"),
            ("WSLINE_TLS_CERT", "cert.pem"),
            ("WSLINE_TLS_KEY", "key.pem"),
            ("WSLINE_TLS_REQUIRE_CLIENT_CERT", "true"),
        ]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_ca_path"));
    }

    #[test]
    fn test_zero_message_size_rejected() {
        let config = overridden(&[("WSLINE_MAX_MESSAGE_SIZE", "0")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"network:\n  bind_addr: \"127.0.0.1:7000\"\nwebsocket:\n  max_message_size: 2048\n",
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.network.bind_addr.port(), 7000);
        assert_eq!(config.network.max_connections, 1000);
        assert_eq!(config.websocket.max_message_size, 2048);
        assert_eq!(config.websocket.high_water_mark, DEFAULT_HIGH_WATER_MARK);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wsline.yaml");

        let mut config = Config::default();
        config.network.max_connections = 42;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.network.max_connections, 42);
        assert_eq!(loaded.network.bind_addr, config.network.bind_addr);
    }

    #[test]
    fn test_missing_file_error() {
        let err = Config::from_file("/nonexistent/wsline.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_, _)));
        assert!(err.to_string().contains("/nonexistent/wsline.yaml"));
    }
}
