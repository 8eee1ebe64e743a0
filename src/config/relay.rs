//! Relay configuration
//!
//! Loads listener settings from an optional TOML file:
//!
//! ```toml
//! [relay]
//! bind = "127.0.0.1"
//! port = 8080
//! queue_capacity = 64
//!
//! [echo]
//! port = 9090
//!
//! [bridge]
//! port = 8081
//! echo_addr = "127.0.0.1:9090"
//! timeout_ms = 5000
//! cors_origin = "http://localhost:3000"
//! ```
//!
//! Bind addresses may be IP literals (v4 or v6) or hostnames.
//!
//! The echo relay and the HTTP bridge only run when their section is present.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::DEFAULT_QUEUE_CAPACITY;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_RELAY_PORT: u16 = 8080;
pub const DEFAULT_ECHO_PORT: u16 = 9090;
pub const DEFAULT_BRIDGE_PORT: u16 = 8081;
pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Errors that can occur during config operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_relay_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_echo_port() -> u16 {
    DEFAULT_ECHO_PORT
}

fn default_bridge_port() -> u16 {
    DEFAULT_BRIDGE_PORT
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_echo_addr() -> String {
    format!("{}:{}", DEFAULT_BIND, DEFAULT_ECHO_PORT)
}

fn default_timeout_ms() -> u64 {
    DEFAULT_BRIDGE_TIMEOUT_MS
}

fn default_cors_origin() -> String {
    DEFAULT_CORS_ORIGIN.to_string()
}

/// Check that `host` is an IP literal or a plausible hostname
///
/// Hostnames are resolved when the listener binds or the bridge connects.
fn validate_host(host: &str) -> ConfigResult<()> {
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    let valid = !host.is_empty()
        && host.len() <= 253
        && host
            .split('.')
            .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    if !valid {
        return Err(ConfigError::Invalid(format!("bad host '{}'", host)));
    }
    Ok(())
}

/// Format `host:port`, bracketing IPv6 literals
pub fn host_port(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{}]:{}", host, port),
        _ => format!("{}:{}", host, port),
    }
}

/// WebSocket relay listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Frames buffered per connection before delivery to it fails
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_RELAY_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Address handed to `TcpListener::bind`, which resolves hostnames
    pub fn listen_addr(&self) -> (&str, u16) {
        (self.bind.as_str(), self.port)
    }
}

/// TCP echo relay listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_echo_port")]
    pub port: u16,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_ECHO_PORT,
        }
    }
}

impl EchoConfig {
    pub fn listen_addr(&self) -> (&str, u16) {
        (self.bind.as_str(), self.port)
    }

    /// Address a client on this host would dial
    pub fn connect_addr(&self) -> String {
        host_port(self.bind.as_str(), self.port)
    }
}

/// HTTP bridge listener and its echo relay upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_bridge_port")]
    pub port: u16,
    /// Echo relay the bridge forwards to
    #[serde(default = "default_echo_addr")]
    pub echo_addr: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Browser origin allowed to call the bridge
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_BRIDGE_PORT,
            echo_addr: default_echo_addr(),
            timeout_ms: DEFAULT_BRIDGE_TIMEOUT_MS,
            cors_origin: default_cors_origin(),
        }
    }
}

impl BridgeConfig {
    pub fn listen_addr(&self) -> (&str, u16) {
        (self.bind.as_str(), self.port)
    }

    /// Check that `echo_addr` is `host:port`
    pub fn validate_echo_addr(&self) -> ConfigResult<()> {
        let invalid = || ConfigError::Invalid(format!("bad echo address {}", self.echo_addr));
        let (host, port) = self.echo_addr.rsplit_once(':').ok_or_else(invalid)?;
        port.parse::<u16>().map_err(|_| invalid())?;
        let host = host
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(host);
        validate_host(host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub relay: ServerConfig,
    pub echo: Option<EchoConfig>,
    pub bridge: Option<BridgeConfig>,
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every address parses and the timeouts are usable
    pub fn validate(&self) -> ConfigResult<()> {
        validate_host(&self.relay.bind)?;
        if let Some(echo) = &self.echo {
            validate_host(&echo.bind)?;
        }
        if let Some(bridge) = &self.bridge {
            validate_host(&bridge.bind)?;
            bridge.validate_echo_addr()?;
            if bridge.timeout_ms == 0 {
                return Err(ConfigError::Invalid(
                    "bridge timeout_ms must be positive".to_string(),
                ));
            }
            if !bridge.cors_origin.starts_with("http://")
                && !bridge.cors_origin.starts_with("https://")
            {
                return Err(ConfigError::Invalid(format!(
                    "bad cors_origin {}",
                    bridge.cors_origin
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.relay.listen_addr(), ("127.0.0.1", 8080));
        assert_eq!(config.relay.queue_capacity, 64);
        assert!(config.echo.is_none());
        assert!(config.bridge.is_none());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(RelayConfig::from_toml_str("").unwrap(), RelayConfig::default());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = RelayConfig::from_toml_str(
            r#"
            [relay]
            port = 9000

            [echo]

            [bridge]
            port = 8181
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.port, 9000);
        assert_eq!(config.relay.bind, "127.0.0.1");
        assert_eq!(config.echo, Some(EchoConfig::default()));

        let bridge = config.bridge.unwrap();
        assert_eq!(bridge.port, 8181);
        assert_eq!(bridge.echo_addr, "127.0.0.1:9090");
        assert_eq!(bridge.timeout(), Duration::from_secs(5));
        assert_eq!(bridge.cors_origin, "http://localhost:3000");
    }

    #[test]
    fn test_ipv6_and_hostname_binds_are_accepted() {
        for bind in ["::1", "localhost", "0.0.0.0", "relay.internal"] {
            let config =
                RelayConfig::from_toml_str(&format!("[relay]\nbind = \"{}\"\n", bind)).unwrap();
            assert_eq!(config.relay.listen_addr(), (bind, 8080));
        }
    }

    #[test]
    fn test_echo_addr_accepts_hostnames_and_ipv6() {
        for echo_addr in ["localhost:9090", "[::1]:9090", "10.0.0.5:9090"] {
            let toml = format!("[bridge]\necho_addr = \"{}\"\n", echo_addr);
            assert!(RelayConfig::from_toml_str(&toml).is_ok(), "{}", echo_addr);
        }
        let result = RelayConfig::from_toml_str("[bridge]\necho_addr = \"localhost\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_host_port_brackets_ipv6() {
        assert_eq!(host_port("::1", 9090), "[::1]:9090");
        assert_eq!(host_port("localhost", 9090), "localhost:9090");
    }

    #[tokio::test]
    async fn test_localhost_bind_resolves() {
        let config = ServerConfig {
            bind: "localhost".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        assert!(tokio::net::TcpListener::bind(config.listen_addr()).await.is_ok());
    }

    #[test]
    fn test_bad_cors_origin_is_rejected() {
        let result = RelayConfig::from_toml_str("[bridge]\ncors_origin = \"*\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_bind_is_rejected() {
        let result = RelayConfig::from_toml_str("[relay]\nbind = \"not an ip\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_bridge_timeout_is_rejected() {
        let result = RelayConfig::from_toml_str("[bridge]\ntimeout_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = RelayConfig::from_toml_str("[relay\nport = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nport = 7000\nqueue_capacity = 16").unwrap();

        let config = RelayConfig::load(file.path()).unwrap();

        assert_eq!(config.relay.port, 7000);
        assert_eq!(config.relay.queue_capacity, 16);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RelayConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }
}
