//! # Startup configuration
//!
//! Read once at process start from a TOML file (`middleware.toml` by default).
//! Every key is optional; anything missing or unusable falls back to its
//! default and a missing file is not an error.
//!
//! ```toml
//! effector_ip = "192.168.1.20"
//! effector_port = 10003
//! watcher_port = "10004"      # numeric strings are accepted
//! listen_port = 10002
//! retry_interval_ms = 1000
//! inactivity_timeout_ms = 2000
//! poll_interval_ms = 10
//! ```
//!
//! The legacy camelCase keys `effectorIp`, `effectorPort` and `watcherPort`
//! are recognised as well.

// src/config.rs - Startup configuration
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use toml::{Table, Value};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartupConfig {
    pub effector_ip: String,
    pub effector_port: u16,
    pub watcher_port: u16,
    /// Port the client connects to.
    pub listen_port: u16,
    pub retry_interval_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

fn default_effector_ip() -> String { "127.0.0.1".to_string() }
fn default_effector_port() -> u16 { 10003 }
fn default_watcher_port() -> u16 { 10004 }
fn default_listen_port() -> u16 { 10002 }
fn default_retry_interval_ms() -> u64 { 1000 }
fn default_inactivity_timeout_ms() -> u64 { 2000 }
fn default_poll_interval_ms() -> u64 { 10 }

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            effector_ip: default_effector_ip(),
            effector_port: default_effector_port(),
            watcher_port: default_watcher_port(),
            listen_port: default_listen_port(),
            retry_interval_ms: default_retry_interval_ms(),
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl StartupConfig {
    /// Build from a parsed table, field by field.
    pub fn from_table(table: &Table) -> Self {
        Self {
            effector_ip: field(table, &["effector_ip", "effectorIp"], parse_host, default_effector_ip),
            effector_port: field(table, &["effector_port", "effectorPort"], parse_port, default_effector_port),
            watcher_port: field(table, &["watcher_port", "watcherPort"], parse_port, default_watcher_port),
            listen_port: field(table, &["listen_port", "listenPort"], parse_port, default_listen_port),
            retry_interval_ms: field(table, &["retry_interval_ms"], parse_millis, default_retry_interval_ms),
            inactivity_timeout_ms: field(table, &["inactivity_timeout_ms"], parse_millis, default_inactivity_timeout_ms),
            poll_interval_ms: field(table, &["poll_interval_ms"], parse_millis, default_poll_interval_ms),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let table: Table = contents.parse()?;
        Ok(Self::from_table(&table))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.listen_port))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn field<T>(
    table: &Table,
    keys: &[&str],
    parse: fn(&Value) -> Option<T>,
    default: fn() -> T,
) -> T {
    let Some((key, raw)) = keys.iter().find_map(|k| table.get(*k).map(|v| (*k, v))) else {
        return default();
    };
    parse(raw).unwrap_or_else(|| {
        tracing::warn!("Config key '{}' has unusable value {}, using default", key, raw);
        default()
    })
}

fn parse_port(value: &Value) -> Option<u16> {
    match value {
        Value::Integer(i) => u16::try_from(*i).ok().filter(|p| *p != 0),
        Value::String(s) => s.trim().parse::<u16>().ok().filter(|p| *p != 0),
        _ => None,
    }
}

fn parse_millis(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(i) => u64::try_from(*i).ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_host(value: &Value) -> Option<String> {
    let host = value.as_str()?.trim();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some(host.to_string())
}

/// Load startup configuration, falling back to defaults on any problem.
pub fn load_config(path: impl AsRef<Path>) -> StartupConfig {
    let path = path.as_ref();
    let config = match std::fs::read_to_string(path) {
        Ok(contents) => StartupConfig::parse(&contents).unwrap_or_else(|e| {
            tracing::error!("Failed to parse '{}': {}, using defaults", path.display(), e);
            StartupConfig::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("{} not found, using defaults", path.display());
            StartupConfig::default()
        }
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}, using defaults", path.display(), ConfigError::from(e));
            StartupConfig::default()
        }
    };
    tracing::info!(
        "Primary effector {}:{}, watcher port {}",
        config.effector_ip, config.effector_port, config.watcher_port
    );
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StartupConfig::default();
        assert_eq!(config.effector_port, 10003);
        assert_eq!(config.watcher_port, 10004);
        assert_eq!(config.listen_port, 10002);
        assert_eq!(config.inactivity_timeout(), Duration::from_millis(2000));
        assert_eq!(config.listen_addr().port(), 10002);
    }

    #[test]
    fn test_partial_and_unparsable_fields_fall_back() {
        let config = StartupConfig::parse(
            r#"
            effector_ip = "10.0.0.5"
            effector_port = "nope"
            watcherPort = "12004"
            listen_port = 70000
            "#,
        )
        .unwrap();
        assert_eq!(config.effector_ip, "10.0.0.5");
        assert_eq!(config.effector_port, 10003);
        assert_eq!(config.watcher_port, 12004);
        assert_eq!(config.listen_port, 10002);
        assert_eq!(config.retry_interval_ms, 1000);
    }

    #[test]
    fn test_legacy_keys() {
        let config = StartupConfig::parse("effectorIp = \"chair.local\"\neffectorPort = \"11003\"").unwrap();
        assert_eq!(config.effector_ip, "chair.local");
        assert_eq!(config.effector_port, 11003);
    }

    #[test]
    fn test_invalid_toml_is_error_but_load_falls_back() {
        assert!(matches!(StartupConfig::parse("effector_port = = 1"), Err(ConfigError::Toml(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "effector_port = = 1").unwrap();
        assert_eq!(load_config(file.path()), StartupConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(dir.path().join("middleware.toml")), StartupConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "effector_port = 12003\nretry_interval_ms = 250").unwrap();
        let config = load_config(file.path());
        assert_eq!(config.effector_port, 12003);
        assert_eq!(config.retry_interval(), Duration::from_millis(250));
    }
}
