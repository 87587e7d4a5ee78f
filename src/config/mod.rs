//! Configuration types and loading for the proxy.

use crate::error::ProxyError;
use serde::Deserialize;
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::lookup_host;

/// Port used for upstream resolvers given without one
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Main configuration struct for the proxy
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Upstream resolver: IP, `ip:port`, or host name. Required before serving.
    #[serde(default)]
    pub upstream: Option<String>,
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_hosts_file")]
    pub hosts_file: String,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_seconds: u64,
    #[serde(default)]
    pub cache: DnsCacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            upstream: None,
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            hosts_file: default_hosts_file(),
            upstream_timeout_seconds: default_upstream_timeout(),
            cache: DnsCacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ============== DNS Cache Config ==============

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct DnsCacheConfig {
    /// Expire entries after the smallest record TTL (off: keep forever)
    #[serde(default)]
    pub respect_ttl: bool,
}

// ============== Logging Config ==============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_requests")]
    pub log_requests: bool,
    #[serde(default)]
    pub format: LogFormat,
    /// File logging configuration
    #[serde(default)]
    pub file: Option<FileLoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileLoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_file_prefix() -> String {
    "dnsproxy.log".to_string()
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        FileLoggingConfig {
            log_dir: default_log_dir(),
            file_prefix: default_log_file_prefix(),
            rotation: LogRotation::Daily,
        }
    }
}

fn default_log_requests() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_requests: default_log_requests(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

// ============== Default Values ==============

pub fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_listen_port() -> u16 {
    53
}

pub fn default_hosts_file() -> String {
    "/etc/hosts".to_string()
}

pub fn default_upstream_timeout() -> u64 {
    45
}

// ============== Config Loading ==============

/// Load configuration from file.
///
/// With no path the built-in defaults are returned. A named file that is
/// missing or malformed is an error.
pub fn load_config(path: Option<&str>) -> Result<Config, ProxyError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let content = fs::read_to_string(path)
        .map_err(|e| ProxyError::Config(format!("cannot read {}: {}", path, e)))?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| ProxyError::Config(format!("invalid config {}: {}", path, e)))
}

/// Resolve the upstream resolver address.
///
/// Accepts `ip`, `ip:port`, `[v6]:port`, `host` or `host:port`; the port
/// defaults to 53.
pub async fn resolve_upstream(upstream: &str) -> Result<SocketAddr, ProxyError> {
    if let Ok(addr) = upstream.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = upstream.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_DNS_PORT));
    }

    let has_port = upstream
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    let resolved: io::Result<Vec<SocketAddr>> = if has_port {
        lookup_host(upstream).await.map(|addrs| addrs.collect())
    } else {
        lookup_host((upstream, DEFAULT_DNS_PORT))
            .await
            .map(|addrs| addrs.collect())
    };

    first_address(upstream, resolved)
}

/// Resolve the listen host and port into a bindable address
pub async fn resolve_listen_addr(host: &str, port: u16) -> Result<SocketAddr, ProxyError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let resolved = lookup_host((host, port)).await.map(|addrs| addrs.collect());
    first_address(host, resolved)
}

fn first_address(
    name: &str,
    resolved: io::Result<Vec<SocketAddr>>,
) -> Result<SocketAddr, ProxyError> {
    resolved
        .map_err(|e| ProxyError::Config(format!("cannot resolve {}: {}", name, e)))?
        .into_iter()
        .next()
        .ok_or_else(|| ProxyError::Config(format!("no address found for {}", name)))
}

// ============== Unit Tests ==============
