//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub peers: PeersConfig,
    #[serde(default)]
    pub call: CallSettings,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Base URL other services use to call back into this server
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9100
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_public_url() -> String {
    "http://127.0.0.1:9100".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    20
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

/// Peer service endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PeersConfig {
    /// Channel and bridge adapter
    pub channel_url: String,

    /// Workflow engine (activeflows, variables)
    pub flow_url: String,

    /// Route selection service
    pub route_url: String,

    /// Balance and destination validation
    pub billing_url: String,

    /// Groupcall ring coordinator
    pub groupcall_url: String,

    /// Conference bridge service
    pub confbridge_url: String,

    /// Recording, external media and speech synthesis
    pub media_url: String,

    /// Webhook event publisher
    pub webhook_url: String,

    /// Delay/timer service
    pub delay_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_peer_timeout")]
    pub timeout_ms: u64,
}

fn default_peer_timeout() -> u64 {
    3000
}

/// Call lifecycle tuning
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CallSettings {
    /// Delay between health checks in milliseconds
    #[serde(default = "default_health_delay")]
    pub health_check_delay_ms: u64,

    /// Health check retries before the call is forced down
    #[serde(default = "default_health_max_retry")]
    pub health_check_max_retry: u32,

    /// Timeout used when an action gives a non-positive duration
    #[serde(default = "default_action_timeout")]
    pub default_action_timeout_ms: i64,

    /// Maximum call duration before the channel is hung up
    #[serde(default = "default_call_duration")]
    pub call_duration_timeout_ms: u64,

    /// Dial timeout for outbound channels in seconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,

    /// Lease on the action advancement hold
    #[serde(default = "default_hold_lease")]
    pub action_next_hold_lease_secs: i64,

    /// Concurrent external media sessions per call
    #[serde(default = "default_external_media_capacity")]
    pub external_media_capacity: usize,

    /// TTL of cached answering machine detection options
    #[serde(default = "default_amd_ttl")]
    pub amd_cache_ttl_secs: u64,

    /// P-Asserted-Identity used for anonymous outbound calls
    #[serde(default = "default_anonymous_uri")]
    pub anonymous_caller_uri: String,
}

fn default_health_delay() -> u64 {
    10_000
}

fn default_health_max_retry() -> u32 {
    2
}

fn default_action_timeout() -> i64 {
    180_000
}

fn default_call_duration() -> u64 {
    3 * 60 * 60 * 1000
}

fn default_dial_timeout() -> u64 {
    30
}

fn default_hold_lease() -> i64 {
    30
}

fn default_external_media_capacity() -> usize {
    5
}

fn default_amd_ttl() -> u64 {
    86_400
}

fn default_anonymous_uri() -> String {
    "sip:anonymous@anonymous.invalid".to_string()
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            health_check_delay_ms: default_health_delay(),
            health_check_max_retry: default_health_max_retry(),
            default_action_timeout_ms: default_action_timeout(),
            call_duration_timeout_ms: default_call_duration(),
            dial_timeout_secs: default_dial_timeout(),
            action_next_hold_lease_secs: default_hold_lease(),
            external_media_capacity: default_external_media_capacity(),
            amd_cache_ttl_secs: default_amd_ttl(),
            anonymous_caller_uri: default_anonymous_uri(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9100)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 20)?
            .set_default("peers.timeout_ms", 3000)?
            .set_default("call.health_check_delay_ms", 10_000)?
            .set_default("call.health_check_max_retry", 2)?
            .set_default("call.default_action_timeout_ms", 180_000)?
            .set_default("call.external_media_capacity", 5)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with CALLCTL_ prefix
            .add_source(
                Environment::with_prefix("CALLCTL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("CALLCTL").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_default_call_settings() {
        let settings = CallSettings::default();
        assert_eq!(settings.health_check_delay_ms, 10_000);
        assert_eq!(settings.health_check_max_retry, 2);
        assert_eq!(settings.default_action_timeout_ms, 180_000);
        assert_eq!(settings.external_media_capacity, 5);
    }

    #[test]
    fn test_call_section_is_optional() {
        let raw = r#"
            [server]
            [database]
            url = "postgresql://localhost/callctl"
            [redis]
            url = "redis://localhost:6379"
            [peers]
            channel_url = "http://channel"
            flow_url = "http://flow"
            route_url = "http://route"
            billing_url = "http://billing"
            groupcall_url = "http://groupcall"
            confbridge_url = "http://confbridge"
            media_url = "http://media"
            webhook_url = "http://webhook"
            delay_url = "http://delay"
        "#;

        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(cfg.call, CallSettings::default());
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.peers.timeout_ms, 3000);
        assert_eq!(cfg.server_addr(), "0.0.0.0:9100");
    }
}
