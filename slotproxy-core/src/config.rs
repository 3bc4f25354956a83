//! Runtime configuration (spec.md §6), layered the way the teacher's
//! `ServerOptions` is implied to be built: defaults, then a config file via
//! the `config` crate, then environment variables, then CLI flags via
//! `clap` taking final precedence.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            interval_seconds: 5,
            timeout_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LruConfig {
    pub capacity: usize,
    pub hot_key_threshold: u32,
}

impl Default for LruConfig {
    fn default() -> Self {
        LruConfig {
            capacity: 100_000,
            hot_key_threshold: 1_000,
        }
    }
}

/// Every knob spec.md §6 names, plus the ambient logging/runtime knobs a
/// deployable binary needs. Field names intentionally mirror the spec's
/// dotted config keys (`heartbeat.interval.seconds`, etc.) via serde's
/// nested-struct mapping when loaded from TOML/YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: String,
    pub namespace: u32,
    pub master_name: String,
    pub sentinel_listen_addr: SocketAddr,
    pub storage_redis_addr: Option<String>,
    /// When true, newly created zset keys default to encoding v1 (mirrored
    /// to `storage_redis_addr`) instead of v0 (native KV sub-keys). Only
    /// meaningful alongside `storage_redis_addr`.
    pub zset_storage_redis_encoding: bool,
    pub heartbeat: HeartbeatConfig,
    pub lru: LruConfig,
    pub log_level: String,
    pub sentinel_username: Option<String>,
    pub sentinel_password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen_addr: "127.0.0.1:6380".parse().unwrap(),
            data_dir: "./data".into(),
            namespace: 0,
            master_name: "proxy_sentinel".into(),
            sentinel_listen_addr: "127.0.0.1:26380".parse().unwrap(),
            storage_redis_addr: None,
            zset_storage_redis_encoding: false,
            heartbeat: HeartbeatConfig::default(),
            lru: LruConfig::default(),
            log_level: "info".into(),
            sentinel_username: None,
            sentinel_password: None,
        }
    }
}

impl ProxyConfig {
    /// Loads an optional config file, then `PROXY_*` environment variable
    /// overrides (spec.md §6 layering order). Any key absent from both
    /// falls back to this struct's `#[serde(default)]` field, which is why
    /// every field here has a matching entry in `Default for ProxyConfig`.
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("PROXY").separator("__"));
        builder.build()?.try_deserialize()
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat.interval_seconds)
    }

    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.heartbeat.interval_seconds, 5);
        assert_eq!(cfg.heartbeat.timeout_seconds, 20);
        assert_eq!(cfg.master_name, "proxy_sentinel");
    }
}
