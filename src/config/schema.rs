//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the security gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream the gateway forwards accepted traffic to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Security interception pipeline settings.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute base URI of the upstream (e.g., "http://127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Per-module security configuration, one section per module.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub global: GlobalConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
    pub crypto: CryptoConfig,
}

/// Global switch and exclusions applied before any module.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub enabled: bool,

    /// Glob patterns (`*` one segment, `**` any depth).
    pub exclude_paths: Vec<String>,

    /// Application base path stripped before exclusion matching (e.g. "/gateway").
    pub base_path: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude_paths: Vec::new(),
            base_path: String::new(),
        }
    }
}

/// Replay-protection module.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub enabled: bool,
    pub exclude_paths: Vec<String>,

    /// Replay store strategy name (only "memory" ships).
    pub strategy: String,

    /// Validity window for timestamps and nonce retention, in seconds.
    pub ttl_secs: u64,

    /// Prefix prepended to every nonce key in the replay store.
    pub nonce_key_prefix: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exclude_paths: Vec::new(),
            strategy: "memory".to_string(),
            ttl_secs: 300,
            nonce_key_prefix: "gateway:nonce:".to_string(),
        }
    }
}

/// Audit logging module.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub exclude_paths: Vec<String>,

    /// Publisher name: "tracing" or "json".
    pub publisher: String,

    /// Include body bytes in request/response snapshots.
    pub include_payload: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude_paths: Vec::new(),
            publisher: "tracing".to_string(),
            include_payload: false,
        }
    }
}

/// Policy applied when response encryption fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptFailurePolicy {
    /// Reject the response with 500.
    #[default]
    Fail,
    /// Log the failure and send the plaintext body.
    PassThrough,
}

/// Transport crypto module.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub enabled: bool,
    pub exclude_paths: Vec<String>,
    pub algorithm_strategy: String,
    pub key_source_strategy: String,
    pub key_id: String,

    /// Ceiling for any buffered request or response body, in bytes.
    pub max_body_bytes: usize,

    pub on_encrypt_failure: EncryptFailurePolicy,
    pub key_cache_name: String,

    /// Versioned keys for the `config_file` key source.
    pub keys: Vec<KeyEntry>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exclude_paths: Vec::new(),
            algorithm_strategy: "AES/GCM/NoPadding".to_string(),
            key_source_strategy: "config_file".to_string(),
            key_id: "default".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            on_encrypt_failure: EncryptFailurePolicy::Fail,
            key_cache_name: "gateway-keys".to_string(),
            keys: Vec::new(),
        }
    }
}

/// A single versioned key; `secret` is base64.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyEntry {
    pub version: String,
    pub secret: String,
    #[serde(default)]
    pub primary: bool,
}
