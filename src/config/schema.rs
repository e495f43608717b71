//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::http::response::LOG_DATA_LIMIT;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Development or deployment mode.
    pub run_mode: RunMode,

    /// Route table settings.
    pub routes: RouteTableConfig,

    /// Traffic guard settings.
    pub traffic: TrafficConfig,

    /// Request and log size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
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

/// Process run mode.
///
/// Deployment mode hides internal error details from responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Development,
    Deployment,
}

impl RunMode {
    pub fn is_deployment(self) -> bool {
        matches!(self, RunMode::Deployment)
    }
}

/// Route table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteTableConfig {
    /// Pre-allocated route slots per method kind.
    pub initial_capacity: usize,
}

impl Default for RouteTableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
        }
    }
}

/// Admission formula used by the traffic guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatePolicyKind {
    /// Exact count of accepted requests over the trailing window.
    #[default]
    SlidingWindow,
    /// Smooth refill at the configured rate.
    TokenBucket,
}

/// Traffic guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Requests per second allowed per (client, path) when a group sets none.
    pub default_freq: f64,

    /// Admission formula.
    pub policy: RatePolicyKind,

    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are honoured.
    /// Empty means clients are always keyed on the socket address.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            default_freq: 30.0,
            policy: RatePolicyKind::SlidingWindow,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Bytes of envelope `Data` kept in log lines.
    pub log_data_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            log_data_limit: LOG_DATA_LIMIT,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin introspection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin router.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
