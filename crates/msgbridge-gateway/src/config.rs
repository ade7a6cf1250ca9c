//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP gateway.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes. Attachments arrive base64 encoded.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// How long to wait for the first pairing code, in seconds.
    #[serde(default = "GatewayConfig::default_pair_timeout")]
    pub pair_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_max_body() -> usize {
        16 * 1024 * 1024 // 16 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_pair_timeout() -> u64 {
        20
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the pairing timeout as a `Duration`.
    #[must_use]
    pub const fn pair_timeout(&self) -> Duration {
        Duration::from_secs(self.pair_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            pair_timeout_seconds: Self::default_pair_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert_eq!(config.cors_origins, vec!["*"]);
    }

    #[test]
    fn timeout_duration() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.pair_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{ "listen_addr": "127.0.0.1:9000" }"#).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.request_timeout_seconds, 30);
    }
}
