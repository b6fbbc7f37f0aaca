use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tradegate_connectors_common::PaperConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration (`tradegate.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub gateway: GatewaySettings,
    /// Per-user venue credentials. When empty the built-in stub user is used.
    pub credentials: BTreeMap<String, CredentialEntry>,
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Upper bound for every venue round-trip, market loading included.
    pub request_timeout_secs: u64,
    /// Reuse connected clients per (exchange, credentials).
    pub cache_clients: bool,
    pub cache_ttl_secs: u64,
    /// Upper bound on cached clients; the oldest is dropped first.
    pub cache_max_clients: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            cache_clients: false,
            cache_ttl_secs: 300,
            cache_max_clients: 256,
        }
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialEntry { .. }")
    }
}

impl GatewayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.gateway.request_timeout(), Duration::from_secs(10));
        assert!(!config.gateway.cache_clients);
        assert!(config.credentials.is_empty());
        assert_eq!(config.paper.prices.len(), 3);
    }

    #[test]
    fn test_full_file() {
        let config = GatewayConfig::from_toml_str(
            r#"
            [server]
            bind = "127.0.0.1:9000"

            [gateway]
            request_timeout_secs = 3
            cache_clients = true

            [credentials.alice]
            api_key = "alice-key"
            api_secret = "alice-secret"

            [paper]
            latency_ms = 5
            [paper.prices]
            "SOL/USDT" = 150
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert!(config.gateway.cache_clients);
        assert_eq!(config.gateway.cache_ttl_secs, 300);
        assert_eq!(config.gateway.cache_max_clients, 256);
        assert_eq!(config.credentials["alice"].api_key, "alice-key");
        assert_eq!(config.paper.prices["SOL/USDT"], dec!(150));
        assert_eq!(config.paper.latency_ms, 5);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = GatewayConfig::from_toml_str(
            "[credentials.bob]\napi_key = \"k-123\"\napi_secret = \"s-456\"\n",
        )
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("k-123"));
        assert!(!rendered.contains("s-456"));
    }

    #[test]
    fn test_invalid_file() {
        assert!(matches!(
            GatewayConfig::from_toml_str("[gateway]\nrequest_timeout_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
