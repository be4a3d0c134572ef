//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.huddle/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inbound webhook settings (signature secret, debounce window).
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Gateway bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 15151).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15151
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Webhook receiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Signing secret (`whsec_...`). Overridden by HUDDLE_WEBHOOK_SECRET env. When unset, signatures are not checked.
    #[serde(default)]
    pub secret: Option<String>,

    /// Quiet period after the last message before a batch is delivered (default 2000).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum clock skew accepted on signed requests, in seconds (default 300).
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_tolerance_secs() -> u64 {
    300
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            debounce_ms: default_debounce_ms(),
            tolerance_secs: default_tolerance_secs(),
        }
    }
}

impl WebhookConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn tolerance(&self) -> Duration {
        Duration::from_secs(self.tolerance_secs)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve the webhook secret: env HUDDLE_WEBHOOK_SECRET overrides config.
pub fn resolve_webhook_secret(config: &Config) -> Option<String> {
    std::env::var("HUDDLE_WEBHOOK_SECRET")
        .ok()
        .and_then(|s| non_empty(&s))
        .or_else(|| config.webhook.secret.as_deref().and_then(non_empty))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HUDDLE_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".huddle").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 15151);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn empty_json_uses_defaults() {
        let c: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(c.webhook.debounce(), Duration::from_millis(2000));
        assert_eq!(c.webhook.tolerance(), Duration::from_secs(300));
        assert!(c.webhook.secret.is_none());
    }

    #[test]
    fn camel_case_fields_parse() {
        let c: Config = serde_json::from_str(
            r#"{ "gateway": { "port": 8080 }, "webhook": { "secret": "whsec_abc", "debounceMs": 250 } }"#,
        )
        .unwrap();
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.webhook.debounce_ms, 250);
        assert_eq!(c.webhook.secret.as_deref(), Some("whsec_abc"));
    }

    #[test]
    fn blank_secret_counts_as_unset() {
        let mut c = Config::default();
        c.webhook.secret = Some("   ".into());
        if std::env::var("HUDDLE_WEBHOOK_SECRET").is_err() {
            assert_eq!(resolve_webhook_secret(&c), None);
        }
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join(format!("huddle-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 15151);
    }
}
