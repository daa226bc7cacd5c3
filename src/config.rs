/// Engine configuration.
///
/// Loaded from JSON: a file named by `SHIPPING_CONFIG`, inline JSON in
/// `SHIPPING_CONFIG_JSON`, or built-in defaults (three simulated carriers).
/// `SHIPPING_PROVIDER_TIMEOUT_MS` overrides the per-provider rate timeout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::error::{Result, ShippingError};
use crate::models::provider::ProviderId;
use crate::models::rate::ShippingMode;

pub const CONFIG_PATH_ENV: &str = "SHIPPING_CONFIG";
pub const CONFIG_JSON_ENV: &str = "SHIPPING_CONFIG_JSON";
pub const PROVIDER_TIMEOUT_ENV: &str = "SHIPPING_PROVIDER_TIMEOUT_MS";

/// Which adapter implementation backs a provider record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Shiprocket,
    Simulated,
}

/// One provider configuration record, as stored by the admin side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider_id: ProviderId,
    pub kind: ProviderKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower value is tried first.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Empty means every mode.
    #[serde(default)]
    pub supported_modes: Vec<ShippingMode>,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    100
}

/// Rate cache TTL window and hot-key detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub min_ttl_secs: u64,
    pub max_ttl_secs: u64,
    /// Requests for one key are counted over this window.
    pub hot_window_secs: u64,
    /// Request count at which a key gets the minimum TTL.
    pub hot_threshold: u32,
    /// How long an expired entry is kept for stale serving before eviction.
    pub stale_grace_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            min_ttl_secs: 3600,
            max_ttl_secs: 6 * 3600,
            hot_window_secs: 3600,
            hot_threshold: 10,
            stale_grace_secs: 24 * 3600,
        }
    }
}

impl CacheConfig {
    pub fn min_ttl(&self) -> Duration {
        Duration::from_secs(self.min_ttl_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }

    pub fn hot_window(&self) -> Duration {
        Duration::from_secs(self.hot_window_secs)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }

    /// `(min, max)` TTL bounds; an inverted window collapses to `min`.
    pub fn ttl_window(&self) -> (Duration, Duration) {
        let min = self.min_ttl();
        (min, self.max_ttl().max(min))
    }
}

/// What to do with webhooks that cannot be authenticated (provider has no
/// signature support, or sent no signature header).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsignedWebhookPolicy {
    /// Process them, logging a trust warning.
    #[default]
    Accept,
    /// Discard them as a signature failure.
    Reject,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget for each provider's `get_rates` call.
    pub provider_timeout_ms: u64,
    /// Budget for create/track/cancel calls.
    pub shipment_timeout_ms: u64,
    pub cache: CacheConfig,
    pub unsigned_webhooks: UnsignedWebhookPolicy,
    pub providers: Vec<ProviderRecord>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            provider_timeout_ms: 5_000,
            shipment_timeout_ms: 15_000,
            cache: CacheConfig::default(),
            unsigned_webhooks: UnsignedWebhookPolicy::default(),
            providers: default_providers(),
        }
    }
}

/// The three simulated carriers, in priority order.
pub fn default_providers() -> Vec<ProviderRecord> {
    ["swiftship", "bluecargo", "parcelpro"]
        .iter()
        .enumerate()
        .map(|(i, id)| ProviderRecord {
            provider_id: ProviderId::from(*id),
            kind: ProviderKind::Simulated,
            enabled: true,
            priority: i as u32 + 1,
            supported_modes: Vec::new(),
            credentials: HashMap::new(),
        })
        .collect()
}

impl EngineConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn shipment_timeout(&self) -> Duration {
        Duration::from_millis(self.shipment_timeout_ms)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| ShippingError::Config(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| ShippingError::Config(format!("cannot read {path}: {e}")))?;
            Self::from_json_str(&raw)?
        } else if let Ok(raw) = std::env::var(CONFIG_JSON_ENV) {
            Self::from_json_str(&raw)?
        } else {
            EngineConfig::default()
        };
        if let Ok(raw) = std::env::var(PROVIDER_TIMEOUT_ENV) {
            config.provider_timeout_ms = raw.trim().parse().map_err(|_| {
                ShippingError::Config(format!("{PROVIDER_TIMEOUT_ENV} must be milliseconds, got {raw}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider_timeout_ms == 0 || self.shipment_timeout_ms == 0 {
            return Err(ShippingError::Config("timeouts must be positive".to_string()));
        }
        if self.cache.min_ttl_secs == 0 || self.cache.min_ttl_secs > self.cache.max_ttl_secs {
            return Err(ShippingError::Config(format!(
                "cache ttl window [{}, {}] is invalid",
                self.cache.min_ttl_secs, self.cache.max_ttl_secs
            )));
        }
        let mut ids: Vec<&ProviderId> = self.providers.iter().map(|p| &p.provider_id).collect();
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ShippingError::Config(format!("duplicate provider id {}", pair[0])));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.provider_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "provider_timeout_ms": 2500,
                "unsigned_webhooks": "reject",
                "providers": [
                    {"provider_id": "sr", "kind": "shiprocket", "priority": 2,
                     "credentials": {"email": "ops@example.com", "password": "x"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.provider_timeout_ms, 2500);
        assert_eq!(config.shipment_timeout_ms, 15_000);
        assert_eq!(config.unsigned_webhooks, UnsignedWebhookPolicy::Reject);
        assert!(config.providers[0].enabled);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_duplicate_provider_ids_are_rejected() {
        let mut config = EngineConfig::default();
        config.providers.push(config.providers[0].clone());
        assert!(matches!(config.validate(), Err(ShippingError::Config(_))));
    }

    #[test]
    fn test_inverted_ttl_window_is_rejected() {
        let mut config = EngineConfig::default();
        config.cache.min_ttl_secs = 10_000;
        config.cache.max_ttl_secs = 100;
        assert!(config.validate().is_err());
    }
}
