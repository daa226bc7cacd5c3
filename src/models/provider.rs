use serde::{Deserialize, Serialize};

use super::rate::ShippingMode;

/// Opaque key identifying one configured provider adapter (e.g. a
/// carrier-aggregator account). Join key across registry, cache, rates and events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        ProviderId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        ProviderId(id.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        ProviderId(id)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an adapter reports about itself. Pure data, no I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Unique provider identifier (e.g., "shiprocket_main").
    pub id: ProviderId,
    /// Human-readable name (e.g., "Shiprocket").
    pub name: String,
}

/// Registry introspection entry returned to admin tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub name: String,
    pub enabled: bool,
    /// Lower value is tried first.
    pub priority: u32,
    pub supported_modes: Vec<ShippingMode>,
}
