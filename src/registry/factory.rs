use std::sync::Arc;

use crate::config::{ProviderKind, ProviderRecord};
use crate::error::{Result, ShippingError};
use crate::provider::shiprocket::{ShiprocketProvider, DEFAULT_BASE_URL};
use crate::provider::ShippingProvider;
use crate::simulator::config::get_profile;
use crate::simulator::SimulatedCarrier;

/// Builds an uninitialized adapter from a provider record.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, record: &ProviderRecord) -> Result<Arc<dyn ShippingProvider>>;
}

/// Factory for the adapters shipped with this crate.
///
/// - `shiprocket`: optional `base_url` credential overrides the API root
/// - `simulated`: optional `profile` credential picks the carrier profile,
///   otherwise the provider id is used as the profile name
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn build(&self, record: &ProviderRecord) -> Result<Arc<dyn ShippingProvider>> {
        let id = record.provider_id.clone();
        match record.kind {
            ProviderKind::Shiprocket => {
                let base_url = record
                    .credentials
                    .get("base_url")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_BASE_URL);
                Ok(Arc::new(ShiprocketProvider::with_base_url(id, base_url)?))
            }
            ProviderKind::Simulated => {
                let profile_name = record
                    .credentials
                    .get("profile")
                    .map(String::as_str)
                    .unwrap_or(id.as_str());
                let profile = get_profile(profile_name).ok_or_else(|| {
                    ShippingError::Config(format!("{id}: unknown simulated profile {profile_name}"))
                })?;
                Ok(Arc::new(SimulatedCarrier::new(id, profile)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::provider::ProviderId;
    use std::collections::HashMap;

    fn record(id: &str, kind: ProviderKind, credentials: &[(&str, &str)]) -> ProviderRecord {
        ProviderRecord {
            provider_id: ProviderId::from(id),
            kind,
            enabled: true,
            priority: 1,
            supported_modes: Vec::new(),
            credentials: credentials
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_builds_simulated_by_id_or_profile() {
        let by_id = DefaultProviderFactory
            .build(&record("bluecargo", ProviderKind::Simulated, &[]))
            .unwrap();
        assert_eq!(by_id.identify().name, "BlueCargo");

        let aliased = DefaultProviderFactory
            .build(&record("backup", ProviderKind::Simulated, &[("profile", "parcelpro")]))
            .unwrap();
        assert_eq!(aliased.identify().id, ProviderId::from("backup"));
        assert_eq!(aliased.identify().name, "ParcelPro");
    }

    #[test]
    fn test_unknown_profile_is_config_error() {
        let err = DefaultProviderFactory
            .build(&record("mystery", ProviderKind::Simulated, &[]))
            .err()
            .unwrap();
        assert!(matches!(err, ShippingError::Config(_)));
    }

    #[test]
    fn test_builds_shiprocket() {
        let adapter = DefaultProviderFactory
            .build(&record("sr", ProviderKind::Shiprocket, &[("base_url", "http://localhost:9")]))
            .unwrap();
        assert_eq!(adapter.identify().id, ProviderId::from("sr"));
    }
}
