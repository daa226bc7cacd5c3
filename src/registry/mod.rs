/// Provider Registry: the live set of initialized adapters and their
/// configuration.
///
/// Candidates are always listed priority-ascending (ties broken by id), so
/// iteration order never depends on map internals. At most one adapter exists
/// per `ProviderId`; registering an id again replaces the previous adapter.

pub mod factory;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::ProviderRecord;
use crate::error::{Result, ShippingError};
use crate::models::provider::{ProviderId, ProviderInfo};
use crate::models::rate::ShippingMode;
use crate::provider::ShippingProvider;
use factory::ProviderFactory;

/// Per-provider settings owned by the admin side.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Lower value is tried first.
    pub priority: u32,
    /// Empty means every mode.
    pub supported_modes: Vec<ShippingMode>,
}

impl ProviderSettings {
    pub fn new(priority: u32) -> Self {
        ProviderSettings {
            enabled: true,
            priority,
            supported_modes: Vec::new(),
        }
    }

    pub fn supports(&self, mode: &ShippingMode) -> bool {
        self.supported_modes.is_empty() || self.supported_modes.contains(mode)
    }
}

impl From<&ProviderRecord> for ProviderSettings {
    fn from(record: &ProviderRecord) -> Self {
        ProviderSettings {
            enabled: record.enabled,
            priority: record.priority,
            supported_modes: record.supported_modes.clone(),
        }
    }
}

/// Snapshot of provider priorities used for deterministic tie-breaks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPriorities(BTreeMap<ProviderId, u32>);

impl ProviderPriorities {
    /// Priority of `id`; unknown providers sort last.
    pub fn get(&self, id: &ProviderId) -> u32 {
        self.0.get(id).copied().unwrap_or(u32::MAX)
    }
}

impl FromIterator<(ProviderId, u32)> for ProviderPriorities {
    fn from_iter<I: IntoIterator<Item = (ProviderId, u32)>>(iter: I) -> Self {
        ProviderPriorities(iter.into_iter().collect())
    }
}

struct RegisteredProvider {
    adapter: Arc<dyn ShippingProvider>,
    settings: ProviderSettings,
}

/// Registry of adapters keyed by provider id.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: RwLock<BTreeMap<ProviderId, RegisteredProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ProviderId, RegisteredProvider>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ProviderId, RegisteredProvider>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Builds and initializes one adapter per record.
    ///
    /// An adapter whose `initialize` fails is left out (logged) without
    /// affecting the others. Factory errors are configuration errors and abort.
    pub async fn from_records(records: &[ProviderRecord], factory: &dyn ProviderFactory) -> Result<Self> {
        let registry = ProviderRegistry::new();
        for record in records {
            let adapter = factory.build(record)?;
            match adapter.initialize(&record.credentials).await {
                Ok(()) => {
                    registry.register(adapter, ProviderSettings::from(record));
                }
                Err(e) => {
                    tracing::error!(
                        provider_id = %record.provider_id,
                        error = %e,
                        "provider initialization failed; provider excluded"
                    );
                }
            }
        }
        Ok(registry)
    }

    /// Registers `adapter` under its own id, replacing any previous adapter.
    /// Returns the replaced adapter, if any.
    pub fn register(
        &self,
        adapter: Arc<dyn ShippingProvider>,
        settings: ProviderSettings,
    ) -> Option<Arc<dyn ShippingProvider>> {
        let id = adapter.identify().id;
        let previous = self
            .write()
            .insert(id.clone(), RegisteredProvider { adapter, settings });
        if previous.is_some() {
            tracing::info!(provider_id = %id, "provider re-registered; previous adapter replaced");
        }
        previous.map(|p| p.adapter)
    }

    pub fn remove(&self, id: &ProviderId) -> Option<Arc<dyn ShippingProvider>> {
        self.write().remove(id).map(|p| p.adapter)
    }

    /// Re-applies admin configuration to registered adapters.
    ///
    /// Records for ids that are not registered are skipped; building new
    /// adapters requires `from_records`.
    pub fn reload(&self, records: &[ProviderRecord]) {
        let mut entries = self.write();
        for record in records {
            match entries.get_mut(&record.provider_id) {
                Some(entry) => entry.settings = ProviderSettings::from(record),
                None => tracing::warn!(
                    provider_id = %record.provider_id,
                    "reload skipped unregistered provider"
                ),
            }
        }
    }

    /// Enabled provider ids, priority ascending (tried first).
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        self.enabled_for(None).into_iter().map(|(id, _)| id).collect()
    }

    /// Enabled adapters supporting `mode`, priority ascending.
    pub fn enabled_for_mode(&self, mode: &ShippingMode) -> Vec<(ProviderId, Arc<dyn ShippingProvider>)> {
        self.enabled_for(Some(mode))
    }

    fn enabled_for(&self, mode: Option<&ShippingMode>) -> Vec<(ProviderId, Arc<dyn ShippingProvider>)> {
        let entries = self.read();
        let mut enabled: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry.settings.enabled)
            .filter(|(_, entry)| mode.map(|m| entry.settings.supports(m)).unwrap_or(true))
            .map(|(id, entry)| (entry.settings.priority, id.clone(), entry.adapter.clone()))
            .collect();
        // BTreeMap iteration is already id-ordered; a stable sort keeps it as the tie-break.
        enabled.sort_by_key(|(priority, _, _)| *priority);
        enabled.into_iter().map(|(_, id, adapter)| (id, adapter)).collect()
    }

    /// Adapter registered under `id`, enabled or not.
    pub fn adapter_for(&self, id: &ProviderId) -> Result<Arc<dyn ShippingProvider>> {
        self.read()
            .get(id)
            .map(|entry| entry.adapter.clone())
            .ok_or_else(|| ShippingError::UnknownProvider(id.clone()))
    }

    /// Adapter registered under `id`, only if it is enabled.
    pub fn enabled_adapter(&self, id: &ProviderId) -> Result<Arc<dyn ShippingProvider>> {
        match self.read().get(id) {
            Some(entry) if entry.settings.enabled => Ok(entry.adapter.clone()),
            Some(_) => Err(ShippingError::ProviderDisabled(id.clone())),
            None => Err(ShippingError::UnknownProvider(id.clone())),
        }
    }

    /// Number of enabled providers.
    pub fn count(&self) -> usize {
        self.read().values().filter(|e| e.settings.enabled).count()
    }

    /// Introspection listing of every registered provider, priority ascending.
    pub fn available_providers(&self) -> Vec<ProviderInfo> {
        let mut providers: Vec<ProviderInfo> = self
            .read()
            .iter()
            .map(|(id, entry)| ProviderInfo {
                id: id.clone(),
                name: entry.adapter.identify().name,
                enabled: entry.settings.enabled,
                priority: entry.settings.priority,
                supported_modes: entry.settings.supported_modes.clone(),
            })
            .collect();
        providers.sort_by_key(|p| p.priority);
        providers
    }

    pub fn priorities(&self) -> ProviderPriorities {
        self.read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.settings.priority))
            .collect()
    }
}
