//! Provider registry: name → initialized client table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::client::ServiceClient;

/// Initialized provider clients keyed by provider name.
///
/// Built once before rules load; the loader validates every condition's
/// capability against it so unknown capabilities fail at load time rather
/// than mid-evaluation. A provider that is entirely absent is not a load
/// error; rules needing it are skipped at run time.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ServiceClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an initialized client under the given provider name.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn insert(&mut self, name: impl Into<String>, client: Arc<dyn ServiceClient>) {
        let name = name.into();
        info!(provider = %name, "registered provider");
        self.clients.insert(name, client);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceClient>> {
        self.clients.get(name).cloned()
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Whether a registered provider advertises the named capability.
    ///
    /// `false` for providers not in the registry.
    pub fn has_capability(&self, provider: &str, capability: &str) -> bool {
        self.clients
            .get(provider)
            .map(|c| c.has_capability(capability))
            .unwrap_or(false)
    }

    /// Names of all registered providers.
    pub fn provider_names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    /// Iterate over registered `(name, client)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ServiceClient>)> {
        self.clients.iter().map(|(name, client)| (name.as_str(), client))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Stop all registered clients.
    pub async fn stop_all(&self) {
        for (name, client) in &self.clients {
            info!(provider = %name, "stopping provider");
            client.stop().await;
        }
    }
}
