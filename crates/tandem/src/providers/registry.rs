use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{LlmError, LlmResult};

use super::base::Provider;

/// An explicit mapping from scope prefixes to provider adapters.
///
/// Owned by whatever constructs calls; there is no ambient global
/// registry. Lifecycle is explicit: `register`, `get`, `clear`.
#[derive(Default)]
pub struct Registry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id. A later registration with
    /// the same id replaces the earlier one.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, provider_id: &str) -> LlmResult<Arc<dyn Provider>> {
        self.providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| LlmError::UnknownProvider(provider_id.to_string()))
    }

    /// Resolve a scoped model id of the form `provider:model` to its
    /// provider. The scoped id is returned unchanged; providers strip
    /// their own prefix via `provider_model_name`.
    pub fn resolve(&self, model_id: &str) -> LlmResult<(Arc<dyn Provider>, String)> {
        let prefix = model_id
            .split_once(':')
            .map(|(prefix, _)| prefix)
            .ok_or_else(|| LlmError::UnknownProvider(model_id.to_string()))?;
        let provider = self.get(prefix)?;
        Ok((provider, model_id.to_string()))
    }

    pub fn clear(&mut self) {
        self.providers.clear();
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("Registry").field("providers", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    #[test]
    fn test_register_get_clear() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockProvider::new("acme")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("acme").unwrap().id(), "acme");
        assert!(matches!(
            registry.get("other"),
            Err(LlmError::UnknownProvider(_))
        ));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_scoped_model() {
        let mut registry = Registry::new();
        registry.register(Arc::new(MockProvider::new("acme")));

        let (provider, model_id) = registry.resolve("acme:fast-1").unwrap();
        assert_eq!(provider.id(), "acme");
        assert_eq!(model_id, "acme:fast-1");

        assert!(registry.resolve("unscoped-model").is_err());
        assert!(registry.resolve("unknown:model").is_err());
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = Registry::new();
        registry.register(Arc::new(MockProvider::new("acme")));
        registry.register(Arc::new(MockProvider::new("acme")));
        assert_eq!(registry.len(), 1);
    }
}
