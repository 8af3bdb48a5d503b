//! Provider registry for runtime provider lookup.
//!
//! Name-indexed registry of boxed providers that also remembers registration
//! order, which is the tie-break order for every selection policy.

use std::collections::HashMap;
use std::sync::Arc;

use super::box_provider::BoxLlmProvider;

/// Registry of available providers, indexed by name.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<BoxLlmProvider>>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its descriptor name.
    ///
    /// If a provider with this name already exists it is replaced in place,
    /// keeping its original position.
    pub fn register(&mut self, provider: BoxLlmProvider) {
        let name = provider.name().to_string();
        let provider = Arc::new(provider);
        match self.index.get(&name) {
            Some(&idx) => self.providers[idx] = provider,
            None => {
                self.index.insert(name, self.providers.len());
                self.providers.push(provider);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BoxLlmProvider>> {
        self.index.get(name).map(|&idx| &self.providers[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Provider names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BoxLlmProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::MockProvider;

    #[test]
    fn test_register_keeps_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(BoxLlmProvider::new(MockProvider::ok("b")));
        registry.register(BoxLlmProvider::new(MockProvider::ok("a")));
        assert_eq!(registry.names(), vec!["b", "a"]);
        assert!(registry.contains("a"));
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = ProviderRegistry::new();
        registry.register(BoxLlmProvider::new(MockProvider::ok("a")));
        registry.register(BoxLlmProvider::new(MockProvider::ok("b")));
        registry.register(BoxLlmProvider::new(MockProvider::ok("a").with_model("other")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().describe().model.model, "other");
    }
}
