//! Process-wide plugin registry.
//!
//! Keyed by plugin id, populated at startup (see [`crate::builtin`]).
//! Read-mostly: many concurrent `get`s from executing workflows, rare
//! registrations, so a reader/writer lock over the two maps suffices.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{NodeMetadata, NodePlugin, RegistryError};

#[derive(Default)]
struct RegistryInner {
    plugins: HashMap<String, Arc<dyn NodePlugin>>,
    metadata: HashMap<String, NodeMetadata>,
}

/// Thread-safe catalog mapping plugin id → executor + metadata.
#[derive(Default)]
pub struct NodeRegistry {
    inner: RwLock<RegistryInner>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, rejecting duplicates and unusable metadata.
    pub fn register(&self, plugin: Arc<dyn NodePlugin>) -> Result<(), RegistryError> {
        let metadata = plugin.metadata();

        if metadata.id.is_empty() {
            return Err(RegistryError::InvalidMetadata("plugin id is empty".into()));
        }
        if metadata.name.is_empty() {
            return Err(RegistryError::InvalidMetadata("plugin name is empty".into()));
        }
        if metadata.kind.is_empty() {
            return Err(RegistryError::InvalidMetadata("plugin type is empty".into()));
        }
        if metadata.category.is_empty() {
            return Err(RegistryError::InvalidMetadata(
                "plugin category is empty".into(),
            ));
        }
        if metadata.config_schema.is_none() {
            return Err(RegistryError::InvalidMetadata(
                "plugin config schema is missing".into(),
            ));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.plugins.contains_key(&metadata.id) {
            return Err(RegistryError::DuplicateId(metadata.id));
        }

        inner.plugins.insert(metadata.id.clone(), plugin);
        inner.metadata.insert(metadata.id.clone(), metadata);
        Ok(())
    }

    pub fn unregister(&self, plugin_id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().unwrap();
        if inner.plugins.remove(plugin_id).is_none() {
            return Err(RegistryError::NotFound(plugin_id.to_string()));
        }
        inner.metadata.remove(plugin_id);
        Ok(())
    }

    pub fn get(&self, plugin_id: &str) -> Result<Arc<dyn NodePlugin>, RegistryError> {
        let inner = self.inner.read().unwrap();
        inner
            .plugins
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(plugin_id.to_string()))
    }

    pub fn metadata(&self, plugin_id: &str) -> Result<NodeMetadata, RegistryError> {
        let inner = self.inner.read().unwrap();
        inner
            .metadata
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(plugin_id.to_string()))
    }

    /// Registered plugin ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut ids: Vec<String> = inner.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All metadata, sorted by category then name.
    pub fn all_metadata(&self) -> Vec<NodeMetadata> {
        let inner = self.inner.read().unwrap();
        let mut all: Vec<NodeMetadata> = inner.metadata.values().cloned().collect();
        all.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        all
    }

    pub fn list_by_category(&self, category: &str) -> Vec<NodeMetadata> {
        let inner = self.inner.read().unwrap();
        let mut matched: Vec<NodeMetadata> = inner
            .metadata
            .values()
            .filter(|m| m.category == category)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        matched
    }

    pub fn list_by_type(&self, kind: &str) -> Vec<NodeMetadata> {
        let inner = self.inner.read().unwrap();
        let mut matched: Vec<NodeMetadata> = inner
            .metadata
            .values()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        matched
    }

    /// Case-insensitive substring search over name, description, category,
    /// type, and tags. An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<NodeMetadata> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().unwrap();
        let mut matched: Vec<NodeMetadata> = inner
            .metadata
            .values()
            .filter(|m| {
                needle.is_empty()
                    || m.name.to_lowercase().contains(&needle)
                    || m.description.to_lowercase().contains(&needle)
                    || m.category.to_lowercase().contains(&needle)
                    || m.kind.to_lowercase().contains(&needle)
                    || m.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        matched
    }

    pub fn count(&self) -> usize {
        self.inner.read().unwrap().plugins.len()
    }

    pub fn is_registered(&self, plugin_id: &str) -> bool {
        self.inner.read().unwrap().plugins.contains_key(plugin_id)
    }

    /// Distinct categories across all registered plugins, sorted.
    pub fn categories(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut categories: Vec<String> = inner
            .metadata
            .values()
            .map(|m| m.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;

    fn registry_with(names: &[&str]) -> NodeRegistry {
        let registry = NodeRegistry::new();
        for name in names {
            registry
                .register(Arc::new(MockNode::returning(*name, Default::default())))
                .expect("registration should succeed");
        }
        registry
    }

    #[test]
    fn register_and_get() {
        let registry = registry_with(&["static_data"]);
        assert!(registry.get("static_data").is_ok());
        assert!(registry.is_registered("static_data"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = registry_with(&["dup"]);
        let err = registry
            .register(Arc::new(MockNode::returning("dup", Default::default())))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(id) if id == "dup"));
    }

    #[test]
    fn empty_id_is_rejected() {
        let registry = NodeRegistry::new();
        let err = registry
            .register(Arc::new(MockNode::returning("", Default::default())))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidMetadata(_)));
    }

    #[test]
    fn get_unknown_returns_not_found() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.get("ghost"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn unregister_removes_plugin() {
        let registry = registry_with(&["gone"]);
        registry.unregister("gone").unwrap();
        assert!(!registry.is_registered("gone"));
        assert!(matches!(
            registry.unregister("gone"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn list_is_sorted() {
        let registry = registry_with(&["zeta", "alpha", "mid"]);
        assert_eq!(registry.list(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn search_matches_substring_case_insensitive() {
        let registry = registry_with(&["data_filter", "logger"]);
        let hits = registry.search("FILT");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "data_filter");
    }
}
