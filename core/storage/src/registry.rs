//! Storage registry for resolving a backend by name.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use blobgate_common::{ContainerName, Error, Result};

use crate::provider::RemoteStorage;

/// Factory function type for creating backends.
pub type StorageFactory = Box<dyn Fn(Value) -> Result<Arc<dyn RemoteStorage>> + Send + Sync>;

/// Registry for storage backend factories.
///
/// Allows dynamic registration and resolution of backends
/// by name and configuration.
pub struct StorageRegistry {
    factories: HashMap<String, StorageFactory>,
}

impl StorageRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Postconditions
    /// - `resolve(name, ..)` calls `factory`
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: StorageFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Storage backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a backend by name and configuration.
    ///
    /// # Preconditions
    /// - `config` matches what the named backend's factory expects
    ///
    /// # Errors
    /// - Backend not registered
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn RemoteStorage>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::NotFound(format!("Storage backend '{}' is not registered", name))
        })?;
        let storage = factory(config)?;
        tracing::debug!(backend = name, "resolved storage backend");
        Ok(storage)
    }

    /// Get list of registered backend names.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn optional_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// Create a registry with the built-in backends.
///
/// # Postconditions
/// - `memory`, `local` and `azure` are registered
/// - `local` requires a `root` entry in its configuration
pub fn create_default_registry() -> StorageRegistry {
    let mut registry = StorageRegistry::new();

    // Memory backend (for testing)
    let memory = registry.register(
        "memory",
        Box::new(|config| {
            let mut storage = crate::memory::MemoryStorage::new();
            if let Some(container) = optional_str(&config, "container") {
                storage = storage.with_container(ContainerName::new(container)?);
            }
            if let Some(cache_control) = optional_str(&config, "default_cache_control") {
                storage = storage.with_cache_control(cache_control);
            }
            Ok(Arc::new(storage))
        }),
    );

    // Local filesystem backend
    let local = registry.register(
        "local",
        Box::new(|config| {
            let root = optional_str(&config, "root").ok_or_else(|| {
                Error::Configuration("Local backend requires 'root' path".to_string())
            })?;
            let mut storage = crate::local::LocalStorage::new(root)?;
            if let Some(cache_control) = optional_str(&config, "default_cache_control") {
                storage = storage.with_cache_control(cache_control);
            }
            Ok(Arc::new(storage))
        }),
    );

    // Azure Blob Storage backend
    let azure = registry.register(
        "azure",
        Box::new(|config| crate::azure::create_azure_storage(config)),
    );

    for result in [memory, local, azure] {
        if let Err(e) = result {
            tracing::warn!(error = %e, "skipping built-in backend");
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use blobgate_common::BlobName;
    use tempfile::TempDir;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = StorageRegistry::new();

        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryStorage::new()))))
            .unwrap();

        let storage = registry.resolve("test", Value::Null).unwrap();
        assert_eq!(storage.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = StorageRegistry::new();

        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryStorage::new()))))
            .unwrap();

        let result = registry.register("test", Box::new(|_| Ok(Arc::new(MemoryStorage::new()))));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = StorageRegistry::new();
        let result = registry.resolve("unknown", Value::Null);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_default_registry_backends() {
        let registry = create_default_registry();
        assert_eq!(registry.backends(), vec!["azure", "local", "memory"]);
        assert!(registry.has_backend("azure"));
    }

    #[test]
    fn test_default_memory_with_container() {
        let registry = create_default_registry();
        let storage = registry
            .resolve("memory", serde_json::json!({ "container": "images" }))
            .unwrap();

        let name = BlobName::parse("a.png").unwrap();
        assert_eq!(storage.partial_file_path(&name), "images/a.png");
    }

    #[test]
    fn test_default_local_requires_root() {
        let registry = create_default_registry();
        assert!(matches!(
            registry.resolve("local", serde_json::json!({})),
            Err(Error::Configuration(_))
        ));

        let temp = TempDir::new().unwrap();
        let storage = registry
            .resolve("local", serde_json::json!({ "root": temp.path() }))
            .unwrap();
        assert_eq!(storage.name(), "local");
    }
}
