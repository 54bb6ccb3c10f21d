//! Target locator: the name → implementation mapping.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::LocatorError;
use crate::targets::target::Target;

/// Registry of invokable targets, looked up by service name.
///
/// Resolution happens on every `start` call rather than being cached in the
/// task handle's construction path, so a re-registered target takes effect
/// on the next restart of any task that names it.
pub struct TargetLocator {
    targets: RwLock<HashMap<String, Arc<dyn Target>>>,
}

impl TargetLocator {
    /// Create a new empty locator.
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// Register a target under its own name, replacing any previous entry.
    pub async fn register(&self, target: Arc<dyn Target>) {
        let name = target.name().to_string();
        tracing::debug!(target = %name, description = target.description(), "Registered target");
        self.targets.write().await.insert(name, target);
    }

    /// Register a target (sync version for startup wiring).
    pub fn register_sync(&self, target: Arc<dyn Target>) {
        let name = target.name().to_string();
        if let Ok(mut targets) = self.targets.try_write() {
            tracing::debug!(target = %name, description = target.description(), "Registered target");
            targets.insert(name, target);
        }
    }

    /// Remove a target.
    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Target>> {
        self.targets.write().await.remove(name)
    }

    /// Look a target up by name.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Target>, LocatorError> {
        self.targets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| LocatorError::NotFound {
                name: name.to_string(),
            })
    }

    /// Check if a target exists.
    pub async fn has(&self, name: &str) -> bool {
        self.targets.read().await.contains_key(name)
    }

    /// List all registered target names.
    pub async fn list(&self) -> Vec<String> {
        self.targets.read().await.keys().cloned().collect()
    }

    /// Number of registered targets.
    pub fn count(&self) -> usize {
        self.targets.try_read().map(|t| t.len()).unwrap_or(0)
    }
}

impl Default for TargetLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvocationError;
    use async_trait::async_trait;

    struct MockTarget {
        name: String,
    }

    #[async_trait]
    impl Target for MockTarget {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "a mock target for testing"
        }
        async fn invoke(&self, _method: &str) -> Result<(), InvocationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let locator = TargetLocator::new();
        locator
            .register(Arc::new(MockTarget {
                name: "billing".to_string(),
            }))
            .await;

        assert!(locator.has("billing").await);
        let resolved = locator.resolve("billing").await.unwrap();
        assert_eq!(resolved.name(), "billing");
    }

    #[tokio::test]
    async fn resolve_unknown_is_not_found() {
        let locator = TargetLocator::new();
        let err = match locator.resolve("ghost").await {
            Ok(_) => panic!("expected resolve to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, LocatorError::NotFound { name } if name == "ghost"));
    }

    #[tokio::test]
    async fn unregister_removes() {
        let locator = TargetLocator::new();
        locator
            .register(Arc::new(MockTarget {
                name: "temp".to_string(),
            }))
            .await;
        assert!(locator.has("temp").await);
        locator.unregister("temp").await;
        assert!(!locator.has("temp").await);
    }

    #[tokio::test]
    async fn list_and_count() {
        let locator = TargetLocator::new();
        locator
            .register(Arc::new(MockTarget {
                name: "a".to_string(),
            }))
            .await;
        locator
            .register(Arc::new(MockTarget {
                name: "b".to_string(),
            }))
            .await;

        assert_eq!(locator.count(), 2);
        let names = locator.list().await;
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"b".to_string()));
    }
}
