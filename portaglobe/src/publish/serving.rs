//! Serving-layer registration capability.
//!
//! The tile-serving layer keeps its own in-memory registrations of which
//! target paths serve which concrete databases. Publish operations keep
//! those registrations, the catalog and the rewrite rules consistent
//! through this boundary.

use super::catalog::CutSpec;
use super::error::PublishError;
use super::types::DbType;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Registration capability exposed by the serving layer.
pub trait ServingRegistry: Send + Sync {
    /// Binds `target_path` to the concrete database at `db_path`.
    fn register_database_for_serving(
        &self,
        target_path: &str,
        db_type: DbType,
        db_path: &str,
    ) -> Result<(), PublishError>;

    /// Removes the binding for `target_path`; unknown paths are a no-op.
    fn unregister_database_for_serving(&self, target_path: &str) -> Result<(), PublishError>;

    /// Drops every registration (readers, unpackers).
    fn reset(&self) -> Result<(), PublishError>;

    /// Installs the dynamic cut specifications.
    fn init_cut_specs(&self, cut_specs: &[CutSpec]) -> Result<(), PublishError>;
}

/// A registered serving binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingBinding {
    pub db_type: DbType,
    pub db_path: String,
}

/// In-process serving registry.
#[derive(Default)]
pub struct LocalServingRegistry {
    bindings: RwLock<HashMap<String, ServingBinding>>,
    cut_specs: RwLock<Vec<CutSpec>>,
}

impl LocalServingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current binding for a target path.
    pub fn binding(&self, target_path: &str) -> Option<ServingBinding> {
        self.bindings.read().unwrap().get(target_path).cloned()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.read().unwrap().len()
    }

    pub fn cut_spec_count(&self) -> usize {
        self.cut_specs.read().unwrap().len()
    }
}

impl ServingRegistry for LocalServingRegistry {
    fn register_database_for_serving(
        &self,
        target_path: &str,
        db_type: DbType,
        db_path: &str,
    ) -> Result<(), PublishError> {
        debug!(path = target_path, db = db_path, "registering for serving");
        self.bindings.write().unwrap().insert(
            target_path.to_string(),
            ServingBinding {
                db_type,
                db_path: db_path.to_string(),
            },
        );
        Ok(())
    }

    fn unregister_database_for_serving(&self, target_path: &str) -> Result<(), PublishError> {
        debug!(path = target_path, "unregistering from serving");
        self.bindings.write().unwrap().remove(target_path);
        Ok(())
    }

    fn reset(&self) -> Result<(), PublishError> {
        self.bindings.write().unwrap().clear();
        Ok(())
    }

    fn init_cut_specs(&self, cut_specs: &[CutSpec]) -> Result<(), PublishError> {
        *self.cut_specs.write().unwrap() = cut_specs.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let registry = LocalServingRegistry::new();
        registry
            .register_database_for_serving("/sf", DbType::Glb, "/globes/sf.glb")
            .unwrap();
        assert_eq!(
            registry.binding("/sf"),
            Some(ServingBinding {
                db_type: DbType::Glb,
                db_path: "/globes/sf.glb".to_string()
            })
        );

        registry.unregister_database_for_serving("/sf").unwrap();
        assert!(registry.binding("/sf").is_none());

        // Unknown target unregistration is a no-op.
        registry.unregister_database_for_serving("/unknown").unwrap();
    }

    #[test]
    fn test_reset_clears_bindings() {
        let registry = LocalServingRegistry::new();
        registry
            .register_database_for_serving("/a", DbType::Glm, "/globes/a.glm")
            .unwrap();
        registry
            .register_database_for_serving("/b", DbType::Glc, "/globes/b.glc")
            .unwrap();
        assert_eq!(registry.binding_count(), 2);

        registry.reset().unwrap();
        assert_eq!(registry.binding_count(), 0);
    }
}
