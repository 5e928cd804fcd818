use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::traits::ModuleFactory;

/// Compiled-in module types, by type name.
///
/// Installing a factory under an existing name replaces it; the next reload of
/// any module of that type picks up the new version.
#[derive(Default)]
pub struct FactoryCatalog {
    factories: DashMap<String, Arc<dyn ModuleFactory>>,
}

impl FactoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, factory: Arc<dyn ModuleFactory>) {
        let name = factory.type_name().to_string();
        info!(target: "module_catalog", module_type = %name, "Installing module type");
        self.factories.insert(name, factory);
    }

    pub fn resolve(&self, type_name: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.get(type_name).map(|f| f.clone())
    }

    pub fn remove(&self, type_name: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.remove(type_name).map(|(_, f)| f)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
