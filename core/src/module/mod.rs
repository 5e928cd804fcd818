//! Module runtime: registry, discovery, hot reload.

mod catalog;
mod config;
mod descriptor;
mod discovery;
mod dispatch;
mod error;
mod lifecycle;
mod loader;
mod registry;
mod traits;

pub use catalog::FactoryCatalog;
pub use config::ModuleRuntimeConfig;
pub use descriptor::{ModuleDeclaration, ModuleDescriptor};
pub use discovery::{DiscoveryReport, ModuleDiscovery};
pub use dispatch::{DispatchSurface, InMemoryDispatchSurface};
pub use error::{ModuleError, ModuleResult};
pub use lifecycle::{ModuleLifecycle, ReloadSummary};
pub use loader::{CodeUnit, ManifestLoader, ManifestUnit, StaticUnit, UnitLoader};
pub use registry::ModuleRegistry;
pub use traits::{ConstructorArgs, ConstructorKwargs, FnFactory, Module, ModuleFactory};

use std::sync::Arc;

/// Registry, discovery and lifecycle wired to one dispatch surface and loader.
pub struct ModuleRuntime {
    pub registry: Arc<ModuleRegistry>,
    pub discovery: ModuleDiscovery,
    pub lifecycle: ModuleLifecycle,
}

impl ModuleRuntime {
    pub fn new(surface: Arc<dyn DispatchSurface>, loader: Arc<dyn UnitLoader>) -> Self {
        let registry = Arc::new(ModuleRegistry::new(surface));
        Self {
            discovery: ModuleDiscovery::new(registry.clone(), loader),
            lifecycle: ModuleLifecycle::new(registry.clone()),
            registry,
        }
    }

    /// Runtime reading manifest units with the configured suffix.
    pub fn with_manifests(
        surface: Arc<dyn DispatchSurface>,
        catalog: Arc<FactoryCatalog>,
        config: &ModuleRuntimeConfig,
    ) -> Self {
        let loader = ManifestLoader::with_suffix(catalog, config.unit_suffix.clone());
        Self::new(surface, Arc::new(loader))
    }
}
