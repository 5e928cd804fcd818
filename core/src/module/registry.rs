use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::descriptor::{ModuleDeclaration, ModuleDescriptor};
use super::dispatch::DispatchSurface;
use super::error::{ModuleError, ModuleResult};
use super::loader::CodeUnit;
use super::traits::{Module, ModuleFactory};

/// Insertion-ordered entries. Order matters: later modules may expect
/// earlier ones to be attached already.
#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) order: Vec<String>,
    pub(crate) entries: HashMap<String, ModuleDescriptor>,
}

impl RegistryState {
    fn upsert(&mut self, descriptor: ModuleDescriptor) {
        if !self.entries.contains_key(&descriptor.name) {
            self.order.push(descriptor.name.clone());
        }
        self.entries.insert(descriptor.name.clone(), descriptor);
    }
}

/// Known modules and their construction recipes.
///
/// Registration and reloads share one lock, so nobody observes a module that
/// has been detached but not yet re-attached.
pub struct ModuleRegistry {
    state: Mutex<RegistryState>,
    surface: Arc<dyn DispatchSurface>,
}

impl ModuleRegistry {
    pub fn new(surface: Arc<dyn DispatchSurface>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            surface,
        }
    }

    pub fn surface(&self) -> &Arc<dyn DispatchSurface> {
        &self.surface
    }

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// Register (or replace) a module.
    ///
    /// Dispatch modules are constructed and attached unless an instance with
    /// the same name is already attached. Construction happens before the
    /// entry is published.
    #[tracing::instrument(skip(self, descriptor), fields(module = %descriptor.name))]
    pub async fn register(&self, descriptor: ModuleDescriptor) -> ModuleResult<()> {
        let mut state = self.state.lock().await;
        let factory = descriptor.factory()?;

        let instance = if descriptor.participates_in_dispatch
            && self.surface.get(&descriptor.name).is_none()
        {
            Some(construct(&descriptor, factory.as_ref())?)
        } else {
            None
        };

        let name = descriptor.name.clone();
        let replaced = state.entries.contains_key(&name);
        state.upsert(descriptor);
        if let Some(instance) = instance {
            self.surface.attach(&name, instance);
            debug!(target: "module_registry", module = %name, "Attached to dispatch surface");
        }
        info!(target: "module_registry", module = %name, replaced, "Registered module");
        Ok(())
    }

    /// Build the descriptor from a unit's declaration and register it.
    pub async fn register_declaration(
        &self,
        unit: Arc<dyn CodeUnit>,
        declaration: ModuleDeclaration,
    ) -> ModuleResult<String> {
        let descriptor = ModuleDescriptor::from_declaration(unit, declaration);
        let name = descriptor.name.clone();
        self.register(descriptor).await?;
        Ok(name)
    }

    pub async fn get(&self, name: &str) -> Option<ModuleDescriptor> {
        self.state.lock().await.entries.get(name).cloned()
    }

    /// Names in registration order.
    pub async fn names(&self) -> Vec<String> {
        self.state.lock().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Attached instance for `name`, waiting out any in-flight reload.
    pub async fn instance(&self, name: &str) -> Option<Arc<dyn Module>> {
        let _state = self.state.lock().await;
        self.surface.get(name)
    }

    /// Attached instance answering `command`, waiting out any in-flight reload.
    ///
    /// When several modules answer the same word, the earliest registered wins.
    pub async fn find_command(&self, command: &str) -> Option<Arc<dyn Module>> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|name| self.surface.get(name))
            .find(|module| module.commands().iter().any(|c| c == command))
    }
}

pub(crate) fn construct(
    descriptor: &ModuleDescriptor,
    factory: &dyn ModuleFactory,
) -> ModuleResult<Arc<dyn Module>> {
    factory
        .construct(&descriptor.constructor_args, &descriptor.constructor_kwargs)
        .map_err(|e| match e {
            ModuleError::Construction { .. } => e,
            other => ModuleError::Construction {
                name: descriptor.name.clone(),
                reason: other.to_string(),
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::catalog::FactoryCatalog;
    use crate::module::dispatch::InMemoryDispatchSurface;
    use crate::module::loader::StaticUnit;
    use crate::module::traits::FnFactory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named(String);

    #[async_trait]
    impl Module for Named {
        fn name(&self) -> &str {
            &self.0
        }

        fn commands(&self) -> Vec<String> {
            vec!["say".to_string(), self.0.to_lowercase()]
        }
    }

    fn setup(types: &[&str]) -> (Arc<FactoryCatalog>, Arc<InMemoryDispatchSurface>, ModuleRegistry, Arc<AtomicUsize>) {
        let catalog = Arc::new(FactoryCatalog::new());
        let built = Arc::new(AtomicUsize::new(0));
        for t in types {
            let name = t.to_string();
            let counter = built.clone();
            catalog.install(Arc::new(FnFactory::new(*t, move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Named(name.clone())) as Arc<dyn Module>)
            })));
        }
        let surface = Arc::new(InMemoryDispatchSurface::new());
        let registry = ModuleRegistry::new(surface.clone());
        (catalog, surface, registry, built)
    }

    fn unit(catalog: &Arc<FactoryCatalog>, decls: Vec<ModuleDeclaration>) -> Arc<dyn CodeUnit> {
        Arc::new(StaticUnit::new("builtin", decls, catalog.clone()))
    }

    #[tokio::test]
    async fn registers_and_attaches_dispatch_modules() {
        let (catalog, surface, registry, _) = setup(&["Speech"]);
        let decl = ModuleDeclaration::new("Speech", true);
        let u = unit(&catalog, vec![decl.clone()]);
        registry.register_declaration(u, decl).await.unwrap();

        assert!(surface.get("Speech").is_some());
        assert!(registry.get("Speech").await.is_some());
        assert!(registry.get("Missing").await.is_none());
    }

    #[tokio::test]
    async fn non_dispatch_modules_are_not_attached() {
        let (catalog, surface, registry, built) = setup(&["MessageParser"]);
        let decl = ModuleDeclaration::new("MessageParser", false);
        let u = unit(&catalog, vec![decl.clone()]);
        registry.register_declaration(u, decl).await.unwrap();

        assert!(surface.is_empty());
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_type_is_invalid() {
        let (catalog, _, registry, _) = setup(&[]);
        let decl = ModuleDeclaration::new("Ghost", true);
        let u = unit(&catalog, vec![decl.clone()]);
        let err = registry.register_declaration(u, decl).await.unwrap_err();
        assert!(matches!(err, ModuleError::InvalidModule(name) if name == "Ghost"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn re_registration_keeps_position_and_existing_instance() {
        let (catalog, _, registry, built) = setup(&["A", "B", "C"]);
        let decls: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|t| ModuleDeclaration::new(*t, true))
            .collect();
        let u = unit(&catalog, decls.clone());
        for d in &decls {
            registry.register_declaration(u.clone(), d.clone()).await.unwrap();
        }
        let replacement = decls[0].clone().with_args(vec![serde_json::json!(1)]);
        registry.register_declaration(u, replacement).await.unwrap();

        assert_eq!(registry.names().await, vec!["A", "B", "C"]);
        assert_eq!(
            registry.get("A").await.unwrap().constructor_args,
            vec![serde_json::json!(1)]
        );
        // Already attached, so no second construction.
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_construction_leaves_no_entry() {
        let catalog = Arc::new(FactoryCatalog::new());
        catalog.install(Arc::new(FnFactory::new("Broken", |_, _| {
            Err(ModuleError::Command {
                module: "Broken".into(),
                reason: "boom".into(),
            })
        })));
        let surface = Arc::new(InMemoryDispatchSurface::new());
        let registry = ModuleRegistry::new(surface.clone());
        let decl = ModuleDeclaration::new("Broken", true);
        let u = unit(&catalog, vec![decl.clone()]);

        let err = registry.register_declaration(u, decl).await.unwrap_err();
        assert!(matches!(err, ModuleError::Construction { .. }));
        assert!(registry.get("Broken").await.is_none());
        assert!(surface.is_empty());
    }

    #[tokio::test]
    async fn shared_command_resolves_to_earliest_registration() {
        // Registered out of alphabetical order on purpose.
        let names = ["Zeta", "Speech", "Alpha"];
        let (catalog, _, registry, _) = setup(&names);
        let decls: Vec<_> = names
            .iter()
            .map(|t| ModuleDeclaration::new(*t, true))
            .collect();
        let u = unit(&catalog, decls.clone());
        for d in decls {
            registry.register_declaration(u.clone(), d).await.unwrap();
        }

        for _ in 0..10 {
            let found = registry.find_command("say").await.unwrap();
            assert_eq!(found.name(), "Zeta");
        }
        assert_eq!(registry.find_command("alpha").await.unwrap().name(), "Alpha");
        assert!(registry.find_command("nope").await.is_none());
    }
}
