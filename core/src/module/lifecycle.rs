use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ModuleError, ModuleResult};
use super::loader::CodeUnit;
use super::registry::{construct, ModuleRegistry, RegistryState};
use super::traits::Module;

/// Outcome of [`ModuleLifecycle::reload_all`].
#[derive(Debug, Default)]
pub struct ReloadSummary {
    pub succeeded: usize,
    pub total: usize,
    pub failures: Vec<ModuleError>,
}

/// Hot reload of registered modules.
pub struct ModuleLifecycle {
    registry: Arc<ModuleRegistry>,
}

impl ModuleLifecycle {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    /// Reimport one module and, for dispatch modules, swap in a fresh instance.
    ///
    /// If anything fails after the old instance was detached, the old instance
    /// is attached again so the module keeps serving.
    #[tracing::instrument(skip(self))]
    pub async fn reload_one(&self, name: &str) -> ModuleResult<()> {
        let retired = {
            let mut state = self.registry.lock_state().await;
            self.reload_locked(&mut state, name).await?
        };
        if let Some(old) = retired {
            shut_down(name, old).await;
        }
        Ok(())
    }

    /// Reload every module in registration order, continuing past failures.
    #[tracing::instrument(skip(self))]
    pub async fn reload_all(&self) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        let mut retired = Vec::new();
        {
            let mut state = self.registry.lock_state().await;
            let names = state.order.clone();
            summary.total = names.len();

            for name in names {
                match self.reload_locked(&mut state, &name).await {
                    Ok(old) => {
                        summary.succeeded += 1;
                        retired.extend(old.map(|m| (name, m)));
                    }
                    Err(e) => summary.failures.push(e),
                }
            }
        }

        // Old instances may call back into the registry.
        for (name, old) in retired {
            shut_down(&name, old).await;
        }

        info!(target: "module_lifecycle", "Loaded {}/{} modules", summary.succeeded, summary.total);
        summary
    }

    /// Swap one module while `state` is held. Returns the replaced instance,
    /// which the caller shuts down after releasing the lock.
    async fn reload_locked(
        &self,
        state: &mut RegistryState,
        name: &str,
    ) -> ModuleResult<Option<Arc<dyn Module>>> {
        let descriptor = state
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        let surface = self.registry.surface();

        let detached = if descriptor.participates_in_dispatch {
            surface.detach(name)
        } else {
            None
        };

        let rebuilt: ModuleResult<(Arc<dyn CodeUnit>, Option<Arc<dyn Module>>)> = async {
            let unit = descriptor.source_unit.reload().await.map_err(|e| match e {
                ModuleError::ReloadFailed { .. } => e,
                other => ModuleError::ReloadFailed {
                    name: name.to_string(),
                    reason: other.to_string(),
                },
            })?;
            let factory = unit
                .resolve(&descriptor.name)
                .ok_or_else(|| ModuleError::ReloadFailed {
                    name: name.to_string(),
                    reason: format!("unit '{}' no longer provides the type", unit.unit_name()),
                })?;
            let instance = if descriptor.participates_in_dispatch {
                let instance = construct(&descriptor, factory.as_ref()).map_err(|e| {
                    ModuleError::ReloadFailed {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Some(instance)
            } else {
                None
            };
            Ok((unit, instance))
        }
        .await;

        match rebuilt {
            Ok((unit, instance)) => {
                if let Some(entry) = state.entries.get_mut(name) {
                    entry.source_unit = unit;
                }
                if let Some(instance) = instance {
                    surface.attach(name, instance);
                }
                info!(target: "module_lifecycle", module = %name, "Reloaded module");
                Ok(detached)
            }
            Err(e) => {
                if let Some(old) = detached {
                    surface.attach(name, old);
                    warn!(target: "module_lifecycle", module = %name, "Restored previous instance after failed reload");
                }
                warn!(target: "module_lifecycle", module = %name, error = %e, "Error reloading module");
                Err(e)
            }
        }
    }
}

async fn shut_down(name: &str, old: Arc<dyn Module>) {
    if let Err(e) = old.shutdown().await {
        warn!(target: "module_lifecycle", module = %name, error = %e, "Old instance failed to shut down");
    }
}
