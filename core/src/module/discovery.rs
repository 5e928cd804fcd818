use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ModuleError, ModuleResult};
use super::loader::{CodeUnit, UnitLoader};
use super::registry::ModuleRegistry;

/// Result of a directory scan. Failures never abort the scan.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub registered: Vec<String>,
    pub failures: Vec<ModuleError>,
}

/// Finds plugin units in a directory and registers what they declare.
pub struct ModuleDiscovery {
    registry: Arc<ModuleRegistry>,
    loader: Arc<dyn UnitLoader>,
}

impl ModuleDiscovery {
    pub fn new(registry: Arc<ModuleRegistry>, loader: Arc<dyn UnitLoader>) -> Self {
        Self { registry, loader }
    }

    pub fn loader(&self) -> &Arc<dyn UnitLoader> {
        &self.loader
    }

    #[tracing::instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn discover(&self, dir: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let dir = tokio::fs::canonicalize(dir)
            .await
            .unwrap_or_else(|_| dir.to_path_buf());
        self.loader.add_search_path(&dir).await;

        let candidates = match self.candidates(&dir).await {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "module_discovery", dir = %dir.display(), error = %e, "Unable to list modules directory");
                report.failures.push(ModuleError::Discovery {
                    unit: dir.display().to_string(),
                    reason: e.to_string(),
                });
                return report;
            }
        };

        for path in candidates {
            match self.loader.load(&path).await {
                Ok(unit) => self.register_unit(unit, &mut report).await,
                Err(e) => {
                    warn!(target: "module_discovery", path = %path.display(), error = %e, "Skipping unit");
                    report.failures.push(e);
                }
            }
        }

        info!(
            target: "module_discovery",
            registered = report.registered.len(),
            failed = report.failures.len(),
            "Module discovery finished"
        );
        report
    }

    /// Load a unit by name from the search path, e.g. one dropped into the
    /// modules directory after startup.
    pub async fn load_unit(&self, unit_name: &str) -> ModuleResult<Vec<String>> {
        let path = self
            .loader
            .locate(unit_name)
            .await
            .ok_or_else(|| ModuleError::NotFound(unit_name.to_string()))?;
        let unit = self.loader.load(&path).await?;
        let mut report = DiscoveryReport::default();
        self.register_unit(unit, &mut report).await;
        match report.failures.into_iter().next() {
            Some(e) if report.registered.is_empty() => Err(e),
            _ => Ok(report.registered),
        }
    }

    async fn candidates(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let suffix = self.loader.suffix();
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let matches = entry
                .file_name()
                .to_str()
                .map(|n| n.ends_with(suffix))
                .unwrap_or(false);
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if matches && is_file {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    async fn register_unit(&self, unit: Arc<dyn CodeUnit>, report: &mut DiscoveryReport) {
        let declarations = match unit.describe() {
            Ok(d) => d,
            Err(e) => {
                warn!(target: "module_discovery", unit = %unit.unit_name(), error = %e, "Malformed entry point");
                report.failures.push(e);
                return;
            }
        };

        for declaration in declarations {
            match self
                .registry
                .register_declaration(unit.clone(), declaration)
                .await
            {
                Ok(name) => report.registered.push(name),
                Err(e) => {
                    warn!(target: "module_discovery", unit = %unit.unit_name(), error = %e, "Failed to register module");
                    report.failures.push(e);
                }
            }
        }
    }
}
