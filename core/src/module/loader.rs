//! Uniform loading of plugin code units.
//!
//! A unit exposes an entry point ([`CodeUnit::describe`]) listing the modules
//! it provides and resolves type names to factories. [`ManifestLoader`] reads
//! units from `*.module.toml` manifests whose `[[module]]` tables are the entry
//! point; types resolve against a shared [`FactoryCatalog`].
//!
//! ```toml
//! [[module]]
//! type = "Phrases"
//! dispatch = true
//! args = ["phrases.json"]
//! [module.kwargs]
//! volume = 0.5
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::catalog::FactoryCatalog;
use super::descriptor::ModuleDeclaration;
use super::error::{ModuleError, ModuleResult};
use super::traits::ModuleFactory;

/// A loaded unit of module code.
#[async_trait]
pub trait CodeUnit: Send + Sync {
    fn unit_name(&self) -> &str;

    /// Entry point. Must yield at least one declaration.
    fn describe(&self) -> ModuleResult<Vec<ModuleDeclaration>>;

    /// Constructible type provided by this unit, if any.
    fn resolve(&self, type_name: &str) -> Option<Arc<dyn ModuleFactory>>;

    /// Reimport. `self` stays valid whatever the outcome.
    async fn reload(&self) -> ModuleResult<Arc<dyn CodeUnit>>;
}

/// Turns files on disk into [`CodeUnit`]s.
#[async_trait]
pub trait UnitLoader: Send + Sync {
    /// File name suffix of loadable units.
    fn suffix(&self) -> &str;

    async fn load(&self, path: &Path) -> ModuleResult<Arc<dyn CodeUnit>>;

    /// Returns `false` when `dir` was already on the search path.
    async fn add_search_path(&self, dir: &Path) -> bool;

    async fn search_paths(&self) -> Vec<PathBuf>;

    /// Find `{unit_name}{suffix}` on the search path.
    async fn locate(&self, unit_name: &str) -> Option<PathBuf> {
        let file = format!("{}{}", unit_name, self.suffix());
        for dir in self.search_paths().await {
            let candidate = dir.join(&file);
            if tokio::fs::metadata(&candidate)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return Some(candidate);
            }
        }
        None
    }
}

/// On-disk manifest layout. A missing `module` key means no entry point.
#[derive(Debug, Deserialize)]
struct ModuleManifest {
    #[serde(default)]
    module: Option<Vec<ModuleDeclaration>>,
}

/// Unit backed by a manifest file.
pub struct ManifestUnit {
    name: String,
    path: PathBuf,
    declarations: Option<Vec<ModuleDeclaration>>,
    catalog: Arc<FactoryCatalog>,
}

impl ManifestUnit {
    async fn read(path: &Path, name: String, catalog: Arc<FactoryCatalog>) -> ModuleResult<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ModuleError::Discovery {
                unit: name.clone(),
                reason: format!("read {}: {}", path.display(), e),
            })?;
        let manifest: ModuleManifest =
            toml::from_str(&contents).map_err(|e| ModuleError::Discovery {
                unit: name.clone(),
                reason: format!("parse {}: {}", path.display(), e),
            })?;
        Ok(Self {
            name,
            path: path.to_path_buf(),
            declarations: manifest.module,
            catalog,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn declares(&self, type_name: &str) -> bool {
        self.declarations
            .as_ref()
            .map(|d| d.iter().any(|m| m.type_name == type_name))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CodeUnit for ManifestUnit {
    fn unit_name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> ModuleResult<Vec<ModuleDeclaration>> {
        match &self.declarations {
            None => Err(ModuleError::Discovery {
                unit: self.name.clone(),
                reason: "no [[module]] entry point".into(),
            }),
            Some(d) if d.is_empty() => Err(ModuleError::Discovery {
                unit: self.name.clone(),
                reason: "entry point returned no modules; needs a type at minimum".into(),
            }),
            Some(d) => Ok(d.clone()),
        }
    }

    fn resolve(&self, type_name: &str) -> Option<Arc<dyn ModuleFactory>> {
        if !self.declares(type_name) {
            return None;
        }
        self.catalog.resolve(type_name)
    }

    async fn reload(&self) -> ModuleResult<Arc<dyn CodeUnit>> {
        debug!(target: "module_loader", unit = %self.name, path = %self.path.display(), "Reimporting unit");
        let unit = ManifestUnit::read(&self.path, self.name.clone(), self.catalog.clone())
            .await
            .map_err(|e| ModuleError::ReloadFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(unit))
    }
}

/// Loads `*.module.toml` units against a factory catalog.
pub struct ManifestLoader {
    catalog: Arc<FactoryCatalog>,
    suffix: String,
    search_paths: RwLock<Vec<PathBuf>>,
}

impl ManifestLoader {
    pub const DEFAULT_SUFFIX: &'static str = ".module.toml";

    pub fn new(catalog: Arc<FactoryCatalog>) -> Self {
        Self::with_suffix(catalog, Self::DEFAULT_SUFFIX)
    }

    pub fn with_suffix(catalog: Arc<FactoryCatalog>, suffix: impl Into<String>) -> Self {
        Self {
            catalog,
            suffix: suffix.into(),
            search_paths: RwLock::new(Vec::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<FactoryCatalog> {
        &self.catalog
    }

    fn unit_name_for(&self, path: &Path) -> String {
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        file.strip_suffix(&self.suffix)
            .map(str::to_string)
            .unwrap_or(file)
    }
}

#[async_trait]
impl UnitLoader for ManifestLoader {
    fn suffix(&self) -> &str {
        &self.suffix
    }

    async fn load(&self, path: &Path) -> ModuleResult<Arc<dyn CodeUnit>> {
        let name = self.unit_name_for(path);
        let unit = ManifestUnit::read(path, name, self.catalog.clone()).await?;
        Ok(Arc::new(unit))
    }

    async fn add_search_path(&self, dir: &Path) -> bool {
        let mut paths = self.search_paths.write().await;
        if paths.iter().any(|p| p == dir) {
            return false;
        }
        info!(target: "module_loader", dir = %dir.display(), "Added module search path");
        paths.push(dir.to_path_buf());
        true
    }

    async fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.read().await.clone()
    }
}

/// Unit for modules the host registers directly from compiled-in types.
#[derive(Clone)]
pub struct StaticUnit {
    name: String,
    declarations: Vec<ModuleDeclaration>,
    catalog: Arc<FactoryCatalog>,
}

impl StaticUnit {
    pub fn new(
        name: impl Into<String>,
        declarations: Vec<ModuleDeclaration>,
        catalog: Arc<FactoryCatalog>,
    ) -> Self {
        Self {
            name: name.into(),
            declarations,
            catalog,
        }
    }
}

#[async_trait]
impl CodeUnit for StaticUnit {
    fn unit_name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> ModuleResult<Vec<ModuleDeclaration>> {
        if self.declarations.is_empty() {
            return Err(ModuleError::Discovery {
                unit: self.name.clone(),
                reason: "no modules declared".into(),
            });
        }
        Ok(self.declarations.clone())
    }

    fn resolve(&self, type_name: &str) -> Option<Arc<dyn ModuleFactory>> {
        if !self.declarations.iter().any(|d| d.type_name == type_name) {
            return None;
        }
        self.catalog.resolve(type_name)
    }

    async fn reload(&self) -> ModuleResult<Arc<dyn CodeUnit>> {
        // Types are re-resolved against the catalog on every lookup.
        Ok(Arc::new(self.clone()))
    }
}
