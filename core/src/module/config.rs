use std::path::PathBuf;

use super::loader::ManifestLoader;

/// Where discovery looks for units and what they are called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRuntimeConfig {
    pub modules_dir: PathBuf,
    pub unit_suffix: String,
}

impl Default for ModuleRuntimeConfig {
    fn default() -> Self {
        Self {
            modules_dir: std::env::var("ORATOR_MODULES_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("modules")),
            unit_suffix: ManifestLoader::DEFAULT_SUFFIX.to_string(),
        }
    }
}
