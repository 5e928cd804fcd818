use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use super::error::{ModuleError, ModuleResult};
use super::loader::CodeUnit;
use super::traits::{ConstructorArgs, ConstructorKwargs, ModuleFactory};

fn default_dispatch() -> bool {
    true
}

/// What a unit's entry point returns for each module it provides:
/// `(type, dispatch, *args, **kwargs)`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ModuleDeclaration {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "dispatch", default = "default_dispatch")]
    pub participates_in_dispatch: bool,
    #[serde(default)]
    pub args: ConstructorArgs,
    #[serde(default)]
    pub kwargs: ConstructorKwargs,
}

impl ModuleDeclaration {
    pub fn new(type_name: impl Into<String>, participates_in_dispatch: bool) -> Self {
        Self {
            type_name: type_name.into(),
            participates_in_dispatch,
            args: Vec::new(),
            kwargs: ConstructorKwargs::new(),
        }
    }

    pub fn with_args(mut self, args: ConstructorArgs) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }
}

/// Registry entry: identity plus the recipe to rebuild the module.
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub source_unit: Arc<dyn CodeUnit>,
    pub participates_in_dispatch: bool,
    pub constructor_args: ConstructorArgs,
    pub constructor_kwargs: ConstructorKwargs,
}

impl ModuleDescriptor {
    /// The module name is the declared type name.
    pub fn from_declaration(unit: Arc<dyn CodeUnit>, decl: ModuleDeclaration) -> Self {
        Self {
            name: decl.type_name,
            source_unit: unit,
            participates_in_dispatch: decl.participates_in_dispatch,
            constructor_args: decl.args,
            constructor_kwargs: decl.kwargs,
        }
    }

    /// Look up the constructible type in the owning unit.
    pub fn factory(&self) -> ModuleResult<Arc<dyn ModuleFactory>> {
        self.source_unit
            .resolve(&self.name)
            .ok_or_else(|| ModuleError::InvalidModule(self.name.clone()))
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("source_unit", &self.source_unit.unit_name())
            .field("participates_in_dispatch", &self.participates_in_dispatch)
            .field("constructor_args", &self.constructor_args)
            .field("constructor_kwargs", &self.constructor_kwargs)
            .finish()
    }
}
