use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::error::ModuleResult;

/// Positional construction values, replayed verbatim on reload.
pub type ConstructorArgs = Vec<Value>;
/// Named construction values, replayed verbatim on reload.
pub type ConstructorKwargs = Map<String, Value>;

/// A live module instance, possibly attached to the dispatch surface.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Command words this module answers.
    fn commands(&self) -> Vec<String> {
        Vec::new()
    }

    /// Handle one command. `Ok(None)` means nothing to reply.
    async fn handle(&self, _command: &str, _input: &str) -> ModuleResult<Option<String>> {
        Ok(None)
    }

    /// Called once the instance has been replaced on the dispatch surface.
    async fn shutdown(&self) -> ModuleResult<()> {
        Ok(())
    }
}

/// A constructible module type (the "class" a unit exposes).
pub trait ModuleFactory: Send + Sync {
    fn type_name(&self) -> &str;

    fn construct(
        &self,
        args: &[Value],
        kwargs: &ConstructorKwargs,
    ) -> ModuleResult<Arc<dyn Module>>;
}

/// Factory backed by a closure.
pub struct FnFactory<F> {
    type_name: String,
    build: F,
}

impl<F> FnFactory<F>
where
    F: Fn(&[Value], &ConstructorKwargs) -> ModuleResult<Arc<dyn Module>> + Send + Sync,
{
    pub fn new(type_name: impl Into<String>, build: F) -> Self {
        Self {
            type_name: type_name.into(),
            build,
        }
    }
}

impl<F> ModuleFactory for FnFactory<F>
where
    F: Fn(&[Value], &ConstructorKwargs) -> ModuleResult<Arc<dyn Module>> + Send + Sync,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn construct(
        &self,
        args: &[Value],
        kwargs: &ConstructorKwargs,
    ) -> ModuleResult<Arc<dyn Module>> {
        (self.build)(args, kwargs)
    }
}
