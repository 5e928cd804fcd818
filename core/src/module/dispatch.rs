use dashmap::DashMap;
use std::sync::Arc;

use super::traits::Module;

/// The set of live module instances eligible to handle commands.
pub trait DispatchSurface: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn Module>>;

    /// Attach under `name`, replacing any instance already there.
    fn attach(&self, name: &str, module: Arc<dyn Module>);

    fn detach(&self, name: &str) -> Option<Arc<dyn Module>>;

    fn names(&self) -> Vec<String>;
}

/// Dispatch surface kept in memory, used by the host and tests.
#[derive(Default)]
pub struct InMemoryDispatchSurface {
    modules: DashMap<String, Arc<dyn Module>>,
}

impl InMemoryDispatchSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl DispatchSurface for InMemoryDispatchSurface {
    fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).map(|m| m.clone())
    }

    fn attach(&self, name: &str, module: Arc<dyn Module>) {
        self.modules.insert(name.to_string(), module);
    }

    fn detach(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.remove(name).map(|(_, m)| m)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
