use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use globid_sql::StatementTree;
use parking_lot::RwLock;

use crate::{HookOutcome, HookParams, RegistryError, StatementHook};

/// Hooks available to statement pipelines, keyed by name.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, Arc<dyn StatementHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static HookRegistry {
        static REGISTRY: OnceLock<HookRegistry> = OnceLock::new();
        REGISTRY.get_or_init(HookRegistry::new)
    }

    pub fn register(&self, hook: Arc<dyn StatementHook>) -> Result<(), RegistryError> {
        let name = hook.name().to_string();
        let mut hooks = self.hooks.write();
        if hooks.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        log::info!("registered statement hook {name}");
        hooks.insert(name, hook);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn StatementHook>> {
        self.hooks.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StatementHook>> {
        self.hooks.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hooks.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Ordered hooks applied to every statement of a pipeline.
pub struct HookPipeline {
    hooks: Vec<Arc<dyn StatementHook>>,
}

impl HookPipeline {
    pub fn from_registry<S: AsRef<str>>(
        registry: &HookRegistry,
        names: &[S],
    ) -> Result<Self, RegistryError> {
        let hooks = names
            .iter()
            .map(|name| {
                registry
                    .get(name.as_ref())
                    .ok_or_else(|| RegistryError::Unknown(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { hooks })
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    /// Runs the hooks in order on the tree's root, stopping after the first
    /// failure.
    pub fn run(
        &self,
        tree: &mut StatementTree,
        params: &mut HookParams,
    ) -> Vec<(String, HookOutcome)> {
        let mut outcomes = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            let root = tree.root();
            let outcome = hook.run(tree, root, params);
            let failed = outcome.is_failure();
            outcomes.push((hook.name().to_string(), outcome));
            if failed {
                break;
            }
        }
        outcomes
    }
}
