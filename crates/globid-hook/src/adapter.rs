use std::sync::Arc;

use globid_sql::{NodeId, StatementTree};

use crate::{
    GlobalIdRewriter, HookOutcome, HookParams, HookRegistry, RegistryError, Rewrite,
    StatementHook,
};

/// Registry name of the global-id hook.
pub const GLOBAL_ID_HOOK: &str = "glob_id";

pub struct GlobalIdHook {
    rewriter: GlobalIdRewriter,
}

impl GlobalIdHook {
    pub fn new(rewriter: GlobalIdRewriter) -> Self {
        Self { rewriter }
    }

    pub fn rewriter(&self) -> &GlobalIdRewriter {
        &self.rewriter
    }
}

impl StatementHook for GlobalIdHook {
    fn name(&self) -> &str {
        GLOBAL_ID_HOOK
    }

    fn run(
        &self,
        tree: &mut StatementTree,
        root: NodeId,
        params: &mut HookParams,
    ) -> HookOutcome {
        match self.rewriter.rewrite(tree, root, &params.default_schema) {
            Ok(Rewrite::Applied { target, ids }) => {
                log::debug!("assigned global ids {ids:?} to {target}");
                params.target = Some(target);
                HookOutcome::Applied
            }
            Ok(Rewrite::Declined { reason, target }) => {
                params.target = target;
                HookOutcome::Skipped(reason)
            }
            Err(err) => {
                log::error!("global id hook failed: {err}");
                params.target = None;
                HookOutcome::Failed(err)
            }
        }
    }
}

pub fn register_global_id_hook(
    registry: &HookRegistry,
    rewriter: GlobalIdRewriter,
) -> Result<Arc<GlobalIdHook>, RegistryError> {
    let hook = Arc::new(GlobalIdHook::new(rewriter));
    registry.register(hook.clone())?;
    Ok(hook)
}
