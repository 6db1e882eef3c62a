use std::fmt;

use globid_sql::{NodeId, StatementTree};

use crate::RewriteError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Per-statement parameters handed to every hook.
#[derive(Debug, Clone, Default)]
pub struct HookParams {
    /// Schema in effect for the session.
    pub default_schema: String,
    /// Insert target resolved by a hook, with any explicit `schema.table`
    /// qualifier applied.
    pub target: Option<TableRef>,
}

impl HookParams {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
            target: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotInsert,
    InsertSelect,
    MissingFormatList,
    /// The id slot is a bound parameter. The statement runs with whatever
    /// value the client binds; no global id is injected.
    Placeholder,
}

#[derive(Debug)]
pub enum HookOutcome {
    /// The tree was modified.
    Applied,
    /// The tree is untouched.
    Skipped(SkipReason),
    /// The tree is untouched and the statement should not run as authored.
    Failed(RewriteError),
}

impl HookOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, HookOutcome::Applied)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, HookOutcome::Failed(_))
    }
}

pub trait StatementHook: Send + Sync {
    fn name(&self) -> &str;

    fn run(
        &self,
        tree: &mut StatementTree,
        root: NodeId,
        params: &mut HookParams,
    ) -> HookOutcome;
}
