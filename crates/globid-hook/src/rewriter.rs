use std::sync::Arc;

use globid_sql::{Major, NodeId, NodeType, StatementTree};
use globid_store::{CounterKey, IdCache};

use crate::{GlobalIdConfig, RewriteError, SkipReason, TableRef};

type RewriteResult<T> = Result<T, RewriteError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// At least one row received an id; `ids` lists them in row order.
    Applied { target: TableRef, ids: Vec<u64> },
    Declined {
        reason: SkipReason,
        target: Option<TableRef>,
    },
}

enum RowUpdate {
    Applied(u64),
    Skipped,
}

/// Places cache-issued global ids into `INSERT` statements of configured
/// tables.
///
/// The rewrite runs on a copy of the tree and is committed only when at
/// least one row was updated, so declined and failed statements leave the
/// caller's tree exactly as it was.
pub struct GlobalIdRewriter {
    cache: Arc<IdCache>,
    columns: Arc<GlobalIdConfig>,
}

impl GlobalIdRewriter {
    pub fn new(cache: Arc<IdCache>, columns: Arc<GlobalIdConfig>) -> Self {
        Self { cache, columns }
    }

    pub fn cache(&self) -> &IdCache {
        &self.cache
    }

    pub fn rewrite(
        &self,
        tree: &mut StatementTree,
        root: NodeId,
        default_schema: &str,
    ) -> RewriteResult<Rewrite> {
        let Some(stmt) = tree.find_type(root, NodeType::INSERT) else {
            return Ok(declined(SkipReason::NotInsert));
        };
        let Some(values) = tree.find_type(stmt, NodeType::VALUE_LIST) else {
            log::debug!("insert...select is not supported");
            return Ok(declined(SkipReason::InsertSelect));
        };
        let Some(format) = tree.find_type(stmt, NodeType::FORMAT_LIST) else {
            log::debug!("insert without a column list is not supported");
            return Ok(declined(SkipReason::MissingFormatList));
        };

        let mut work = tree.clone();
        let rewrite = self.rewrite_insert(&mut work, stmt, format, values, default_schema)?;
        if matches!(rewrite, Rewrite::Applied { .. }) {
            *tree = work;
        }
        Ok(rewrite)
    }

    fn rewrite_insert(
        &self,
        tree: &mut StatementTree,
        stmt: NodeId,
        format: NodeId,
        values: NodeId,
        default_schema: &str,
    ) -> RewriteResult<Rewrite> {
        tree.eliminate_wrapper_lists(stmt)?;
        tree.eliminate_wrapper_lists(values)?;

        let target = target_table(tree, stmt, default_schema)?;
        let Some(column) = self.columns.column(&target.schema, &target.table) else {
            log::warn!("no global id column configured for table {target}");
            return Err(RewriteError::ConfigurationMissing {
                schema: target.schema,
                table: target.table,
            });
        };
        let key = CounterKey::new(&target.schema, &target.table, column);
        let rows = value_rows(tree, values)?;

        let ids = match column_position(tree, format, column)? {
            Some(position) => {
                let mut ids = Vec::with_capacity(rows.len());
                for row in rows {
                    match self.overwrite_value(tree, row, position, &key)? {
                        RowUpdate::Applied(id) => ids.push(id),
                        RowUpdate::Skipped => {}
                    }
                }
                ids
            }
            None => self.append_column(tree, format, &rows, column, &key)?,
        };

        if ids.is_empty() {
            return Ok(Rewrite::Declined {
                reason: SkipReason::Placeholder,
                target: Some(target),
            });
        }
        Ok(Rewrite::Applied { target, ids })
    }

    fn overwrite_value(
        &self,
        tree: &mut StatementTree,
        row: NodeId,
        position: usize,
        key: &CounterKey,
    ) -> RewriteResult<RowUpdate> {
        let cells = tree.children(row);
        let Some(&cell) = cells.get(position) else {
            log::error!(
                "invalid global column position {position}, value list size {}",
                cells.len()
            );
            return Err(RewriteError::Structural(format!(
                "global id column at position {position} but value row has {} entries",
                cells.len()
            )));
        };
        if tree.ty(cell) == Some(NodeType::PLACEHOLDER) {
            log::debug!("place-holder global id column is not supported, row left as is");
            return Ok(RowUpdate::Skipped);
        }

        let id = self.cache.fetch_and_add(key.as_bytes())?;
        log::debug!("changing global id column to {id}");
        tree.set_name(cell, id.to_string())?;
        Ok(RowUpdate::Applied(id))
    }

    fn append_column(
        &self,
        tree: &mut StatementTree,
        format: NodeId,
        rows: &[NodeId],
        column: &str,
        key: &CounterKey,
    ) -> RewriteResult<Vec<u64>> {
        let width = tree.children(format).len();
        for &row in rows {
            let len = tree.children(row).len();
            if len != width {
                return Err(RewriteError::Structural(format!(
                    "value row has {len} entries for {width} columns"
                )));
            }
        }

        log::debug!("adding global id column {column}");
        let col = tree.create_node(column, NodeType::COLUMN);
        tree.attach(format, col)?;

        let mut ids = Vec::with_capacity(rows.len());
        for &row in rows {
            let id = self.cache.fetch_and_add(key.as_bytes())?;
            let value = tree.create_node(id.to_string(), NodeType::INTEGER);
            tree.attach(row, value)?;
            ids.push(id);
        }
        Ok(ids)
    }
}

fn declined(reason: SkipReason) -> Rewrite {
    Rewrite::Declined {
        reason,
        target: None,
    }
}

/// Reads `table` or `schema.table` from the first element of the statement.
fn target_table(
    tree: &StatementTree,
    stmt: NodeId,
    default_schema: &str,
) -> RewriteResult<TableRef> {
    let target = tree
        .children(stmt)
        .first()
        .copied()
        .filter(|&id| tree.ty(id).is_some_and(|ty| ty.major == Major::Endpoint))
        .ok_or_else(|| RewriteError::Structural("insert has no target table".into()))?;
    let name = tree.name(target).unwrap_or_default().to_string();
    match tree.children(target).first() {
        None => Ok(TableRef {
            schema: default_schema.to_string(),
            table: name,
        }),
        Some(&table) => Ok(TableRef {
            schema: name,
            table: tree.name(table).unwrap_or_default().to_string(),
        }),
    }
}

/// Rows to update: the value list itself for a single-row insert, otherwise
/// each of its value-row sublists.
fn value_rows(tree: &StatementTree, values: NodeId) -> RewriteResult<Vec<NodeId>> {
    let children = tree.children(values);
    match children.first() {
        Some(&first) if tree.ty(first) == Some(NodeType::VALUE_ROW) => {
            if let Some(&stray) = children
                .iter()
                .find(|&&id| tree.ty(id) != Some(NodeType::VALUE_ROW))
            {
                return Err(RewriteError::Structural(format!(
                    "value list mixes rows with a bare {} node",
                    tree.ty(stray).map(|ty| ty.to_string()).unwrap_or_default()
                )));
            }
            Ok(children.to_vec())
        }
        _ => Ok(vec![values]),
    }
}

fn column_position(
    tree: &StatementTree,
    format: NodeId,
    column: &str,
) -> RewriteResult<Option<usize>> {
    let Some(found) = tree.find_name(format, column) else {
        return Ok(None);
    };
    let (parent, position) = tree.parent_position(found).map_err(|err| {
        log::error!("fatal: found no position in parent for column {column}");
        RewriteError::from(err)
    })?;
    if parent != format {
        return Err(RewriteError::Structural(format!(
            "column {column} is not a direct element of the column list"
        )));
    }
    Ok(Some(position))
}
