//! Serializes statement trees back into SQL text.

use crate::tree::{Major, Minor, NodeId, NodeType, StatementTree};

pub fn render(tree: &StatementTree) -> String {
    render_node(tree, tree.root())
}

fn render_node(tree: &StatementTree, id: NodeId) -> String {
    match tree.ty(id) {
        Some(NodeType::INSERT) => render_insert(tree, id),
        Some(ty) if ty.major == Major::Statement => tree.name(id).unwrap_or_default().to_string(),
        Some(NodeType::NORMAL_LIST) => flat_children(tree, id)
            .into_iter()
            .map(|child| render_node(tree, child))
            .collect::<Vec<_>>()
            .join(" "),
        Some(_) => render_value(tree, id),
        None => String::new(),
    }
}

fn render_insert(tree: &StatementTree, stmt: NodeId) -> String {
    let mut out = String::from("INSERT INTO ");
    let elements = flat_children(tree, stmt);

    if let Some(&target) = elements.iter().find(|&&id| {
        matches!(
            tree.ty(id).map(|ty| ty.minor),
            Some(Minor::Table) | Some(Minor::Schema)
        )
    }) {
        out.push_str(&render_table_ref(tree, target));
    }

    let find = |ty: NodeType| elements.iter().copied().find(|&id| tree.ty(id) == Some(ty));

    if let Some(format) = find(NodeType::FORMAT_LIST) {
        let columns: Vec<_> = flat_children(tree, format)
            .into_iter()
            .map(|col| quote_identifier(tree.name(col).unwrap_or_default()))
            .collect();
        out.push_str(" (");
        out.push_str(&columns.join(", "));
        out.push(')');
    }

    if let Some(values) = find(NodeType::VALUE_LIST) {
        let cells = flat_children(tree, values);
        let rows: Vec<String> = if cells
            .first()
            .is_some_and(|&first| tree.ty(first) == Some(NodeType::VALUE_ROW))
        {
            cells
                .iter()
                .map(|&row| render_row(tree, &flat_children(tree, row)))
                .collect()
        } else {
            vec![render_row(tree, &cells)]
        };
        out.push_str(" VALUES ");
        out.push_str(&rows.join(", "));
    } else if let Some(select) = find(NodeType::SELECT) {
        out.push(' ');
        out.push_str(tree.name(select).unwrap_or_default());
    }
    out
}

fn render_table_ref(tree: &StatementTree, id: NodeId) -> String {
    let name = quote_identifier(tree.name(id).unwrap_or_default());
    match tree.children(id).first() {
        Some(&table) => {
            let table = quote_identifier(tree.name(table).unwrap_or_default());
            format!("{name}.{table}")
        }
        None => name,
    }
}

/// Words the proxy grammar reserves; identifiers spelled like them are
/// quoted on output.
const RESERVED: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN",
    "CREATE", "CROSS", "DATABASE", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
    "EXISTS", "FALSE", "FOR", "FOREIGN", "FROM", "GROUP", "HAVING", "IGNORE", "IN", "INDEX",
    "INNER", "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL",
    "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES", "REPLACE", "RIGHT", "SCHEMA",
    "SELECT", "SET", "TABLE", "THEN", "TO", "TRUE", "UNION", "UNIQUE", "UPDATE", "USE",
    "USING", "VALUE", "VALUES", "WHEN", "WHERE", "WITH",
];

/// Returns `name` bare when it reads back as the same plain identifier,
/// otherwise wrapped in backticks.
pub fn quote_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$');
    let reserved = RESERVED.iter().any(|word| word.eq_ignore_ascii_case(name));
    if plain && !reserved {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}

fn render_row(tree: &StatementTree, cells: &[NodeId]) -> String {
    let rendered: Vec<_> = cells.iter().map(|&cell| render_value(tree, cell)).collect();
    format!("({})", rendered.join(", "))
}

fn render_value(tree: &StatementTree, id: NodeId) -> String {
    let text = tree.name(id).unwrap_or_default();
    match tree.ty(id) {
        Some(NodeType::TEXT) => format!("'{}'", text.replace('\'', "''")),
        _ => text.to_string(),
    }
}

/// Children of `id` with generic list wrappers looked through.
fn flat_children(tree: &StatementTree, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for &child in tree.children(id) {
        if tree.ty(child) == Some(NodeType::NORMAL_LIST) {
            out.extend(flat_children(tree, child));
        } else {
            out.push(child);
        }
    }
    out
}
