//! Builds statement trees from SQL text.
//!
//! Only `INSERT` statements are broken down into nodes. The target clause
//! (table reference and column list) and the elements of a single value row
//! are grouped under generic list nodes, the way the proxy grammar emits
//! them; multi-row inserts get one value-row list per row. Everything else
//! becomes a single opaque statement node carrying its text.

use crate::tree::{NodeId, NodeType, StatementTree};
use crate::ParseError;

type ParseResult<T> = Result<T, ParseError>;

pub fn parse_statement(sql: &str) -> ParseResult<StatementTree> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(ParseError("empty SQL statement".into()));
    }
    let trimmed = trimmed.trim_end_matches(';').trim_end();
    match strip_keyword_ci(trimmed, "INSERT") {
        Some(rest) => {
            let rest = strip_keyword_ci(rest, "INTO").unwrap_or(rest);
            parse_insert(rest)
        }
        None => Ok(StatementTree::new(trimmed, NodeType::OTHER_STATEMENT)),
    }
}

fn parse_insert(input: &str) -> ParseResult<StatementTree> {
    let mut tree = StatementTree::new("", NodeType::INSERT);
    let stmt = tree.root();
    let target = new_child(&mut tree, stmt, "", NodeType::NORMAL_LIST)?;

    let (first, rest) = parse_identifier(input)?;
    let mut rest = rest;
    match rest.strip_prefix('.') {
        Some(after_dot) => {
            let (table, after_table) = parse_identifier(after_dot)?;
            let schema = new_child(&mut tree, target, first, NodeType::SCHEMA)?;
            new_child(&mut tree, schema, table, NodeType::TABLE)?;
            rest = after_table;
        }
        None => {
            new_child(&mut tree, target, first, NodeType::TABLE)?;
        }
    }

    let mut remainder = rest.trim_start();
    if remainder.starts_with('(') {
        let (cols_raw, after_cols) = take_parenthesized(remainder)?;
        let format = new_child(&mut tree, target, "", NodeType::FORMAT_LIST)?;
        for col in split_comma(&cols_raw)? {
            let (name, trailing) = parse_identifier(&col)?;
            ensure_no_trailing_tokens(trailing)?;
            new_child(&mut tree, format, name, NodeType::COLUMN)?;
        }
        remainder = after_cols.trim_start();
    }

    if let Some(select) = strip_keyword_ci(remainder, "SELECT") {
        let text = format!("SELECT{select}");
        new_child(&mut tree, stmt, text.trim_end(), NodeType::SELECT)?;
        return Ok(tree);
    }

    let mut remainder = strip_keyword_ci(remainder, "VALUES")
        .or_else(|| strip_keyword_ci(remainder, "VALUE"))
        .ok_or_else(|| ParseError("expected keyword 'VALUES'".into()))?;
    let mut rows = Vec::new();
    loop {
        let (values_raw, rest) = take_parenthesized(remainder)?;
        rows.push(split_comma(&values_raw)?);
        remainder = rest.trim_start();
        if let Some(after_comma) = remainder.strip_prefix(',') {
            remainder = after_comma;
            continue;
        }
        ensure_no_trailing_tokens(remainder)?;
        break;
    }

    let values = new_child(&mut tree, stmt, "", NodeType::VALUE_LIST)?;
    if rows.len() == 1 {
        let row = new_child(&mut tree, values, "", NodeType::NORMAL_LIST)?;
        for token in &rows[0] {
            push_value(&mut tree, row, token)?;
        }
    } else {
        for tokens in &rows {
            let row = new_child(&mut tree, values, "", NodeType::VALUE_ROW)?;
            for token in tokens {
                push_value(&mut tree, row, token)?;
            }
        }
    }
    Ok(tree)
}

fn new_child(
    tree: &mut StatementTree,
    parent: NodeId,
    name: impl Into<String>,
    ty: NodeType,
) -> ParseResult<NodeId> {
    let id = tree.create_node(name, ty);
    tree.attach(parent, id)
        .map_err(|err| ParseError(format!("malformed tree: {err}")))?;
    Ok(id)
}

fn push_value(tree: &mut StatementTree, row: NodeId, token: &str) -> ParseResult<NodeId> {
    let (text, ty) = parse_value(token)?;
    new_child(tree, row, text, ty)
}

fn parse_value(token: &str) -> ParseResult<(String, NodeType)> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(ParseError("missing value".into()));
    }
    if trimmed == "?" {
        return Ok((trimmed.to_string(), NodeType::PLACEHOLDER));
    }
    if trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2 {
        let inner = trimmed[1..trimmed.len() - 1]
            .replace("''", "'")
            .replace("\\'", "'");
        return Ok((inner, NodeType::TEXT));
    }
    if trimmed.eq_ignore_ascii_case("null") {
        return Ok(("NULL".to_string(), NodeType::NULL));
    }
    if trimmed.parse::<i64>().is_ok() {
        return Ok((trimmed.to_string(), NodeType::INTEGER));
    }
    if trimmed.parse::<f64>().is_ok() {
        return Ok((trimmed.to_string(), NodeType::FLOAT));
    }
    Err(ParseError(format!("unable to parse literal '{trimmed}'")))
}

fn strip_keyword_ci<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = input.trim_start();
    let head = trimmed.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &trimmed[keyword.len()..];
    match rest.chars().next() {
        Some(ch) if is_identifier_part(ch) => None,
        _ => Some(rest),
    }
}

fn parse_identifier(input: &str) -> ParseResult<(String, &str)> {
    let trimmed = input.trim_start();
    if let Some(quoted) = trimmed.strip_prefix('`') {
        let end = quoted
            .find('`')
            .ok_or_else(|| ParseError("unterminated quoted identifier".into()))?;
        if end == 0 {
            return Err(ParseError("invalid identifier".into()));
        }
        return Ok((quoted[..end].to_string(), &quoted[end + 1..]));
    }
    let mut end = trimmed.len();
    for (idx, ch) in trimmed.char_indices() {
        if idx == 0 {
            if !is_identifier_start(ch) {
                return Err(ParseError("invalid identifier".into()));
            }
        } else if !is_identifier_part(ch) {
            end = idx;
            break;
        }
    }
    if end == 0 {
        return Err(ParseError("missing identifier".into()));
    }
    Ok((trimmed[..end].to_string(), &trimmed[end..]))
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

fn take_parenthesized(input: &str) -> ParseResult<(String, &str)> {
    let trimmed = input.trim_start();
    let mut chars = trimmed.char_indices();
    match chars.next() {
        Some((_, '(')) => {}
        _ => return Err(ParseError("expected '('".into())),
    }
    let mut depth = 1usize;
    let mut quote = None;
    for (idx, ch) in chars {
        match ch {
            '\'' | '`' => toggle_quote(&mut quote, ch),
            _ if quote.is_some() => {}
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((trimmed[1..idx].to_string(), &trimmed[idx + 1..]));
                }
            }
            _ => {}
        }
    }
    Err(ParseError("unclosed '('".into()))
}

/// Enters or leaves a quoted run. A quote char of the other kind inside the
/// run is literal.
fn toggle_quote(quote: &mut Option<char>, ch: char) {
    match *quote {
        None => *quote = Some(ch),
        Some(open) if open == ch => *quote = None,
        Some(_) => {}
    }
}

fn ensure_no_trailing_tokens(input: &str) -> ParseResult<()> {
    if !input.trim().is_empty() {
        return Err(ParseError("unexpected tokens after statement".into()));
    }
    Ok(())
}

fn split_comma(input: &str) -> ParseResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote = None;
    for ch in input.chars() {
        match ch {
            '\'' | '`' => {
                current.push(ch);
                toggle_quote(&mut quote, ch);
            }
            _ if quote.is_some() => current.push(ch),
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                if depth == 0 {
                    return Err(ParseError("unmatched ')'".into()));
                }
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 || quote.is_some() {
        return Err(ParseError("unterminated expression".into()));
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_string());
    }
    Ok(parts)
}
