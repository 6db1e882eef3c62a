//! Generic statement tree used by the proxy's rewrite hooks, plus a small
//! parser and renderer for the statement shapes those hooks inspect.

use thiserror::Error;

pub mod parser;
pub mod render;
pub mod tree;

pub use parser::parse_statement;
pub use render::{quote_identifier, render};
pub use tree::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error: {0}")]
pub struct ParseError(pub String);
