//! Statement hooks run by the proxy between parsing and execution, and the
//! global-id hook that stamps configured tables' `INSERT`s with ids issued
//! by the id cache.

pub mod adapter;
pub mod config;
pub mod error;
pub mod hook;
pub mod registry;
pub mod rewriter;

pub use adapter::*;
pub use config::*;
pub use error::*;
pub use hook::*;
pub use registry::*;
pub use rewriter::*;
