//! Persistent counter storage and the fetch-and-add id cache built on it.

use thiserror::Error;

pub mod cache;
pub mod key;
pub mod log_store;
pub mod memory;

pub use cache::*;
pub use key::*;
pub use log_store::*;
pub use memory::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),
    #[error("counter for key {key:?} has invalid width {len}, expected 8 bytes")]
    CorruptValue { key: String, len: usize },
    #[error("counter key must not be empty")]
    EmptyKey,
    #[error("counter exhausted")]
    Exhausted,
    #[error("counter store is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Black-box key/value engine backing the id cache.
///
/// `insert` has overwrite semantics. Implementations must make an insert
/// either fully visible to later `fetch` calls or not at all.
pub trait CounterStore: Send + Sync {
    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn insert(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
