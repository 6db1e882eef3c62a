use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{CounterStore, Result};

/// Non-durable store for tests and throwaway deployments.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryStore {
    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn insert(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.entries.write().insert(key, value);
        Ok(())
    }
}
