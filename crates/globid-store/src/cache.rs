use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{CounterStore, LogStore, Result, StoreError, StoreOptions};

const LOCK_STRIPES: usize = 64;
const COUNTER_WIDTH: usize = std::mem::size_of::<u64>();

/// Issues strictly increasing integers per key, persisted in a
/// [`CounterStore`].
///
/// Calls on the same key serialize on one lock stripe, so for a fixed key
/// the returned values are `1, 2, 3, ...` in lock acquisition order. Distinct
/// keys only contend when they hash to the same stripe.
pub struct IdCache {
    store: Arc<dyn CounterStore>,
    stripes: Box<[Mutex<()>]>,
}

impl IdCache {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let store = LogStore::open(path.as_ref(), options)?;
        log::info!("id cache {} init ok", path.as_ref().display());
        Ok(Self::with_store(Arc::new(store)))
    }

    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        let stripes = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Self { store, stripes }
    }

    /// Reads the counter for `key` (absent means 0), persists the
    /// incremented value and returns it.
    ///
    /// When the store rejects the write the error is returned and the stored
    /// counter keeps its previous value.
    pub fn fetch_and_add(&self, key: &[u8]) -> Result<u64> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let _guard = self.stripe(key).lock();
        let current = self.read_counter(key)?;
        let next = current.checked_add(1).ok_or(StoreError::Exhausted)?;
        self.store
            .insert(key.to_vec(), next.to_le_bytes().to_vec())?;
        Ok(next)
    }

    /// Current counter value without issuing an id.
    pub fn peek(&self, key: &[u8]) -> Result<u64> {
        let _guard = self.stripe(key).lock();
        self.read_counter(key)
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    fn stripe(&self, key: &[u8]) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64> {
        match self.store.fetch(key)? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; COUNTER_WIDTH] =
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| StoreError::CorruptValue {
                            key: String::from_utf8_lossy(key).into_owned(),
                            len: bytes.len(),
                        })?;
                Ok(u64::from_le_bytes(raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[test]
    fn first_issue_is_one() -> Result<()> {
        let cache = IdCache::with_store(Arc::new(MemoryStore::new()));
        assert_eq!(cache.peek(b"fresh")?, 0);
        assert_eq!(cache.fetch_and_add(b"fresh")?, 1);
        assert_eq!(cache.peek(b"fresh")?, 1);
        Ok(())
    }

    #[test]
    fn keys_count_independently() -> Result<()> {
        let cache = IdCache::with_store(Arc::new(MemoryStore::new()));
        assert_eq!(cache.fetch_and_add(b"a")?, 1);
        assert_eq!(cache.fetch_and_add(b"a")?, 2);
        assert_eq!(cache.fetch_and_add(b"b")?, 1);
        assert_eq!(cache.fetch_and_add(b"a")?, 3);
        Ok(())
    }

    #[test]
    fn empty_key_is_rejected() {
        let cache = IdCache::with_store(Arc::new(MemoryStore::new()));
        assert!(matches!(cache.fetch_and_add(b""), Err(StoreError::EmptyKey)));
    }

    #[test]
    fn wrong_width_value_is_corrupt() {
        let store = Arc::new(MemoryStore::new());
        store.insert(b"k".to_vec(), b"42".to_vec()).unwrap();
        let cache = IdCache::with_store(store);
        assert!(matches!(
            cache.fetch_and_add(b"k"),
            Err(StoreError::CorruptValue { len: 2, .. })
        ));
    }

    #[test]
    fn counter_at_max_is_exhausted() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(b"k".to_vec(), u64::MAX.to_le_bytes().to_vec())
            .unwrap();
        let cache = IdCache::with_store(store);
        assert!(matches!(cache.fetch_and_add(b"k"), Err(StoreError::Exhausted)));
    }
}
