/*!
Key-value stores for snapshot persistence.

This module defines the storage contract (port) the persistence adapter
consumes, plus two implementations (adapters). The adapter never assumes a
backing technology: anything that can read, write and remove a string by
key will do.
*/

pub mod file;

use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub use file::FileStore;

/// Minimal durable string store.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Returns
    /// `Ok(None)` when nothing is stored under the key
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// After an error the previous value must still be readable; a write is
    /// never observed half-done.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`; removing a missing key succeeds
    fn remove(&self, key: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Memory-based store
///
/// Values live in a shared `HashMap`; clones see the same data, so a test
/// can keep a handle while the adapter owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();

        assert_eq!(store.read("tabs").unwrap(), None);

        store.write("tabs", "[]").unwrap();
        assert_eq!(store.read("tabs").unwrap().as_deref(), Some("[]"));

        store.write("tabs", "[1]").unwrap();
        assert_eq!(store.read("tabs").unwrap().as_deref(), Some("[1]"));

        store.remove("tabs").unwrap();
        assert_eq!(store.read("tabs").unwrap(), None);
        assert!(store.remove("tabs").is_ok());
    }

    #[test]
    fn test_memory_store_clones_share_data() {
        let store = MemoryStore::new();
        let handle = store.clone();

        store.write("b", "2").unwrap();
        store.write("a", "1").unwrap();

        assert_eq!(handle.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(handle.len(), 2);
    }

    #[test]
    fn test_shared_pointer_stores_delegate() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.write("k", "v").unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some("v"));

        let boxed: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        assert_eq!(boxed.read("k").unwrap(), None);
    }
}
