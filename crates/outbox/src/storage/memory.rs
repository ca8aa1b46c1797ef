//! In-memory storage implementation
//!
//! Used by tests and by hosts that don't need the queue to survive a
//! restart.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::RwLock;

use super::KeyValueStore;

/// In-memory implementation of KeyValueStore
///
/// A HashMap behind an RwLock. Also counts writes so tests can assert the
/// engine persists on every state change.
#[derive(Default)]
pub struct InMemoryKvStore {
    values: RwLock<HashMap<String, String>>,
    writes: RwLock<usize>,
}

impl InMemoryKvStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set`/`remove` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.read().map(|w| *w).unwrap_or(0)
    }

    fn bump_writes(&self) {
        if let Ok(mut writes) = self.writes.write() {
            *writes += 1;
        }
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        drop(values);

        self.bump_writes();
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        values.remove(key);
        drop(values);

        self.bump_writes();
        Ok(())
    }
}
