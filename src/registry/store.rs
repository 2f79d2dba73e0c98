use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A stored value and the version it was written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Key-value metadata storage with optimistic concurrency.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>>;

    /// Unconditional write; last writer wins. Returns the new version.
    async fn save(&self, key: &str, value: String) -> Result<u64>;

    /// Write only if the stored version is still `expected` (`None` means
    /// the key must not exist yet). Returns whether the write happened.
    async fn compare_and_swap(&self, key: &str, expected: Option<u64>, value: String)
        -> Result<bool>;
}

/// Process-local metadata store.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    entries: Arc<Mutex<HashMap<String, Versioned<String>>>>,
    forced_conflicts: Arc<Mutex<usize>>,
    cas_count: Arc<Mutex<usize>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` compare-and-swap calls as if another writer
    /// got there first.
    pub fn with_conflicts(self, count: usize) -> Self {
        *self.forced_conflicts.lock().unwrap_or_else(|e| e.into_inner()) = count;
        self
    }

    pub fn get_cas_count(&self) -> usize {
        *self.cas_count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: String) -> Result<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let version = entries.get(key).map(|v| v.version + 1).unwrap_or(1);
        entries.insert(key.to_string(), Versioned { value, version });
        Ok(version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<bool> {
        *self.cas_count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        {
            let mut forced = self
                .forced_conflicts
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *forced > 0 {
                *forced -= 1;
                return Ok(false);
            }
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let current = entries.get(key).map(|v| v.version);
        if current != expected {
            return Ok(false);
        }
        let version = current.map(|v| v + 1).unwrap_or(1);
        entries.insert(key.to_string(), Versioned { value, version });
        Ok(true)
    }
}
