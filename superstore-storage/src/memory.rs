//! In-memory persistent store.
//!
//! Behaves like a browser storage area: keys enumerate in a stable (sorted)
//! order, an optional quota rejects writes that would push usage over the
//! limit, and the absent-key removal quirk can be switched on to reproduce
//! stores that raise instead of no-op.

use std::collections::BTreeMap;
use std::sync::RwLock;

use superstore_core::{StoreError, StoreResult};

use crate::traits::PersistentStore;

/// Usage of one entry, counted in UTF-16 code units like browser quotas.
fn entry_units(key: &str, value: &str) -> usize {
    key.encode_utf16().count() + value.encode_utf16().count()
}

/// In-memory store protected by an `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    quota: Option<usize>,
    absent_removal_quirk: bool,
}

impl MemoryStore {
    /// Create an empty store with no quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit total usage (keys plus values, UTF-16 units).
    ///
    /// A quota of zero rejects every write, the way private-mode storage
    /// does in some browsers.
    pub fn with_quota(mut self, limit: usize) -> Self {
        self.quota = Some(limit);
        self
    }

    /// Make `remove` of an absent key fail with `AbsentKeyRemoval`.
    pub fn with_absent_removal_quirk(mut self) -> Self {
        self.absent_removal_quirk = true;
        self
    }

    pub fn quota(&self) -> Option<usize> {
        self.quota
    }

    /// Current usage in UTF-16 units.
    pub fn usage(&self) -> StoreResult<usize> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.iter().map(|(k, v)| entry_units(k, v)).sum())
    }
}

impl PersistentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;

        if let Some(limit) = self.quota {
            let current: usize = entries.iter().map(|(k, v)| entry_units(k, v)).sum();
            let replaced = entries.get(key).map(|old| entry_units(key, old)).unwrap_or(0);
            let requested = current - replaced + entry_units(key, value);
            if requested > limit {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        if entries.remove(key).is_none() && self.absent_removal_quirk {
            return Err(StoreError::AbsentKeyRemoval {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.len())
    }

    fn key_at(&self, index: usize) -> StoreResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.keys().nth(index).cloned())
    }

    fn clear_all(&self) -> StoreResult<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}
