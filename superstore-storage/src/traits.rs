//! Persistent store trait.
//!
//! Mirrors the shape of a Web Storage area: string keys, string values,
//! index-based enumeration, and a rejected write when the quota is spent.

use std::sync::Arc;

use superstore_core::StoreResult;

/// Persistent key-value store the cache mirrors into.
///
/// # Implementation Requirements
///
/// - `write` must either fully apply or fail; on quota exhaustion it returns
///   `StoreError::QuotaExceeded` and leaves the previous value in place
/// - `remove` of an absent key should succeed; stores that cannot help it
///   must return `StoreError::AbsentKeyRemoval` and nothing else
/// - `key_at` enumerates in a stable order between mutations
/// - Implementations must be `Send + Sync`; contexts share one store
pub trait PersistentStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Read the raw string stored under `key`.
    fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`.
    fn write(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Number of stored keys.
    fn len(&self) -> StoreResult<usize>;

    /// Key at `index` in enumeration order.
    fn key_at(&self, index: usize) -> StoreResult<Option<String>>;

    /// Remove every key.
    fn clear_all(&self) -> StoreResult<()>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of all keys.
    ///
    /// The snapshot is taken before the caller mutates anything, so removing
    /// keys while walking it cannot skip entries the way index-based
    /// enumeration would.
    fn keys(&self) -> StoreResult<Vec<String>> {
        let len = self.len()?;
        let mut keys = Vec::with_capacity(len);
        for index in 0..len {
            if let Some(key) = self.key_at(index)? {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Snapshot of keys starting with `prefix` (byte-wise, position 0).
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

impl<S: PersistentStore + ?Sized> PersistentStore for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        (**self).remove(key)
    }

    fn len(&self) -> StoreResult<usize> {
        (**self).len()
    }

    fn key_at(&self, index: usize) -> StoreResult<Option<String>> {
        (**self).key_at(index)
    }

    fn clear_all(&self) -> StoreResult<()> {
        (**self).clear_all()
    }

    fn is_empty(&self) -> StoreResult<bool> {
        (**self).is_empty()
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        (**self).keys()
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }
}
