//! Synchronized cache over a persistent store.
//!
//! The cache owns a mapping from key to decoded value and mirrors every
//! mutation into the store as JSON text. Nothing is loaded eagerly: a key
//! missing from memory is read from the store on first `get`, decoded, and
//! kept.
//!
//! # Consistency
//!
//! - A store write happens before the memory update; if the store rejects
//!   it (quota or any other failure) memory is left as it was.
//! - A memory hit never re-reads the store. Only a change notification,
//!   or this cache's own `set`/`unset`/`clear`, invalidates an entry.
//! - With `drain_on_access` enabled, pending notifications are applied at
//!   the start of every operation, so an operation always observes every
//!   notification that arrived before it.
//!
//! # Memory-only fallback
//!
//! Construction writes and removes a probe key, unless that key already
//! holds a value. A quota rejection of the probe never fails construction:
//! a full store still serves reads and removals. With `memory_fallback`
//! set, `set` then keeps values in memory only; without it, each `set`
//! reports its own quota failure.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use superstore_core::{
    codec, ContextId, StoreResult, SuperstoreError, SuperstoreResult, SyncConfig, Value,
};
use superstore_storage::{PersistentStore, StorageArea, Subscription};

use crate::reconcile::reconcile;
use crate::stats::CacheStats;

/// Remove `key` from `store`, swallowing the benign absent-key failure.
fn remove_persistent(store: &dyn PersistentStore, key: &str) -> StoreResult<()> {
    match store.remove(key) {
        Err(e) if e.is_benign_removal() => {
            tracing::debug!(key = %key, store = store.name(), "Ignored absent-key removal error");
            Ok(())
        }
        other => other,
    }
}

/// Write and remove the probe key to check the store accepts writes.
///
/// An existing value under the probe key is left alone.
fn probe(store: &dyn PersistentStore, probe_key: &str) -> StoreResult<()> {
    if store.read(probe_key)?.is_some() {
        tracing::debug!(key = %probe_key, store = store.name(), "Probe key in use, skipped write probe");
        return Ok(());
    }
    store.write(probe_key, "null")?;
    remove_persistent(store, probe_key)
}

/// In-memory cache mirrored into a persistent store.
///
/// One instance per execution context. Methods take `&mut self`: the cache
/// is driven by a single context and never shared across threads.
pub struct SyncedCache {
    entries: HashMap<String, Value>,
    store: Arc<dyn PersistentStore>,
    /// False when `set` keeps values in memory only.
    write_through: bool,
    subscription: Option<Subscription>,
    config: SyncConfig,
    stats: CacheStats,
}

impl SyncedCache {
    /// Create a cache over `store`.
    ///
    /// `subscription` delivers changes made by other contexts; pass `None`
    /// when the store has no other writers.
    pub fn new(
        store: Arc<dyn PersistentStore>,
        subscription: Option<Subscription>,
        config: SyncConfig,
    ) -> SuperstoreResult<Self> {
        config.validate()?;
        let write_through = Self::probe_store(store.as_ref(), &config)?;
        Ok(Self::assemble(store, subscription, config, write_through))
    }

    /// Attach a new context to `area` and build its cache.
    ///
    /// The probe goes to the shared store directly so other contexts are
    /// not notified about it.
    pub fn attach(area: &StorageArea, config: SyncConfig) -> SuperstoreResult<Self> {
        config.validate()?;
        let write_through = Self::probe_store(area.store().as_ref(), &config)?;
        let (store, subscription) = area.attach();
        Ok(Self::assemble(
            Arc::new(store),
            Some(subscription),
            config,
            write_through,
        ))
    }

    /// Returns whether `set` should write through to the store.
    fn probe_store(store: &dyn PersistentStore, config: &SyncConfig) -> SuperstoreResult<bool> {
        match probe(store, &config.probe_key) {
            Ok(()) => Ok(true),
            Err(e) if e.is_quota_exceeded() && config.memory_fallback => {
                tracing::warn!(
                    store = store.name(),
                    error = %e,
                    "Persistent store rejected probe write, keeping writes in memory only"
                );
                Ok(false)
            }
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!(
                    store = store.name(),
                    error = %e,
                    "Persistent store is full, writes may be rejected"
                );
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn assemble(
        store: Arc<dyn PersistentStore>,
        subscription: Option<Subscription>,
        config: SyncConfig,
        write_through: bool,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            store,
            write_through,
            subscription,
            config,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// False when `set` keeps values in memory only after a failed probe.
    pub fn is_persistent(&self) -> bool {
        self.write_through
    }

    /// Context this cache listens on behalf of, while subscribed.
    pub fn context(&self) -> Option<ContextId> {
        self.subscription.as_ref().map(Subscription::context)
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read `key`, loading it from the store on first access.
    ///
    /// Returns `None` when the key is set nowhere. A persistent entry that
    /// is not valid JSON fails with a decode error and is not cached.
    pub fn get(&mut self, key: &str) -> SuperstoreResult<Option<Value>> {
        self.drain_on_access();

        if let Some(value) = self.entries.get(key) {
            self.stats.hits += 1;
            tracing::trace!(key = %key, "Cache hit");
            return Ok(Some(value.clone()));
        }
        self.stats.misses += 1;

        let Some(raw) = self.store.read(key)? else {
            return Ok(None);
        };

        let value = codec::decode(key, &raw)?;
        tracing::debug!(key = %key, "Lazily loaded entry from persistent store");
        self.stats.lazy_loads += 1;
        self.entries.insert(key.to_string(), value.clone());
        Ok(Some(value))
    }

    /// Read `key` as a concrete type.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> SuperstoreResult<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(codec::decode_as(key, &value)?)),
            None => Ok(None),
        }
    }

    /// Whether `key` is set.
    pub fn contains(&mut self, key: &str) -> SuperstoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Store `value` under `key`.
    ///
    /// The JSON text is written to the store first; memory is only updated
    /// once the write succeeded.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> SuperstoreResult<()> {
        self.drain_on_access();

        let value = codec::to_value(key, value)?;
        if self.write_through {
            let raw = codec::encode_value(key, &value)?;
            if let Err(e) = self.store.write(key, &raw) {
                if e.is_quota_exceeded() {
                    tracing::warn!(key = %key, error = %e, "Write rejected by persistent store");
                }
                return Err(e.into());
            }
        }

        self.entries.insert(key.to_string(), value);
        self.stats.writes += 1;
        Ok(())
    }

    /// Remove `key`. Removing a key that is not set is a no-op.
    pub fn unset(&mut self, key: &str) -> SuperstoreResult<()> {
        self.drain_on_access();

        remove_persistent(self.store.as_ref(), key)?;
        self.entries.remove(key);
        self.stats.removals += 1;
        Ok(())
    }

    /// Remove every key, or only the keys starting with `prefix`.
    ///
    /// Matching persistent keys are collected before anything is removed.
    /// If a removal fails midway, keys already removed from the store are
    /// also gone from memory and the error is returned.
    pub fn clear(&mut self, prefix: Option<&str>) -> SuperstoreResult<()> {
        self.drain_on_access();

        let Some(prefix) = prefix else {
            self.store.clear_all()?;
            let dropped = self.entries.len();
            self.entries.clear();
            tracing::debug!(dropped, "Cleared all entries");
            return Ok(());
        };

        let mut removed = 0u64;
        for key in self.store.keys_with_prefix(prefix)? {
            remove_persistent(self.store.as_ref(), &key)?;
            self.entries.remove(&key);
            removed += 1;
        }
        self.entries.retain(|key, _| !key.starts_with(prefix));
        self.stats.removals += removed;
        tracing::debug!(prefix = %prefix, removed, "Cleared entries by prefix");
        Ok(())
    }

    /// Apply every pending change notification.
    ///
    /// Returns how many were applied. Notifications whose value does not
    /// decode evict their key; the first such error is returned after the
    /// rest of the queue has been applied.
    pub fn sync_pending(&mut self) -> SuperstoreResult<usize> {
        let Some(subscription) = self.subscription.as_mut() else {
            return Ok(0);
        };

        let mut applied = 0;
        let mut first_error: Option<SuperstoreError> = None;
        loop {
            match subscription.try_next() {
                Ok(Some(event)) => match reconcile(&mut self.entries, &event) {
                    Ok(kind) => {
                        tracing::trace!(key = ?event.key, ?kind, origin = %event.origin, "Applied change notification");
                        self.stats.notifications_applied += 1;
                        applied += 1;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, origin = %event.origin, "Rejected change notification");
                        self.stats.notifications_rejected += 1;
                        first_error.get_or_insert(e.into());
                    }
                },
                Ok(None) => break,
                Err(lagged) => {
                    self.stats.resyncs += 1;
                    if self.write_through {
                        // Memory can no longer be trusted; every key will be
                        // read again from the store.
                        tracing::warn!(missed = lagged.missed, "Missed change notifications, dropping cached entries");
                        self.entries.clear();
                    } else {
                        // Memory holds values the store never saw.
                        tracing::warn!(missed = lagged.missed, "Missed change notifications, keeping in-memory writes");
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    /// Apply a change notification delivered by some other mechanism.
    pub fn apply_change(&mut self, event: &superstore_core::ChangeEvent) -> SuperstoreResult<()> {
        match reconcile(&mut self.entries, event) {
            Ok(_) => {
                self.stats.notifications_applied += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.notifications_rejected += 1;
                Err(e.into())
            }
        }
    }

    /// Stop receiving change notifications.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::debug!(context = %subscription.context(), "Cache detached from change feed");
        }
    }

    fn drain_on_access(&mut self) {
        if !self.config.drain_on_access {
            return;
        }
        match self.sync_pending() {
            Ok(_) => {}
            // Rejected notifications were already logged and counted.
            Err(SuperstoreError::Decode(_)) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to apply pending change notifications");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use superstore_core::{ChangeEvent, StoreError};
    use superstore_storage::{LmdbStore, MemoryStore};
    use superstore_test_utils::{init_test_logging, instrumented_memory, InstrumentedStore};
    use tempfile::TempDir;

    fn memory_cache() -> (SyncedCache, Arc<MemoryStore>) {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
        (cache, store)
    }

    fn shared_area() -> StorageArea {
        init_test_logging();
        StorageArea::new(Arc::new(MemoryStore::new()), 64)
    }

    #[test]
    fn test_unset_before_set_is_harmless() {
        let (mut cache, store) = memory_cache();
        assert!(cache.unset("keyUnset").is_ok());
        assert_eq!(store.read("keyUnset").unwrap(), None);
    }

    #[test]
    fn test_set_and_get_string() {
        let (mut cache, store) = memory_cache();
        cache.set("keyOne", "value1").unwrap();
        assert_eq!(cache.get("keyOne").unwrap(), Some(json!("value1")));
        assert_eq!(store.read("keyOne").unwrap(), Some("\"value1\"".to_string()));
    }

    #[test]
    fn test_number_round_trips_as_number() {
        let (mut cache, _store) = memory_cache();
        cache.set("keyTwo", &3884).unwrap();
        assert_eq!(cache.get("keyTwo").unwrap(), Some(json!(3884)));
        assert_eq!(cache.get("keyTwo").unwrap(), Some(json!(3884)));
    }

    #[test]
    fn test_unset_removes_everywhere() {
        let (mut cache, store) = memory_cache();
        cache.set("keyThree", "Hello").unwrap();
        cache.unset("keyThree").unwrap();
        assert_eq!(store.read("keyThree").unwrap(), None);
        assert_eq!(cache.get("keyThree").unwrap(), None);
    }

    #[test]
    fn test_get_unset_key_is_none() {
        let (mut cache, _store) = memory_cache();
        assert_eq!(cache.get("keySixth").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_objects_are_json_encoded() {
        let (mut cache, store) = memory_cache();
        cache.set("keySeventh", &json!({ "test": [1, 4, 6, 7] })).unwrap();
        assert_eq!(
            store.read("keySeventh").unwrap(),
            Some(r#"{"test":[1,4,6,7]}"#.to_string())
        );
    }

    #[test]
    fn test_clear_prefix_only_clears_namespace() {
        let (mut cache, store) = memory_cache();
        cache.set("other", "123").unwrap();
        cache.set("pref.?xKeyTenth", "A").unwrap();
        cache.set("pref.?xKeyEleventh", "B").unwrap();
        cache.clear(Some("pref.?xKey")).unwrap();

        assert_eq!(cache.get("pref.?xKeyTenth").unwrap(), None);
        assert_eq!(cache.get("pref.?xKeyEleventh").unwrap(), None);
        assert_eq!(cache.get("other").unwrap(), Some(json!("123")));

        assert_eq!(store.read("pref.?xKeyTenth").unwrap(), None);
        assert_eq!(store.read("pref.?xKeyEleventh").unwrap(), None);
        assert_eq!(store.read("other").unwrap(), Some("\"123\"".to_string()));
    }

    #[test]
    fn test_clear_prefix_reaches_keys_never_read() {
        let (mut cache, store) = memory_cache();
        store.write("ns.a", "1").unwrap();
        store.write("ns.b", "2").unwrap();
        store.write("other", "3").unwrap();

        cache.clear(Some("ns.")).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["other"]);
        assert_eq!(cache.stats().removals, 2);
    }

    #[test]
    fn test_clear_all() {
        let (mut cache, store) = memory_cache();
        cache.set("other", "123").unwrap();
        cache.set("prefixKeyTwelth", "C").unwrap();
        cache.clear(None).unwrap();

        assert_eq!(cache.get("prefixKeyTwelth").unwrap(), None);
        assert_eq!(cache.get("other").unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_external_change_notification() {
        let (mut cache, _store) = memory_cache();
        cache.set("key13", "A").unwrap();

        let event = ChangeEvent::updated(ContextId::new(), "key13", None, "\"B\"");
        cache.apply_change(&event).unwrap();

        assert_eq!(cache.get("key13").unwrap(), Some(json!("B")));
    }

    #[test]
    fn test_hit_does_not_reread_store() {
        init_test_logging();
        let store = instrumented_memory();
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();

        store.inner().write("k", "\"first\"").unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!("first")));
        let reads = store.reads();

        store.inner().write("k", "\"out of band\"").unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!("first")));
        assert_eq!(store.reads(), reads);
        assert_eq!(cache.stats().lazy_loads, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_miss_does_not_create_entry() {
        let (mut cache, _store) = memory_cache();
        assert_eq!(cache.get("absent").unwrap(), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_malformed_persistent_entry_is_decode_error() {
        let (mut cache, store) = memory_cache();
        store.write("broken", "value1").unwrap();

        let err = cache.get("broken").unwrap_err();
        assert!(matches!(err, SuperstoreError::Decode(ref e) if e.key == "broken"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_quota_failure_keeps_previous_state() {
        init_test_logging();
        let store = Arc::new(MemoryStore::new().with_quota(64));
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();

        cache.set("k", "small").unwrap();
        let err = cache.set("k", &"x".repeat(100)).unwrap_err();
        assert!(err.is_quota_exceeded());

        assert_eq!(cache.get("k").unwrap(), Some(json!("small")));
        assert_eq!(store.read("k").unwrap(), Some("\"small\"".to_string()));
        assert_eq!(cache.stats().writes, 1);
    }

    #[test]
    fn test_failed_write_of_new_key_caches_nothing() {
        init_test_logging();
        let store = instrumented_memory();
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();

        store.fail_writes_with(Some(StoreError::backend("instrumented", "disk gone")));
        assert!(cache.set("k", &1).is_err());
        store.fail_writes_with(None);

        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_unset_tolerates_absent_removal_quirk() {
        init_test_logging();
        let store = Arc::new(MemoryStore::new().with_absent_removal_quirk());
        let mut cache = SyncedCache::new(store, None, SyncConfig::default()).unwrap();

        assert!(cache.unset("keyUnset").is_ok());
        cache.set("k", &true).unwrap();
        assert!(cache.unset("k").is_ok());
        assert!(cache.unset("k").is_ok());
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_unset_propagates_other_removal_errors() {
        init_test_logging();
        let store = instrumented_memory();
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
        cache.set("k", "v").unwrap();

        store.fail_removes_after(0, StoreError::LockPoisoned);
        let err = cache.unset("k").unwrap_err();
        assert_eq!(err, SuperstoreError::Store(StoreError::LockPoisoned));

        // Memory still agrees with the store.
        assert_eq!(cache.get("k").unwrap(), Some(json!("v")));
        assert_eq!(store.inner().read("k").unwrap(), Some("\"v\"".to_string()));
    }

    #[test]
    fn test_clear_prefix_with_quirky_store() {
        init_test_logging();
        let store = Arc::new(MemoryStore::new().with_absent_removal_quirk());
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
        cache.set("p.a", &1).unwrap();
        cache.set("p.b", &2).unwrap();
        cache.set("q", &3).unwrap();

        cache.clear(Some("p.")).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["q"]);
        assert_eq!(cache.get("q").unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_clear_prefix_partial_failure_stays_consistent() {
        init_test_logging();
        let store = instrumented_memory();
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
        for key in ["p1", "p2", "p3"] {
            cache.set(key, key).unwrap();
        }

        store.fail_removes_after(1, StoreError::LockPoisoned);
        assert!(cache.clear(Some("p")).is_err());
        store.stop_failing_removes();

        for key in ["p1", "p2", "p3"] {
            let persisted = store.inner().read(key).unwrap().map(|raw| {
                serde_json::from_str::<Value>(&raw).unwrap()
            });
            assert_eq!(cache.get(key).unwrap(), persisted, "key {key}");
        }
        assert_eq!(store.inner().read("p1").unwrap(), None);
    }

    #[test]
    fn test_notification_from_other_context() {
        let area = shared_area();
        let mut tab_a = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
        let mut tab_b = SyncedCache::attach(&area, SyncConfig::default()).unwrap();

        tab_a.set("key13", "A").unwrap();
        assert_eq!(tab_b.get("key13").unwrap(), Some(json!("A")));

        tab_b.set("key13", "B").unwrap();
        assert_eq!(tab_a.get("key13").unwrap(), Some(json!("B")));

        tab_b.unset("key13").unwrap();
        assert_eq!(tab_a.get("key13").unwrap(), None);

        // Own writes never come back as notifications.
        assert_eq!(tab_b.stats().notifications_applied, 1);
    }

    #[test]
    fn test_clear_notification_empties_other_context() {
        let area = shared_area();
        let mut tab_a = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
        let mut tab_b = SyncedCache::attach(&area, SyncConfig::default()).unwrap();

        tab_b.set("x", &1).unwrap();
        tab_b.set("y", &2).unwrap();
        assert_eq!(tab_a.get("x").unwrap(), Some(json!(1)));

        tab_b.clear(None).unwrap();
        tab_a.sync_pending().unwrap();
        assert!(tab_a.is_empty());
        assert_eq!(tab_a.get("y").unwrap(), None);
    }

    #[test]
    fn test_probe_is_not_broadcast() {
        let area = shared_area();
        let mut tab_a = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
        let _tab_b = SyncedCache::attach(&area, SyncConfig::default()).unwrap();

        assert_eq!(tab_a.sync_pending().unwrap(), 0);
        assert!(area.store().is_empty().unwrap());
    }

    #[test]
    fn test_manual_sync_when_drain_disabled() {
        let area = shared_area();
        let config = SyncConfig::default().with_drain_on_access(false);
        let mut tab_a = SyncedCache::attach(&area, config.clone()).unwrap();
        let mut tab_b = SyncedCache::attach(&area, config).unwrap();

        tab_a.set("k", "A").unwrap();
        assert_eq!(tab_b.get("k").unwrap(), Some(json!("A")));

        tab_a.set("k", "B").unwrap();
        // Not applied yet: memory still answers with the old value.
        assert_eq!(tab_b.get("k").unwrap(), Some(json!("A")));
        assert_eq!(tab_b.sync_pending().unwrap(), 1);
        assert_eq!(tab_b.get("k").unwrap(), Some(json!("B")));
    }

    #[test]
    fn test_malformed_notification_is_reported_and_evicts() {
        let area = shared_area();
        let config = SyncConfig::default().with_drain_on_access(false);
        let mut tab_a = SyncedCache::attach(&area, config.clone()).unwrap();
        let (raw_tab, _raw_sub) = area.attach();

        tab_a.set("k", "A").unwrap();
        raw_tab.write("k", "{broken").unwrap();
        raw_tab.write("j", "2").unwrap();

        let err = tab_a.sync_pending().unwrap_err();
        assert!(matches!(err, SuperstoreError::Decode(_)));
        assert_eq!(tab_a.stats().notifications_rejected, 1);
        assert_eq!(tab_a.stats().notifications_applied, 1);
        assert_eq!(tab_a.get("j").unwrap(), Some(json!(2)));
        assert!(tab_a.get("k").is_err());
    }

    #[test]
    fn test_lag_drops_memory_and_rereads() {
        init_test_logging();
        let area = StorageArea::new(Arc::new(MemoryStore::new()), 2);
        let config = SyncConfig::default().with_drain_on_access(false);
        let mut tab_a = SyncedCache::attach(&area, config.clone()).unwrap();
        let mut tab_b = SyncedCache::attach(&area, config).unwrap();

        tab_a.set("k0", &0).unwrap();
        for i in 1..6 {
            tab_b.set(&format!("k{i}"), &i).unwrap();
        }
        area.store().write("k0", "100").unwrap();

        tab_a.sync_pending().unwrap();
        assert_eq!(tab_a.stats().resyncs, 1);
        assert_eq!(tab_a.get("k0").unwrap(), Some(json!(100)));
        assert_eq!(tab_a.get("k1").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_detach_stops_notifications() {
        let area = shared_area();
        let mut tab_a = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
        let mut tab_b = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
        assert!(tab_a.context().is_some());

        tab_a.set("k", "A").unwrap();
        assert_eq!(tab_b.get("k").unwrap(), Some(json!("A")));

        tab_b.detach();
        assert!(tab_b.context().is_none());
        assert_eq!(area.feed().subscriber_count(), 1);

        tab_a.set("k", "B").unwrap();
        assert_eq!(tab_b.get("k").unwrap(), Some(json!("A")));
    }

    #[test]
    fn test_memory_fallback_on_zero_quota() {
        init_test_logging();
        let store = Arc::new(MemoryStore::new().with_quota(0));
        let config = SyncConfig::default().with_memory_fallback(true);
        let mut cache = SyncedCache::new(store.clone(), None, config).unwrap();

        assert!(!cache.is_persistent());
        cache.set("k", &json!({ "a": 1 })).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!({ "a": 1 })));
        cache.clear(Some("k")).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_zero_quota_without_fallback_fails_each_set() {
        init_test_logging();
        let store = Arc::new(MemoryStore::new().with_quota(0));
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();

        assert!(cache.is_persistent());
        let err = cache.set("k", &1).unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.unset("k").is_ok());
    }

    fn full_store() -> Arc<MemoryStore> {
        init_test_logging();
        // keyOne (6) + "value1" quoted (8) fills the quota exactly.
        let store = Arc::new(MemoryStore::new().with_quota(14));
        store.write("keyOne", "\"value1\"").unwrap();
        store
    }

    #[test]
    fn test_full_store_serves_reads() {
        let store = full_store();
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();

        assert_eq!(cache.get("keyOne").unwrap(), Some(json!("value1")));
        assert!(cache.set("keyTwo", &3884).unwrap_err().is_quota_exceeded());
        assert_eq!(cache.get("keyTwo").unwrap(), None);

        cache.unset("keyOne").unwrap();
        assert_eq!(store.read("keyOne").unwrap(), None);
    }

    #[test]
    fn test_full_store_with_fallback_serves_reads() {
        let store = full_store();
        let config = SyncConfig::default().with_memory_fallback(true);
        let mut cache = SyncedCache::new(store.clone(), None, config).unwrap();

        assert!(!cache.is_persistent());
        assert_eq!(cache.get("keyOne").unwrap(), Some(json!("value1")));
        assert_eq!(cache.stats().lazy_loads, 1);

        cache.set("keyTwo", &3884).unwrap();
        assert_eq!(cache.get("keyTwo").unwrap(), Some(json!(3884)));
        assert_eq!(store.read("keyTwo").unwrap(), None);

        cache.unset("keyOne").unwrap();
        assert_eq!(store.read("keyOne").unwrap(), None);
        assert_eq!(cache.get("keyOne").unwrap(), None);
    }

    #[test]
    fn test_value_under_probe_key_survives_construction() {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        store.write("__superstore_probe__", "42").unwrap();

        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
        assert_eq!(cache.get("__superstore_probe__").unwrap(), Some(json!(42)));

        let area = StorageArea::new(store.clone(), 8);
        let mut tab = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
        assert_eq!(tab.get("__superstore_probe__").unwrap(), Some(json!(42)));
        assert_eq!(store.read("__superstore_probe__").unwrap(), Some("42".to_string()));
    }

    /// Store exposing only index-based enumeration, in insertion order.
    /// Removing a key shifts every later index down by one.
    #[derive(Default)]
    struct IndexedStore {
        entries: std::sync::Mutex<Vec<(String, String)>>,
    }

    impl PersistentStore for IndexedStore {
        fn name(&self) -> &str {
            "indexed"
        }

        fn read(&self, key: &str) -> StoreResult<Option<String>> {
            let entries = self.entries.lock().unwrap();
            Ok(entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
        }

        fn write(&self, key: &str, value: &str) -> StoreResult<()> {
            let mut entries = self.entries.lock().unwrap();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.to_string(),
                None => entries.push((key.to_string(), value.to_string())),
            }
            Ok(())
        }

        fn remove(&self, key: &str) -> StoreResult<()> {
            self.entries.lock().unwrap().retain(|(k, _)| k != key);
            Ok(())
        }

        fn len(&self) -> StoreResult<usize> {
            Ok(self.entries.lock().unwrap().len())
        }

        fn key_at(&self, index: usize) -> StoreResult<Option<String>> {
            Ok(self.entries.lock().unwrap().get(index).map(|(k, _)| k.clone()))
        }

        fn clear_all(&self) -> StoreResult<()> {
            self.entries.lock().unwrap().clear();
            Ok(())
        }
    }

    #[test]
    fn test_clear_prefix_over_shifting_enumeration() {
        init_test_logging();
        let store = Arc::new(IndexedStore::default());
        for (key, value) in [("p.a", "1"), ("p.b", "2"), ("q", "3"), ("p.c", "4")] {
            store.write(key, value).unwrap();
        }
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
        assert_eq!(cache.get("p.a").unwrap(), Some(json!(1)));

        cache.clear(Some("p.")).unwrap();

        assert_eq!(store.keys().unwrap(), vec!["q"]);
        assert_eq!(cache.get("p.a").unwrap(), None);
        assert_eq!(cache.get("q").unwrap(), Some(json!(3)));
        assert_eq!(cache.stats().removals, 3);
    }

    #[test]
    fn test_drained_decode_error_does_not_fail_operation() {
        let area = shared_area();
        let mut tab_a = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
        let (raw_tab, _raw_sub) = area.attach();

        tab_a.set("k", "A").unwrap();
        raw_tab.write("k", "{broken").unwrap();

        assert_eq!(tab_a.get("other").unwrap(), None);
        assert_eq!(tab_a.stats().notifications_rejected, 1);
        assert!(tab_a.set("k", "B").is_ok());
        assert_eq!(tab_a.get("k").unwrap(), Some(json!("B")));
    }

    #[test]
    fn test_stats_follow_reads() {
        let (mut cache, store) = memory_cache();
        store.write("a", "1").unwrap();

        assert_eq!(cache.stats().hit_rate(), 0.0);
        cache.get("a").unwrap();
        cache.get("a").unwrap();
        cache.get("a").unwrap();
        cache.get("missing").unwrap();

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.lazy_loads), (2, 2, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_config_rejected() {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let config = SyncConfig::default().with_probe_key("");
        let err = SyncedCache::new(store, None, config)
            .err()
            .expect("config should be rejected");
        assert!(matches!(err, SuperstoreError::Config(_)));
    }

    #[test]
    fn test_get_as_and_contains() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Prefs {
            theme: String,
            font_size: u8,
        }

        let (mut cache, _store) = memory_cache();
        let prefs = Prefs {
            theme: "dark".to_string(),
            font_size: 14,
        };
        cache.set("prefs", &prefs).unwrap();

        assert!(cache.contains("prefs").unwrap());
        assert!(!cache.contains("missing").unwrap());
        assert_eq!(cache.get_as::<Prefs>("prefs").unwrap(), Some(prefs));
        assert!(matches!(
            cache.get_as::<u32>("prefs").unwrap_err(),
            SuperstoreError::Decode(_)
        ));
        assert_eq!(cache.get_as::<Prefs>("missing").unwrap(), None);
    }

    #[test]
    fn test_unencodable_value_is_rejected() {
        let (mut cache, store) = memory_cache();
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON");

        let err = cache.set("bad", &map).unwrap_err();
        assert!(matches!(err, SuperstoreError::Encode(_)));
        assert_eq!(store.read("bad").unwrap(), None);
    }

    #[test]
    fn test_lmdb_backed_cache_persists() {
        init_test_logging();
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = Arc::new(LmdbStore::open(temp_dir.path(), 10).unwrap());
            let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
            cache.set("keySeventh", &json!({ "test": [1, 4, 6, 7] })).unwrap();
            cache.set("keyTwo", &3884).unwrap();
            drop(cache);
            Arc::try_unwrap(store)
                .ok()
                .expect("cache released the store")
                .close();
        }
        let store = Arc::new(LmdbStore::open(temp_dir.path(), 10).unwrap());
        let mut cache = SyncedCache::new(store, None, SyncConfig::default()).unwrap();
        assert_eq!(
            cache.get("keySeventh").unwrap(),
            Some(json!({ "test": [1, 4, 6, 7] }))
        );
        assert_eq!(cache.get("keyTwo").unwrap(), Some(json!(3884)));
    }

    #[test]
    fn test_instrumented_store_is_generic() {
        init_test_logging();
        let store = Arc::new(InstrumentedStore::new(MemoryStore::new().with_quota(1024)));
        let mut cache = SyncedCache::new(store.clone(), None, SyncConfig::default()).unwrap();
        cache.set("k", "v").unwrap();
        // probe write + the set
        assert_eq!(store.writes(), 2);
    }
}
