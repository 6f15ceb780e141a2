//! Superstore Test Utilities
//!
//! Centralized test infrastructure for the superstore workspace:
//! - Proptest generators for keys, prefixes and JSON values
//! - An instrumented store that counts calls and injects failures
//! - Test logging setup

// Re-export core types for convenience
pub use superstore_core::{
    ChangeEvent, ChangeKind, ContextId, StoreError, StoreResult, SuperstoreError, SyncConfig,
    Value,
};
pub use superstore_storage::{MemoryStore, PersistentStore, StorageArea};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Install a fmt subscriber filtered by `RUST_LOG` that writes through the
/// test harness. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// INSTRUMENTED STORE
// ============================================================================

/// Store wrapper that counts calls and injects failures.
///
/// Counting reads is how tests observe that a cache hit never touched the
/// persistent store.
pub struct InstrumentedStore<S: PersistentStore = MemoryStore> {
    inner: S,
    reads: AtomicUsize,
    writes: AtomicUsize,
    removes: AtomicUsize,
    write_failure: Mutex<Option<StoreError>>,
    remove_failure: Mutex<Option<(usize, StoreError)>>,
}

impl InstrumentedStore<MemoryStore> {
    /// Instrument a fresh, unlimited memory store.
    pub fn memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: PersistentStore> InstrumentedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            write_failure: Mutex::new(None),
            remove_failure: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Fail every write with `err` until cleared with `None`.
    pub fn fail_writes_with(&self, err: Option<StoreError>) {
        *self.write_failure.lock().unwrap() = err;
    }

    /// Let `successes` more removals through, then fail every removal with `err`.
    pub fn fail_removes_after(&self, successes: usize, err: StoreError) {
        *self.remove_failure.lock().unwrap() = Some((successes, err));
    }

    pub fn stop_failing_removes(&self) {
        *self.remove_failure.lock().unwrap() = None;
    }
}

impl<S: PersistentStore> PersistentStore for InstrumentedStore<S> {
    fn name(&self) -> &str {
        "instrumented"
    }

    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.write_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.inner.write(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        let mut failure = self.remove_failure.lock().unwrap();
        if let Some((successes, err)) = failure.as_mut() {
            if *successes == 0 {
                return Err(err.clone());
            }
            *successes -= 1;
        }
        drop(failure);
        self.inner.remove(key)
    }

    fn len(&self) -> StoreResult<usize> {
        self.inner.len()
    }

    fn key_at(&self, index: usize) -> StoreResult<Option<String>> {
        self.inner.key_at(index)
    }

    fn clear_all(&self) -> StoreResult<()> {
        self.inner.clear_all()
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys()
    }
}

/// Shorthand for an instrumented memory store behind an `Arc`.
pub fn instrumented_memory() -> Arc<InstrumentedStore> {
    Arc::new(InstrumentedStore::memory())
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Number};

    /// Keys drawn from a small alphabet so prefixes collide often.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-d.?]{1,6}"
    }

    /// Prefixes over the same alphabet, including the empty prefix.
    pub fn arb_prefix() -> impl Strategy<Value = String> {
        "[a-d.?]{0,3}"
    }

    /// JSON leaves whose text form decodes back to an equal value.
    pub fn arb_json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| Value::Number(n.into())),
            any::<u32>().prop_map(|n| Value::Number(Number::from(n))),
            (-1_000_000i32..1_000_000i32)
                .prop_map(|n| serde_json::json!(f64::from(n) / 8.0)),
            ".{0,12}".prop_map(Value::String),
        ]
    }

    /// Arbitrary nested JSON values.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        arb_json_leaf().prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{0,6}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
            ]
        })
    }

    /// Distinct keys with values.
    pub fn arb_entries() -> impl Strategy<Value = Vec<(String, Value)>> {
        prop::collection::btree_map(arb_key(), arb_json_value(), 0..12)
            .prop_map(|m| m.into_iter().collect())
    }
}
