//! Storage area shared by several execution contexts.
//!
//! A [`StorageArea`] pairs one persistent store with one change feed. Each
//! context attaches to get its own [`ContextStore`] (a view of the shared
//! store that announces its mutations) and a [`Subscription`] to the
//! mutations of every other context.
//!
//! Only effective mutations are announced: rewriting a key with the same
//! text, removing an absent key, or clearing an empty area publishes
//! nothing.

use std::sync::Arc;

use superstore_core::{ChangeEvent, ContextId, StoreResult, SyncConfig};

use crate::feed::{ChangeFeed, Subscription};
use crate::traits::PersistentStore;

/// A persistent store plus the feed its contexts talk over.
#[derive(Clone)]
pub struct StorageArea {
    store: Arc<dyn PersistentStore>,
    feed: ChangeFeed,
}

impl StorageArea {
    pub fn new(store: Arc<dyn PersistentStore>, feed_capacity: usize) -> Self {
        Self {
            store,
            feed: ChangeFeed::new(feed_capacity),
        }
    }

    pub fn with_config(store: Arc<dyn PersistentStore>, config: &SyncConfig) -> Self {
        Self::new(store, config.feed_capacity)
    }

    /// The shared store, bypassing change announcements.
    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Attach a new context.
    pub fn attach(&self) -> (ContextStore, Subscription) {
        let context = ContextId::new();
        let subscription = self.feed.subscribe(context);
        let store = ContextStore {
            context,
            store: Arc::clone(&self.store),
            feed: self.feed.clone(),
        };
        tracing::debug!(context = %context, store = self.store.name(), "Context attached");
        (store, subscription)
    }
}

/// One context's view of a storage area.
pub struct ContextStore {
    context: ContextId,
    store: Arc<dyn PersistentStore>,
    feed: ChangeFeed,
}

impl ContextStore {
    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl PersistentStore for ContextStore {
    fn name(&self) -> &str {
        self.store.name()
    }

    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        self.store.read(key)
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        let old_value = self.store.read(key)?;
        self.store.write(key, value)?;
        if old_value.as_deref() != Some(value) {
            self.feed
                .publish(ChangeEvent::updated(self.context, key, old_value, value));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let old_value = self.store.read(key)?;
        self.store.remove(key)?;
        if old_value.is_some() {
            self.feed
                .publish(ChangeEvent::removed(self.context, key, old_value));
        }
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        self.store.len()
    }

    fn key_at(&self, index: usize) -> StoreResult<Option<String>> {
        self.store.key_at(index)
    }

    fn clear_all(&self) -> StoreResult<()> {
        let was_empty = self.store.is_empty()?;
        self.store.clear_all()?;
        if !was_empty {
            self.feed.publish(ChangeEvent::cleared(self.context));
        }
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.store.keys()
    }
}
