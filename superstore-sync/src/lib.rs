//! Superstore Sync - Synchronized Cache
//!
//! A synchronous get/set/unset/clear key-value API over a persistent store.
//! Values live decoded in memory and are mirrored into the store as JSON
//! text; change notifications from other contexts keep the memory side
//! coherent.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use superstore_core::SyncConfig;
//! use superstore_storage::{MemoryStore, StorageArea};
//! use superstore_sync::SyncedCache;
//!
//! let area = StorageArea::new(Arc::new(MemoryStore::new()), 64);
//! let mut tab_a = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
//! let mut tab_b = SyncedCache::attach(&area, SyncConfig::default()).unwrap();
//!
//! tab_a.set("keyTwo", &3884).unwrap();
//! assert_eq!(tab_b.get("keyTwo").unwrap(), Some(json!(3884)));
//!
//! tab_b.set("keyTwo", "changed").unwrap();
//! assert_eq!(tab_a.get("keyTwo").unwrap(), Some(json!("changed")));
//! ```

pub mod cache;
pub mod reconcile;
pub mod stats;

pub use cache::SyncedCache;
pub use reconcile::reconcile;
pub use stats::CacheStats;
