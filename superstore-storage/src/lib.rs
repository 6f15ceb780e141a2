//! Superstore Storage - Persistent Store Trait and Implementations
//!
//! Defines the persistent store abstraction the synchronized cache mirrors
//! into, plus the collaborators a storage area needs:
//!
//! - [`MemoryStore`]: in-process store with optional quota and the
//!   absent-key removal quirk, for tests and memory-backed areas
//! - [`LmdbStore`]: durable store on LMDB via heed
//! - [`ChangeFeed`] / [`Subscription`]: cross-context change notifications
//! - [`StorageArea`] / [`ContextStore`]: a store shared by several contexts,
//!   publishing every effective mutation to the others

pub mod area;
pub mod feed;
pub mod lmdb;
pub mod memory;
pub mod traits;

pub use area::{ContextStore, StorageArea};
pub use feed::{ChangeFeed, FeedLagged, Subscription};
pub use lmdb::LmdbStore;
pub use memory::MemoryStore;
pub use traits::PersistentStore;
