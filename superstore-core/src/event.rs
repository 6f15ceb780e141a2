//! Change events exchanged between execution contexts.
//!
//! A change event is what one context observes when another context mutates
//! the shared storage area. Field semantics follow Web Storage `storage`
//! events: a `None` key means the whole area was cleared and a `None` new
//! value means the key was removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one execution context attached to a storage area.
///
/// UUIDv7, so identifiers sort by attach time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a change event did to the storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A key was written.
    Updated,
    /// A key was removed.
    Removed,
    /// Every key was removed.
    Cleared,
}

/// A mutation made by some context, as seen by the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Affected key, `None` when the area was cleared.
    pub key: Option<String>,
    /// Raw JSON text before the change.
    pub old_value: Option<String>,
    /// Raw JSON text after the change, `None` when removed.
    pub new_value: Option<String>,
    /// Context that made the change.
    pub origin: ContextId,
    /// When the change was published.
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// A key was written with `new_value`.
    pub fn updated(
        origin: ContextId,
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            key: Some(key.into()),
            old_value,
            new_value: Some(new_value.into()),
            origin,
            observed_at: Utc::now(),
        }
    }

    /// A key was removed.
    pub fn removed(origin: ContextId, key: impl Into<String>, old_value: Option<String>) -> Self {
        Self {
            key: Some(key.into()),
            old_value,
            new_value: None,
            origin,
            observed_at: Utc::now(),
        }
    }

    /// The whole storage area was cleared.
    pub fn cleared(origin: ContextId) -> Self {
        Self {
            key: None,
            old_value: None,
            new_value: None,
            origin,
            observed_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.key, &self.new_value) {
            (None, _) => ChangeKind::Cleared,
            (Some(_), None) => ChangeKind::Removed,
            (Some(_), Some(_)) => ChangeKind::Updated,
        }
    }
}
