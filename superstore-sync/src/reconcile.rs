//! Applying external change notifications to the in-memory mapping.
//!
//! Reconciliation is a plain function over the mapping and one event, so it
//! can be exercised without any notification source.

use std::collections::HashMap;

use superstore_core::{codec, ChangeEvent, ChangeKind, DecodeError, Value};

/// Apply one change event to `entries`.
///
/// - cleared area: every entry is dropped
/// - removed key: the entry is dropped
/// - updated key: the new text is decoded and overwrites the entry
///
/// When the new text is not valid JSON the existing entry is dropped rather
/// than left stale, and the decode error is returned. A later read of the
/// key goes back to the store and reports the same error there.
pub fn reconcile(
    entries: &mut HashMap<String, Value>,
    event: &ChangeEvent,
) -> Result<ChangeKind, DecodeError> {
    match (&event.key, &event.new_value) {
        (None, _) => {
            entries.clear();
            Ok(ChangeKind::Cleared)
        }
        (Some(key), None) => {
            entries.remove(key);
            Ok(ChangeKind::Removed)
        }
        (Some(key), Some(raw)) => match codec::decode(key, raw) {
            Ok(value) => {
                entries.insert(key.clone(), value);
                Ok(ChangeKind::Updated)
            }
            Err(e) => {
                entries.remove(key);
                Err(e)
            }
        },
    }
}
