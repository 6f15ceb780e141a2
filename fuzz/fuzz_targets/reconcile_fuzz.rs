//! Fuzz test for change notification reconciliation
//!
//! Arbitrary notification payloads must never panic, and a rejected
//! payload must leave its key absent from memory.
//!
//! Run with: cargo +nightly fuzz run reconcile_fuzz -- -max_total_time=60

#![no_main]

use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;
use serde_json::json;
use superstore_core::{ChangeEvent, ContextId};
use superstore_sync::reconcile;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let (key, raw) = input.split_once('\n').unwrap_or(("fuzz", input));

    let mut entries = HashMap::new();
    entries.insert(key.to_string(), json!("stale"));
    entries.insert("bystander".to_string(), json!(1));

    let event = ChangeEvent::updated(ContextId::new(), key, None, raw);
    match reconcile(&mut entries, &event) {
        Ok(_) => assert!(entries.contains_key(key)),
        Err(_) => assert!(!entries.contains_key(key)),
    }
    if key != "bystander" {
        assert_eq!(entries.get("bystander"), Some(&json!(1)));
    }
});
