//! Fuzz test for the persistent value codec
//!
//! Arbitrary stored text must either decode or produce a `DecodeError`
//! naming the key; decoded values must re-encode to text that decodes
//! again.
//!
//! Run with: cargo +nightly fuzz run decode_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use superstore_core::codec;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        match codec::decode("fuzz", raw) {
            Ok(value) => {
                let text = codec::encode_value("fuzz", &value).expect("decoded values re-encode");
                codec::decode("fuzz", &text).expect("encoded text decodes");
            }
            Err(err) => {
                assert_eq!(err.key, "fuzz");
                assert!(!err.reason.is_empty(), "Error reason should not be empty");
            }
        }
    }
});
