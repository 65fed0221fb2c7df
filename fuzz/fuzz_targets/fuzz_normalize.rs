//! Fuzz target for response envelope normalization.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_normalize -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use shopdesk_core::{is_enveloped, normalize, PageParams};

fuzz_target!(|input: (u16, u8, u8, &[u8])| {
    let (status, page, page_size, raw) = input;
    let Ok(body) = serde_json::from_slice::<Value>(raw) else {
        return;
    };
    let status = 200 + status % 400;
    let params = PageParams::new(Some(i64::from(page)), Some(i64::from(page_size)));

    let once = normalize(status, body, &params, Some("req-1"));
    assert!(is_enveloped(&once));

    // Normalizing an envelope again changes nothing.
    let twice = normalize(status, once.clone(), &params, Some("req-2"));
    assert_eq!(once, twice);
});
