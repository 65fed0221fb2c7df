//! Fuzz target for `If-Match` parsing.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_if_match -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use shopdesk_core::{IfMatch, VersionToken};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(if_match) = IfMatch::parse(s) {
        assert!(!if_match.tags().is_empty());

        // A token only satisfies a header that carries its strong tag.
        for version in [0, 1, 42, i64::MAX] {
            let token = VersionToken::from_version(version);
            if token.satisfies(&if_match) {
                assert!(if_match
                    .tags()
                    .iter()
                    .any(|tag| !tag.weak && tag.opaque == token.as_str()));
            }
        }
    }

    // Every token's own ETag is accepted.
    if let Ok(version) = s.parse::<i64>() {
        let token = VersionToken::from_version(version);
        let if_match = IfMatch::parse(&token.etag()).unwrap();
        assert!(token.satisfies(&if_match));
    }
});
