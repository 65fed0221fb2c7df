//! Fuzz target for tenant id parsing.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_tenant_id -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use shopdesk_tenant::{parse_tenant_id, TenantSignalSource};
use uuid::Uuid;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    for source in [
        TenantSignalSource::Header,
        TenantSignalSource::Claim,
        TenantSignalSource::Subdomain,
    ] {
        if let Ok(tenant_id) = parse_tenant_id(source, s) {
            // Accepted ids are never nil and survive a round trip.
            assert!(!tenant_id.is_nil());
            assert_eq!(Uuid::parse_str(s.trim()).ok(), Some(*tenant_id.as_uuid()));
            let again = parse_tenant_id(source, &tenant_id.to_string()).unwrap();
            assert_eq!(again, tenant_id);
        }
    }
});
