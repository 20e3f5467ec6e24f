//! Shared proptest generators.

use auth_common::SubjectInfo;
use proptest::prelude::*;
use std::time::Duration;

/// Generate subject identifiers across the full `u64` range.
pub fn subject_id_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0_u64), Just(u64::MAX), 1..=1_000_000_u64, any::<u64>()]
}

/// Generate plausible email addresses.
pub fn email_strategy() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9._]{0,15}", "[a-z]{2,10}", "[a-z]{2,4}")
        .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
}

/// Generate role names.
pub fn role_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("user".to_string()),
        Just("admin".to_string()),
        "[a-z][a-z_-]{2,20}",
    ]
}

/// Generate subjects, including non-ASCII email and role text.
pub fn subject_strategy() -> impl Strategy<Value = SubjectInfo> {
    (
        subject_id_strategy(),
        prop_oneof![4 => email_strategy(), 1 => "\\PC{1,24}"],
        prop_oneof![4 => role_strategy(), 1 => "\\PC{1,12}"],
    )
        .prop_map(|(id, email, role)| SubjectInfo::new(id, email, role))
}

/// Generate access token lifetimes between one minute and one day.
pub fn access_ttl_strategy() -> impl Strategy<Value = Duration> {
    (60_u64..=86_400).prop_map(Duration::from_secs)
}

/// Generate key identifiers.
pub fn key_id_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,32}"
}
