//! Fuzz target for access policy evaluation.
//!
//! Run with: cargo +nightly fuzz run fuzz_policy_eval
//!
//! Splits the input into a namespace and a module identifier and checks that
//! evaluation never panics and agrees with `is_allowed`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use modscout_config::policy::AccessPolicy;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let split = (data[0] as usize % (data.len() - 1)) + 1;
    let namespace = String::from_utf8_lossy(&data[1..split]);
    let module_id = String::from_utf8_lossy(&data[split..]);

    let policy = AccessPolicy::new(["terraform-ibm-modules", "my-org"], ["my-org/legacy/ibm"]);

    let decision = policy.evaluate(&namespace, &module_id);
    assert_eq!(decision.is_allowed(), policy.is_allowed(&namespace, &module_id));
});
