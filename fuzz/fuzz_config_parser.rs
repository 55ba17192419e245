//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text to `AppConfig::parse()`; parsing and validation must
//! reject bad input with an error, never a panic. Accepted configs must also
//! yield a policy without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(config) = modscout_config::AppConfig::parse(s)
    {
        let _ = config.build_access_policy();
    }
});
