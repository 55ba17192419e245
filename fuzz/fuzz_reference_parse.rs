//! Fuzz target for module identifier parsing.
//!
//! Run with: cargo +nightly fuzz run fuzz_reference_parse
//!
//! Parsing must never panic, and any accepted identifier must be stable:
//! its canonical form parses back to the same reference.

#![no_main]

use libfuzzer_sys::fuzz_target;
use modscout_core::reference::{ModuleReference, normalize};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(reference) = ModuleReference::parse(input) else {
        return;
    };

    let canonical = reference.to_string();
    let reparsed = ModuleReference::parse(&canonical).expect("canonical form must parse");
    assert_eq!(reparsed, reference);
    assert_eq!(normalize(&canonical).ok(), Some(canonical));
});
