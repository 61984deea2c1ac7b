//! Fuzz target for the standalone coercer.
//!
//! Run with: cargo +nightly fuzz run fuzz_coerce
//!
//! The first byte picks a declared type; the rest is the raw text.

#![no_main]

use libfuzzer_sys::fuzz_target;

const DECLARED: [&str; 6] = ["any", "number", "string", "Date", "Record<string, number>", "() => void"];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(raw) = std::str::from_utf8(rest) else {
        return;
    };

    let declared = DECLARED[selector as usize % DECLARED.len()];
    let value = funclab_core::coerce(raw, declared);
    let _ = value.to_source();
    let _ = value.to_json();
});
