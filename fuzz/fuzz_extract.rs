//! Fuzz target for signature extraction and type erasure.
//!
//! Run with: cargo +nightly fuzz run fuzz_extract
//!
//! Feeds arbitrary text to the extractor and the type eraser. Neither may
//! panic, and erasure must keep the line count of its input.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(descriptors) = funclab_core::extract(source, "fuzz.ts") {
        for d in &descriptors {
            assert!(d.span.start_line <= d.span.end_line);
            let _ = funclab_core::locate(&descriptors, &d.name);
        }
    }

    let erased = funclab_core::strip_types(source);
    assert_eq!(erased.lines().count(), source.lines().count());
});
