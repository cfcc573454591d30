//! Fuzz target: display escaping.
//!
//! `escaped` must round-trip through `unescape` for any input text, and
//! `unescape` must never panic on arbitrary (possibly invalid) input.
//!
//! cargo fuzz run fuzz_unescape

#![no_main]

use libfuzzer_sys::fuzz_target;
use replfs::escape::{escaped, unescape};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // inverse property on the escape side
    assert_eq!(unescape(&escaped(text)).unwrap(), text);

    // arbitrary input on the unescape side: typed error or success
    let _ = unescape(text);
});
