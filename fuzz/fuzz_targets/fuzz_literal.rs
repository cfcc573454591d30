//! Fuzz target: the printed-literal parser.
//!
//! Arbitrary input must either parse into a value or fail with a typed
//! error — never panic, never loop. Valid values must re-parse after
//! quoting where a quoted form exists.
//!
//! cargo fuzz run fuzz_literal

#![no_main]

use libfuzzer_sys::fuzz_target;
use replfs::literal::{Value, parse, quote_bytes, quote_str};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    match parse(text) {
        Ok(Value::Str(s)) => {
            assert_eq!(parse(&quote_str(&s)).unwrap(), Value::Str(s));
        }
        Ok(Value::Bytes(b)) => {
            assert_eq!(parse(&quote_bytes(&b)).unwrap(), Value::Bytes(b));
        }
        Ok(_) | Err(_) => {}
    }
});
