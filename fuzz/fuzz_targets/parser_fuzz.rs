//! Fuzz target for the sandboxed language's parser.
//!
//! Run with: cargo +nightly fuzz run parser_fuzz -- -max_total_time=60

#![no_main]

use agex_dsl::{parse, Scanner};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let Ok(tokens) = Scanner::new(input).tokenize() else {
            return;
        };
        // Parsing an arbitrary token stream should never panic — only
        // produce a `Module` or a syntax `EvalError`.
        match parse(tokens) {
            Ok(module) => {
                let _ = module.body.len();
            }
            Err(err) => {
                let _ = err.to_string();
            }
        }
    }
});
