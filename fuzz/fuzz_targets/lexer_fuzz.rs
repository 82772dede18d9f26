//! Fuzz target for the sandboxed language's lexer.
//!
//! Run with: cargo +nightly fuzz run lexer_fuzz -- -max_total_time=60

#![no_main]

use agex_dsl::Scanner;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Tokenizing should never panic, even on malformed or adversarial
        // input — a syntax error comes back as `Err`, never a panic.
        if let Ok(tokens) = Scanner::new(input).tokenize() {
            for token in &tokens {
                assert!(token.span.start <= token.span.end, "span start should be <= end");
                assert!(token.span.line >= 1, "line numbers should be >= 1");
            }
        }
    }
});
