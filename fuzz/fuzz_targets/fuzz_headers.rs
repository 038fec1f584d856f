//! Fuzz testing for header and window parsing.
//!
//! Every function here sees attacker-controlled input on every request (or
//! operator input at startup) and must never panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the header fuzz target
//! cargo +nightly fuzz run fuzz_headers
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_headers -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `RlWindow::parse`: window strings such as `10s`, `1h`, `2d`
//! - `normalize_ip`: IPv6 / port / bracket stripping
//! - `extract_client_ip` and `fingerprint`: full header resolution
//! - `request_timeout`: `X-Request-Timeout` parsing

#![no_main]

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use libfuzzer_sys::fuzz_target;
use request_pipeline::fingerprint::fingerprint;
use request_pipeline::middleware::{extract_client_ip, normalize_ip, request_timeout};
use request_pipeline::rate_limit::RlWindow;

const FUZZED_HEADERS: [&str; 7] = [
    "forwarded",
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "user-agent",
    "accept-language",
    "x-request-timeout",
];

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = RlWindow::parse(s);
        let _ = normalize_ip(s);
    }

    // Spread the input over several headers, split on NUL
    let mut headers = HeaderMap::new();
    for (name, chunk) in FUZZED_HEADERS.into_iter().zip(data.split(|b| *b == 0)) {
        if let Ok(value) = HeaderValue::from_bytes(chunk) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }

    let _ = extract_client_ip(&headers);
    let _ = request_timeout(&headers);
    let digest = fingerprint(&headers, "fuzz-salt");
    assert_eq!(digest.len(), 64);
});
