//! Salted, one-way client fingerprints.
//!
//! A fingerprint identifies "the same client" for rate limiting without
//! retaining the raw IP:
//!
//! ```text
//! hashed_ip   = hex(sha256(ip + salt))
//! fingerprint = hex(sha256(hashed_ip + "|" + user_agent + "|" + language))
//! ```
//!
//! Missing inputs are replaced by fixed sentinels, so fingerprinting never
//! fails and requests lacking the same inputs collapse onto one value.

use std::fmt;

use axum::http::HeaderMap;
use axum::http::header::{ACCEPT_LANGUAGE, USER_AGENT};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::middleware::ip::extract_client_ip;

/// Sentinel for a missing `User-Agent`.
pub const UNKNOWN_UA: &str = "unknown-ua";

/// Sentinel for a missing, wildcard or malformed `Accept-Language`.
pub const UNDETERMINED_LANGUAGE: &str = "und";

const RANDOM_SALT_BYTES: usize = 32;

/// Owns the server-side salt and fingerprints requests with it.
///
/// The salt is never exposed through `Debug`.
#[derive(Clone)]
pub struct Fingerprinter {
    salt: String,
}

impl Fingerprinter {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Fingerprinter with a fresh random salt.
    ///
    /// Fingerprints change on every restart, which resets every
    /// fingerprint-keyed rate limit bucket.
    pub fn random() -> Self {
        let mut bytes = [0u8; RANDOM_SALT_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self::new(hex::encode(bytes))
    }

    /// Use `salt` when configured, otherwise fall back to [`Fingerprinter::random`].
    pub fn from_optional_salt(salt: Option<&str>) -> Self {
        match salt.filter(|s| !s.is_empty()) {
            Some(salt) => Self::new(salt),
            None => {
                warn!("FINGERPRINT_SALT not set; using a random per-process salt");
                Self::random()
            }
        }
    }

    pub fn fingerprint(&self, headers: &HeaderMap) -> String {
        fingerprint(headers, &self.salt)
    }
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

/// Fingerprint a request from its headers.
///
/// # Example
///
/// ```rust
/// use axum::http::HeaderMap;
/// use request_pipeline::fingerprint::fingerprint;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
/// headers.insert("user-agent", "curl/8.5".parse().unwrap());
///
/// let a = fingerprint(&headers, "salt");
/// assert_eq!(a.len(), 64);
/// assert_eq!(a, fingerprint(&headers, "salt"));
/// assert_ne!(a, fingerprint(&headers, "pepper"));
/// ```
pub fn fingerprint(headers: &HeaderMap, salt: &str) -> String {
    let ip = extract_client_ip(headers);
    let user_agent = user_agent(headers);
    let language = primary_language(headers);

    let hashed_ip = sha256_hex([ip.as_bytes(), salt.as_bytes()]);
    sha256_hex([
        hashed_ip.as_bytes(),
        b"|",
        user_agent.as_bytes(),
        b"|",
        language.as_bytes(),
    ])
}

fn sha256_hex<const N: usize>(parts: [&[u8]; N]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .unwrap_or(UNKNOWN_UA)
}

/// First language tag of `Accept-Language`, lower-cased.
///
/// `"en-US,en;q=0.9"` gives `"en-us"`. Wildcards and tags with characters
/// outside `[A-Za-z0-9-]` give [`UNDETERMINED_LANGUAGE`].
pub fn primary_language(headers: &HeaderMap) -> String {
    let tag = headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split([',', ';']).next())
        .map(str::trim)
        .unwrap_or_default();

    let valid = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        tag.to_ascii_lowercase()
    } else {
        UNDETERMINED_LANGUAGE.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn base() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        h.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        h
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(fingerprint(&base(), "s"), fingerprint(&base(), "s"));
    }

    #[test]
    fn test_known_digest() {
        let h = HeaderMap::new();
        let hashed_ip = hex::encode(Sha256::digest(b"unknown-ips"));
        let expected = hex::encode(Sha256::digest(
            format!("{hashed_ip}|unknown-ua|und").as_bytes(),
        ));
        assert_eq!(fingerprint(&h, "s"), expected);
    }

    #[test]
    fn test_each_input_changes_output() {
        let reference = fingerprint(&base(), "s");

        let mut ip = base();
        ip.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.8"));
        assert_ne!(fingerprint(&ip, "s"), reference);

        let mut ua = base();
        ua.insert(USER_AGENT, HeaderValue::from_static("curl/8.5"));
        assert_ne!(fingerprint(&ua, "s"), reference);

        let mut lang = base();
        lang.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("de-DE"));
        assert_ne!(fingerprint(&lang, "s"), reference);

        assert_ne!(fingerprint(&base(), "t"), reference);
    }

    #[test]
    fn test_equivalent_ip_forms_match() {
        let mut mapped = base();
        mapped.insert(
            "x-forwarded-for",
            HeaderValue::from_static("::ffff:203.0.113.7"),
        );
        assert_eq!(fingerprint(&mapped, "s"), fingerprint(&base(), "s"));
    }

    #[test]
    fn test_raw_ip_not_in_output() {
        let fp = fingerprint(&base(), "s");
        assert!(!fp.contains("203.0.113.7"));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_primary_language() {
        let lang = |v: &'static str| {
            let mut h = HeaderMap::new();
            h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(v));
            primary_language(&h)
        };
        assert_eq!(lang("en-US,en;q=0.9"), "en-us");
        assert_eq!(lang("fr;q=0.8"), "fr");
        assert_eq!(lang("*"), "und");
        assert_eq!(lang(""), "und");
        assert_eq!(lang("en_US"), "und");
        assert_eq!(primary_language(&HeaderMap::new()), "und");
    }

    #[test]
    fn test_random_salts_differ() {
        let a = Fingerprinter::random();
        let b = Fingerprinter::random();
        assert_ne!(a.fingerprint(&base()), b.fingerprint(&base()));
    }

    #[test]
    fn test_debug_redacts_salt() {
        let fp = Fingerprinter::new("super-secret");
        assert!(!format!("{fp:?}").contains("super-secret"));
    }

    #[test]
    fn test_empty_configured_salt_falls_back_to_random() {
        let a = Fingerprinter::from_optional_salt(Some(""));
        let b = Fingerprinter::from_optional_salt(Some(""));
        assert_ne!(a.fingerprint(&base()), b.fingerprint(&base()));
    }
}
