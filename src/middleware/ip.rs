//! Client IP resolution from proxy headers.
//!
//! Used by the fingerprint generator; the resolved address is hashed before
//! it goes anywhere else.
//!
//! # Header Priority
//!
//! 1. `Forwarded` (RFC 7239): the **last** `for=` parameter across all
//!    header lines, i.e. the hop appended by the proxy closest to us
//! 2. `X-Forwarded-For`: the first entry
//! 3. Vendor headers, first present of [`VENDOR_HEADERS`]
//! 4. [`UNKNOWN_IP`]
//!
//! Empty values count as absent and fall through to the next source.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **These functions trust client-provided headers.** Deploy behind a reverse
//! proxy that overwrites (not appends to) the client IP headers and block
//! direct access to the service, otherwise clients can rotate spoofed
//! addresses to dodge per-client rate limits.
//!
//! # Internal Architecture
//!
//! ```text
//!   extract_ip_from_headers   ← private, returns ExtractedIp<'a> (no allocations)
//!              │
//!              ▼
//!   normalize_ip              ← strips quotes/brackets/port, collapses ::ffff:
//!              │
//!              ▼
//!   extract_client_ip         ← Cow<'static, str>, borrowed for the sentinel
//! ```

use std::borrow::Cow;

use axum::http::HeaderMap;
use axum::http::header::FORWARDED;
use tracing::trace;

/// Fallback value when no client IP can be determined.
///
/// All requests without identifiable IPs share this value, so they also share
/// rate limit buckets for a given user agent and language.
pub const UNKNOWN_IP: &str = "unknown-ip";

/// Single-address headers set by common CDNs and proxies, in priority order.
pub const VENDOR_HEADERS: [&str; 6] = [
    "x-real-ip",
    "cf-connecting-ip",
    "true-client-ip",
    "fastly-client-ip",
    "fly-client-ip",
    "x-client-ip",
];

const IPV4_MAPPED_PREFIX: &str = "::ffff:";

// =============================================================================
// Private Helper
// =============================================================================

/// Where the raw address came from. Kept for trace logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractedIp<'a> {
    /// Last `for=` parameter of the `Forwarded` header.
    FromForwarded(&'a str),
    /// First entry of `X-Forwarded-For`.
    FromXff(&'a str),
    /// A vendor header, with its name.
    FromVendor(&'static str, &'a str),
    /// No usable header.
    NotFound,
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Last `for=` value across all `Forwarded` header lines.
///
/// Elements are split on `,` and pairs on `;`; parameter names are
/// case-insensitive.
fn last_forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(FORWARDED)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split([',', ';']))
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("for")
                .then(|| non_empty(value))
                .flatten()
        })
        .last()
}

#[inline]
fn extract_ip_from_headers(headers: &HeaderMap) -> ExtractedIp<'_> {
    if let Some(ip) = last_forwarded_for(headers) {
        return ExtractedIp::FromForwarded(ip);
    }

    // Format: "client, proxy1, proxy2" - we want the first (client) IP
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next().and_then(non_empty)
    {
        return ExtractedIp::FromXff(first_ip);
    }

    for name in VENDOR_HEADERS {
        if let Some(header) = headers.get(name)
            && let Ok(value) = header.to_str()
            && let Some(ip) = non_empty(value)
        {
            return ExtractedIp::FromVendor(name, ip);
        }
    }

    ExtractedIp::NotFound
}

// =============================================================================
// Public API
// =============================================================================

/// Normalize a raw address token.
///
/// - Trims whitespace and surrounding double quotes (`"[::1]:443"` in `Forwarded`)
/// - Strips IPv6 brackets, dropping any `:port` that follows the closing bracket
/// - Drops the port from `IPv4:port` (exactly one colon, dotted host)
/// - Collapses IPv4-mapped IPv6 (`::ffff:203.0.113.7`) to plain IPv4
///
/// Anything else passes through unchanged; this is not a validator.
pub fn normalize_ip(raw: &str) -> Cow<'_, str> {
    let mut ip = raw.trim();
    ip = ip.trim_matches('"').trim();

    if let Some(rest) = ip.strip_prefix('[') {
        ip = match rest.split_once(']') {
            Some((inner, _port)) => inner,
            None => rest,
        };
    } else if let Some((host, port)) = ip.split_once(':')
        && host.contains('.')
        && !port.contains(':')
    {
        ip = host;
    }

    if let Some(prefix) = ip.get(..IPV4_MAPPED_PREFIX.len())
        && prefix.eq_ignore_ascii_case(IPV4_MAPPED_PREFIX)
        && let Some(v4) = ip.get(IPV4_MAPPED_PREFIX.len()..)
        && v4.contains('.')
    {
        ip = v4;
    }

    if ip.len() == raw.len() {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(ip.to_string())
    }
}

/// Resolve and normalize the client IP from request headers.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` when nothing usable is present.
///
/// # Example
///
/// ```rust
/// use axum::http::HeaderMap;
/// use request_pipeline::middleware::ip::extract_client_ip;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for", "::ffff:203.0.113.7, 10.0.0.1".parse().unwrap());
/// assert_eq!(extract_client_ip(&headers), "203.0.113.7");
/// ```
pub fn extract_client_ip(headers: &HeaderMap) -> Cow<'static, str> {
    let ip = match extract_ip_from_headers(headers) {
        ExtractedIp::FromForwarded(ip) => {
            trace!(client_ip = %ip, "Client IP from Forwarded");
            ip
        }
        ExtractedIp::FromXff(ip) => {
            trace!(client_ip = %ip, "Client IP from X-Forwarded-For");
            ip
        }
        ExtractedIp::FromVendor(header, ip) => {
            trace!(client_ip = %ip, header, "Client IP from vendor header");
            ip
        }
        ExtractedIp::NotFound => return Cow::Borrowed(UNKNOWN_IP),
    };

    match non_empty(&normalize_ip(ip)) {
        Some(normalized) => Cow::Owned(normalized.to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}
