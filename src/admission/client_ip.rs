//! Caller IP extraction from proxy headers.

use axum::http::HeaderMap;

/// Forwarded-for header set by reverse proxies.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Real-IP header (nginx).
pub const REAL_IP: &str = "x-real-ip";

/// Discriminant used when no proxy header names the caller.
///
/// Every such caller shares one bucket per scope.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extract the caller IP used as a rate limit discriminant.
///
/// Takes the leftmost `X-Forwarded-For` entry, then `X-Real-IP`, then falls
/// back to [`UNKNOWN_CLIENT`]. Values are not parsed as IP addresses: the
/// string is only a bucket key.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    header_str(headers, REAL_IP)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
