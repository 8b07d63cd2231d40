//! Client identity extraction.

use axum::http::HeaderMap;
use std::net::SocketAddr;

use crate::ratelimit::UNKNOWN_CLIENT;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Derive the rate limiting key for a request.
///
/// Order of precedence: first entry of `X-Forwarded-For`, then `X-Real-IP`
/// (both only when `trust_forwarded` is set), then the peer address, then
/// [`UNKNOWN_CLIENT`].
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(ip) = forwarded_for(headers) {
            return ip;
        }
        if let Some(ip) = header_str(headers, X_REAL_IP) {
            return ip.to_string();
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, X_FORWARDED_FOR)?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.1.2.3:54321".parse().unwrap())
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(name, value) in pairs {
            map.insert(name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_first_forwarded_entry_wins() {
        let map = headers(&[
            ("x-forwarded-for", " 203.0.113.7 , 10.0.0.1, 10.0.0.2"),
            ("x-real-ip", "198.51.100.1"),
        ]);
        assert_eq!(client_key(&map, peer(), true), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback() {
        let map = headers(&[("x-real-ip", "198.51.100.1")]);
        assert_eq!(client_key(&map, peer(), true), "198.51.100.1");
    }

    #[test]
    fn test_empty_forwarded_entry_falls_through() {
        let map = headers(&[("x-forwarded-for", " , 10.0.0.1")]);
        assert_eq!(client_key(&map, peer(), true), "10.1.2.3");
    }

    #[test]
    fn test_peer_fallback() {
        assert_eq!(client_key(&HeaderMap::new(), peer(), true), "10.1.2.3");
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(client_key(&HeaderMap::new(), None, true), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_untrusted_headers_ignored() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7"),
            ("x-real-ip", "198.51.100.1"),
        ]);
        assert_eq!(client_key(&map, peer(), false), "10.1.2.3");
        assert_eq!(client_key(&map, None, false), UNKNOWN_CLIENT);
    }
}
