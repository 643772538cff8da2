//! Client identifier derivation from request headers
//!
//! The identifier is the primary key for all per-caller admission state. It
//! is the first valid IP address found in a prioritized list of proxy
//! headers, optionally combined with the authenticated user id. Derivation
//! never fails: when no usable address exists the loopback fallback is used,
//! so admission control can never itself deny service by throwing.

use std::collections::HashMap;
use std::net::IpAddr;

/// Identifier used when no valid network address can be derived.
pub const FALLBACK_IDENTIFIER: &str = "127.0.0.1";

/// Proxy headers consulted for the caller address, in priority order.
const ADDRESS_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Separator between the address and user portions of a combined identifier.
/// Not `:` because IPv6 addresses contain colons.
const USER_SEPARATOR: char = '#';

/// Derives the client identifier from request headers and an optional
/// authenticated user id.
///
/// `x-forwarded-for` may carry a comma-separated chain; only the first
/// (client-most) entry is considered. Entries that do not parse as IP
/// addresses are skipped. With an authenticated user the identifier becomes
/// `"<ip>#<user>"` so distinct accounts behind one NAT are tracked apart.
pub fn derive_identifier(headers: &HashMap<String, String>, user_id: Option<&str>) -> String {
    let ip = ADDRESS_HEADERS
        .iter()
        .filter_map(|name| header_get(headers, name))
        .filter_map(first_valid_ip)
        .next()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| FALLBACK_IDENTIFIER.to_string());

    match user_id {
        Some(user) if !user.is_empty() => format!("{ip}{USER_SEPARATOR}{user}"),
        _ => ip,
    }
}

/// Returns true when the identifier's address portion is loopback, RFC 1918
/// private, link-local, or IPv6 unique-local. Unparseable identifiers are
/// treated as unclassified (not private).
pub fn is_private_origin(identifier: &str) -> bool {
    let addr_part = identifier
        .split(USER_SEPARATOR)
        .next()
        .unwrap_or(identifier);
    match addr_part.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => {
            let seg = v6.segments();
            // fc00::/7 unique-local, fe80::/10 link-local
            v6.is_loopback() || (seg[0] & 0xfe00) == 0xfc00 || (seg[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

/// Case-insensitive header lookup.
fn header_get<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parses the first entry of a possibly comma-separated header value.
fn first_valid_ip(value: &str) -> Option<IpAddr> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .and_then(|s| s.parse::<IpAddr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let h = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(derive_identifier(&h, None), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_used_when_forwarded_for_missing() {
        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(derive_identifier(&h, None), "198.51.100.2");
    }

    #[test]
    fn test_forwarded_for_takes_priority_over_real_ip() {
        let h = headers(&[
            ("x-real-ip", "198.51.100.2"),
            ("x-forwarded-for", "203.0.113.7"),
        ]);
        assert_eq!(derive_identifier(&h, None), "203.0.113.7");
    }

    #[test]
    fn test_cf_connecting_ip_is_last_resort_header() {
        let h = headers(&[("cf-connecting-ip", "192.0.2.9")]);
        assert_eq!(derive_identifier(&h, None), "192.0.2.9");
    }

    #[test]
    fn test_invalid_forwarded_for_falls_through_to_next_header() {
        let h = headers(&[
            ("x-forwarded-for", "not-an-address"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(derive_identifier(&h, None), "198.51.100.2");
    }

    #[test]
    fn test_no_headers_falls_back_to_loopback() {
        let h = headers(&[]);
        assert_eq!(derive_identifier(&h, None), FALLBACK_IDENTIFIER);
    }

    #[test]
    fn test_header_names_matched_case_insensitively() {
        let h = headers(&[("X-Forwarded-For", "203.0.113.7")]);
        assert_eq!(derive_identifier(&h, None), "203.0.113.7");
    }

    #[test]
    fn test_user_id_appended_with_separator() {
        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(derive_identifier(&h, Some("u42")), "198.51.100.2#u42");
    }

    #[test]
    fn test_empty_user_id_not_appended() {
        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(derive_identifier(&h, Some("")), "198.51.100.2");
    }

    #[test]
    fn test_ipv6_identifier_with_user_classifies_by_address_part() {
        let h = headers(&[("x-real-ip", "::1")]);
        let id = derive_identifier(&h, Some("u7"));
        assert_eq!(id, "::1#u7");
        assert!(is_private_origin(&id));
    }

    #[test]
    fn test_loopback_and_rfc1918_are_private() {
        assert!(is_private_origin("127.0.0.1"));
        assert!(is_private_origin("10.1.2.3"));
        assert!(is_private_origin("172.16.0.1"));
        assert!(is_private_origin("192.168.1.1"));
        assert!(is_private_origin("169.254.0.5"));
    }

    #[test]
    fn test_public_addresses_are_not_private() {
        assert!(!is_private_origin("1.2.3.4"));
        assert!(!is_private_origin("203.0.113.7"));
        assert!(!is_private_origin("2001:db8::1"));
    }

    #[test]
    fn test_ipv6_unique_local_and_link_local_are_private() {
        assert!(is_private_origin("fc00::1"));
        assert!(is_private_origin("fd12:3456::1"));
        assert!(is_private_origin("fe80::1"));
    }

    #[test]
    fn test_unparseable_identifier_is_unclassified() {
        assert!(!is_private_origin("banana"));
        assert!(!is_private_origin(""));
    }
}
