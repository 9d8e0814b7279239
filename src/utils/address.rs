//! MAC and IP address normalization.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;

/// Six colon- or hyphen-separated octets, e.g. `aa:bb:cc:dd:ee:ff` or `AA-BB-CC-DD-EE-FF`.
static SEPARATED_MAC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}([:-])[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){4}$")
        .expect("MAC pattern is a valid regex")
});

/// Cisco dotted form, e.g. `aabb.ccdd.eeff`.
static DOTTED_MAC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{4}\.[0-9A-Fa-f]{4}\.[0-9A-Fa-f]{4}$")
        .expect("MAC pattern is a valid regex")
});

/// Normalize a MAC address to its canonical form (uppercase, colon-separated).
///
/// Accepts colon, hyphen, dotted and bare-hex spellings. Returns `None` when the
/// input is not a MAC address.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let trimmed = mac.trim();

    let hex: String = if SEPARATED_MAC.is_match(trimmed) {
        // Mixed separators ("aa:bb-cc...") are rejected
        let first = trimmed.as_bytes()[2] as char;
        if trimmed.chars().filter(|c| *c == ':' || *c == '-').any(|c| c != first) {
            return None;
        }
        trimmed.chars().filter(|c| c.is_ascii_hexdigit()).collect()
    } else if DOTTED_MAC.is_match(trimmed) {
        trimmed.chars().filter(|c| *c != '.').collect()
    } else if trimmed.len() == 12 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        trimmed.to_string()
    } else {
        return None;
    };

    let hex = hex.to_ascii_uppercase();
    let octets: Vec<&str> = (0..6).map(|i| &hex[i * 2..i * 2 + 2]).collect();
    Some(octets.join(":"))
}

/// Strip separators from a canonical MAC, for use inside rule names.
pub fn compact_mac(canonical: &str) -> String {
    canonical.chars().filter(|c| *c != ':').collect()
}

/// Parse an optional IP address. Blank input counts as absent.
///
/// Returns `Err` with the offending input when it is present but unparsable.
pub fn parse_optional_ip(ip: Option<&str>) -> Result<Option<IpAddr>, String> {
    match ip.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse::<IpAddr>().map(Some).map_err(|_| raw.to_string()),
    }
}
