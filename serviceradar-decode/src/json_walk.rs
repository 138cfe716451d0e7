//! Duck-typed JSON walking.
//!
//! A few payload shapes are only loosely specified — gRPC service payloads
//! in particular can nest a resolvable host IP under any of several
//! plausible keys. Rather than hard-coding one shape, try a short list of
//! known path expressions first, then fall back to a recursive search for
//! the first string value under a case-insensitive key containing `"ip"`.

use serde_json::Value;

/// Known, preferred locations for a host IP, tried in order.
const KNOWN_IP_PATHS: &[&[&str]] = &[
    &["host_ip"],
    &["status", "host_ip"],
    &["ip"],
    &["host"],
    &["target"],
];

/// Find a plausible host IP address inside an arbitrary JSON value.
pub fn find_host_ip(value: &Value) -> Option<String> {
    for path in KNOWN_IP_PATHS {
        if let Some(found) = walk_path(value, path) {
            if looks_like_ipv4(&found) {
                return Some(found);
            }
        }
    }
    find_ip_like_key(value)
}

fn walk_path(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    current.as_str().map(str::to_string)
}

/// Recursive fallback: any object key containing `"ip"` (case-insensitive)
/// whose value is a string that parses as IPv4.
fn find_ip_like_key(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if key.to_lowercase().contains("ip") {
                    if let Some(s) = val.as_str() {
                        if looks_like_ipv4(s) {
                            return Some(s.to_string());
                        }
                    }
                }
            }
            for val in map.values() {
                if let Some(found) = find_ip_like_key(val) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(find_ip_like_key),
        _ => None,
    }
}

fn looks_like_ipv4(s: &str) -> bool {
    s.parse::<std::net::Ipv4Addr>().is_ok()
}

/// Known, preferred locations for a hostname, tried in order.
const KNOWN_HOSTNAME_PATHS: &[&[&str]] = &[
    &["hostname"],
    &["host_name"],
    &["status", "host_name"],
    &["status", "hostname"],
    &["host_id"],
];

/// Find a plausible hostname inside an arbitrary JSON value (same
/// duck-typed approach as [`find_host_ip`], minus the IP-shape check).
pub fn find_hostname(value: &Value) -> Option<String> {
    for path in KNOWN_HOSTNAME_PATHS {
        if let Some(found) = walk_path(value, path) {
            if !found.is_empty() {
                return Some(found);
            }
        }
    }
    None
}

/// Render an arbitrary JSON scalar as the wire string representation used
/// for `TimeseriesMetric.value` and metadata fields: strings pass through,
/// everything else gets its natural JSON rendering.
pub fn fmt_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
