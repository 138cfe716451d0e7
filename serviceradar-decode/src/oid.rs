//! OID config-name parsing.
//!
//! SNMP metric config names like `ifInOctets_10` or `ifInOctets.10` encode
//! an interface index as a trailing segment. Split on `_` (falling back to
//! `.` when no underscore is present); if the trailing segment parses as a
//! 32-bit integer, it's the `if_index` and the rest is `base`. Otherwise the
//! whole input is the `base` and `if_index` is `0`.

/// Parsed OID config name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOidName {
    pub base: String,
    pub if_index: i64,
}

pub fn parse_oid_config_name(input: &str) -> ParsedOidName {
    let separator = if input.contains('_') { '_' } else { '.' };

    if let Some(pos) = input.rfind(separator) {
        let (prefix, trailing) = input.split_at(pos);
        let trailing = &trailing[1..]; // skip the separator itself
        if let Ok(if_index) = trailing.parse::<i32>() {
            return ParsedOidName {
                base: prefix.to_string(),
                if_index: if_index as i64,
            };
        }
    }

    ParsedOidName {
        base: input.to_string(),
        if_index: 0,
    }
}
