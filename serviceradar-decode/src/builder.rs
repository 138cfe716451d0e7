//! Device-update builder rules.

use std::net::Ipv4Addr;

use chrono::TimeZone;
use serviceradar_common::{now_millis, DeviceUpdate, DiscoverySource};

/// Construct the provisional [`DeviceUpdate`] for a decoded host, applying
/// the mandatory builder rules: provisional `device_id`, confidence from
/// the source weight, and an empty-string rejection for optional fields.
pub struct DeviceUpdateBuilder {
    partition: String,
    ip: String,
    source: DiscoverySource,
    agent_id: String,
    poller_id: String,
    timestamp: i64,
    is_available: bool,
    mac: Option<String>,
    hostname: Option<String>,
    metadata: std::collections::HashMap<String, String>,
}

impl DeviceUpdateBuilder {
    pub fn new(partition: impl Into<String>, ip: impl Into<String>, source: DiscoverySource) -> Self {
        Self {
            partition: partition.into(),
            ip: ip.into(),
            source,
            agent_id: String::new(),
            poller_id: String::new(),
            timestamp: now_millis(),
            is_available: true,
            mac: None,
            hostname: None,
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn poller_id(mut self, poller_id: impl Into<String>) -> Self {
        self.poller_id = poller_id.into();
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.is_available = available;
        self
    }

    /// Set the MAC, rejecting empty strings (nullable field rule).
    pub fn mac(mut self, mac: Option<String>) -> Self {
        self.mac = mac.filter(|m| !m.is_empty());
        self
    }

    /// Set the hostname, rejecting empty strings (nullable field rule).
    pub fn hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname.filter(|h| !h.is_empty());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Pre-encode a JSON-shaped metadata value before insertion.
    pub fn metadata_json<T: serde::Serialize>(mut self, key: impl Into<String>, value: &T) -> Self {
        if let Ok(encoded) = serde_json::to_string(value) {
            self.metadata.insert(key.into(), encoded);
        }
        self
    }

    pub fn build(self) -> DeviceUpdate {
        let device_id = DeviceUpdate::provisional_id(&self.partition, &self.ip);
        DeviceUpdate {
            device_id,
            ip: self.ip,
            mac: self.mac,
            hostname: self.hostname,
            partition: self.partition,
            source: self.source,
            agent_id: self.agent_id,
            poller_id: self.poller_id,
            timestamp: self.timestamp,
            is_available: self.is_available,
            confidence: self.source.confidence(),
            metadata: self.metadata,
        }
    }
}

/// Stamp `last_update` (RFC3339) into a service-device update's metadata,
/// as required for every service-device update.
pub fn stamp_last_update(update: &mut DeviceUpdate) {
    update
        .metadata
        .insert("last_update".to_string(), format_rfc3339_millis(now_millis()));
}

/// Render Unix-epoch milliseconds as UTC RFC3339 with millisecond precision.
fn format_rfc3339_millis(millis: i64) -> String {
    chrono::Utc
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// The Docker bridge ranges explicitly named by the ephemeral-collector
/// heuristic: `172.17.0.0/16` through `172.21.0.0/16`. Deliberately
/// excludes `172.16.0.0/16` and the rest of RFC1918.
const DOCKER_BRIDGE_SECOND_OCTETS: std::ops::RangeInclusive<u8> = 17..=21;

pub fn is_docker_bridge_ip(ip: &str) -> bool {
    let Ok(addr) = ip.parse::<Ipv4Addr>() else {
        return false;
    };
    let octets = addr.octets();
    octets[0] == 172 && DOCKER_BRIDGE_SECOND_OCTETS.contains(&octets[1])
}

/// True when the hostname is missing or looks like a generic ephemeral
/// collector placeholder.
pub fn is_ephemeral_hostname(hostname: &str) -> bool {
    let lower = hostname.to_lowercase();
    lower.is_empty()
        || lower == "unknown"
        || lower == "localhost"
        || lower.contains("agent")
        || lower.contains("gateway")
        || lower.contains("collector")
}

/// The ephemeral-collector skip rule: Docker-range IP *and* an empty or
/// placeholder hostname. A legitimate hostname on a Docker IP is not
/// skipped.
pub fn should_skip_ephemeral_collector(ip: &str, hostname: &str) -> bool {
    is_docker_bridge_ip(ip) && is_ephemeral_hostname(hostname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_provisional_id_and_confidence() {
        let update = DeviceUpdateBuilder::new("default", "10.0.0.1", DiscoverySource::Sweep)
            .timestamp(1_700_000_000_000)
            .build();

        assert_eq!(update.device_id, "default:10.0.0.1");
        assert_eq!(update.confidence, DiscoverySource::Sweep.confidence());
    }

    #[test]
    fn builder_rejects_empty_hostname_and_mac() {
        let update = DeviceUpdateBuilder::new("default", "10.0.0.1", DiscoverySource::Snmp)
            .hostname(Some(String::new()))
            .mac(Some(String::new()))
            .build();

        assert!(update.hostname.is_none());
        assert!(update.mac.is_none());
    }

    #[test]
    fn docker_bridge_ranges() {
        assert!(is_docker_bridge_ip("172.17.0.5"));
        assert!(is_docker_bridge_ip("172.21.255.1"));
        assert!(!is_docker_bridge_ip("172.16.0.5"), "172.16 is explicitly excluded");
        assert!(!is_docker_bridge_ip("172.22.0.5"));
        assert!(!is_docker_bridge_ip("10.0.0.1"));
    }

    #[test]
    fn ephemeral_collector_skip_rule() {
        assert!(should_skip_ephemeral_collector("172.18.0.5", "docker-agent"));
        assert!(should_skip_ephemeral_collector("172.19.0.2", ""));
        assert!(!should_skip_ephemeral_collector("172.18.0.5", "sysmon-osx"));
        assert!(!should_skip_ephemeral_collector("10.0.0.5", "unknown"));
    }

    #[test]
    fn rfc3339_formatting_is_well_formed() {
        let formatted = format_rfc3339_millis(1_700_000_000_000);
        assert_eq!(formatted, "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn stamp_last_update_inserts_metadata_key() {
        let mut update = DeviceUpdateBuilder::new("default", "10.0.0.1", DiscoverySource::SelfReported).build();
        stamp_last_update(&mut update);
        assert!(update.metadata.contains_key("last_update"));
    }
}
