//! The canonical data model shared by every stage of the ingest pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single reported service inside a [`PollerStatusRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service_name: String,
    pub service_type: String,
    pub available: bool,
    /// `"status"`, `"results"`, `"config"`, ...
    pub source: String,
    /// Arbitrary bytes, almost always JSON.
    #[serde(with = "serde_bytes_as_string")]
    pub message: Vec<u8>,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub poller_id: String,
    #[serde(default)]
    pub kv_store_id: Option<String>,
}

/// Inbound report bundling the status of many services from one poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerStatusRequest {
    pub poller_id: String,
    #[serde(default)]
    pub agent_id: String,
    pub partition: String,
    pub source_ip: String,
    pub timestamp: i64,
    pub services: Vec<ServiceStatus>,
}

/// Acknowledgement returned for every `ReportStatus` call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollerStatusResponse {
    pub received: bool,
}

/// The enhanced-context envelope optionally wrapping a service `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetricsPayload {
    pub poller_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub partition: String,
    #[serde(with = "serde_bytes_as_string")]
    pub data: Vec<u8>,
}

impl ServiceMetricsPayload {
    /// Detect and parse an enhanced envelope out of raw message bytes.
    ///
    /// An envelope is recognised only when both `poller_id` and `agent_id`
    /// are present and non-empty at the top level.
    pub fn try_detect(message: &[u8]) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_slice(message).ok()?;
        let obj = value.as_object()?;
        let poller_id = obj.get("poller_id")?.as_str()?;
        let agent_id = obj.get("agent_id")?.as_str()?;
        if poller_id.is_empty() || agent_id.is_empty() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

/// Where a [`DeviceUpdate`] originated. Confidence is used for tie-breaking
/// when multiple sources disagree about the same device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Sweep,
    Snmp,
    Icmp,
    Mapper,
    Armis,
    Netbox,
    SelfReported,
    ServiceRadar,
    Cleanup,
    Deduplication,
}

impl DiscoverySource {
    /// Relative confidence weight used for tie-breaking (higher wins).
    pub fn confidence(&self) -> u8 {
        match self {
            DiscoverySource::Armis | DiscoverySource::Netbox => 100,
            DiscoverySource::Mapper => 80,
            DiscoverySource::Snmp => 70,
            DiscoverySource::ServiceRadar => 65,
            DiscoverySource::SelfReported => 60,
            DiscoverySource::Icmp => 40,
            DiscoverySource::Sweep => 30,
            DiscoverySource::Deduplication => 20,
            DiscoverySource::Cleanup => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Sweep => "sweep",
            DiscoverySource::Snmp => "snmp",
            DiscoverySource::Icmp => "icmp",
            DiscoverySource::Mapper => "mapper",
            DiscoverySource::Armis => "armis",
            DiscoverySource::Netbox => "netbox",
            DiscoverySource::SelfReported => "self_reported",
            DiscoverySource::ServiceRadar => "service_radar",
            DiscoverySource::Cleanup => "cleanup",
            DiscoverySource::Deduplication => "deduplication",
        }
    }
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The canonical ingestion record produced by every decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub device_id: String,
    pub ip: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    pub partition: String,
    pub source: DiscoverySource,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub poller_id: String,
    pub timestamp: i64,
    pub is_available: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub confidence: u8,
}

impl DeviceUpdate {
    /// The provisional device ID `"<partition>:<ip>"`.
    pub fn provisional_id(partition: &str, ip: &str) -> String {
        format!("{partition}:{ip}")
    }

    /// A *strong identity* exists when a MAC, an integration ID, or a
    /// differing canonical device ID is present.
    pub fn has_strong_identity(&self) -> bool {
        let has_mac = self.mac.as_deref().is_some_and(|m| !m.is_empty());
        let has_meta = |key: &str| {
            self.metadata
                .get(key)
                .is_some_and(|v| !v.is_empty())
        };
        has_mac
            || has_meta("armis_device_id")
            || has_meta("integration_id")
            || has_meta("netbox_device_id")
            || self
                .metadata
                .get("canonical_device_id")
                .is_some_and(|c| c != &self.device_id)
    }

    /// True when `metadata.canonical_device_id` differs from `device_id`,
    /// marking this record as a non-canonical alias.
    pub fn is_non_canonical_alias(&self) -> bool {
        self.metadata
            .get("canonical_device_id")
            .is_some_and(|c| c != &self.device_id)
    }

    /// True when the record has been tombstoned.
    pub fn is_tombstoned(&self) -> bool {
        self.metadata.get("_deleted").map(String::as_str) == Some("true")
            || self.metadata.contains_key("_merged_into")
    }

    /// True if this device ID is a service component
    /// (`serviceradar:<kind>:<id>`), never merged with host devices.
    pub fn is_service_component(&self) -> bool {
        is_service_device_id(&self.device_id)
    }

    /// Parse `metadata.alternate_ips` (a JSON array of strings), if present.
    pub fn alternate_ips(&self) -> Vec<String> {
        self.metadata
            .get("alternate_ips")
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }

    /// Overwrite `metadata.alternate_ips`, excluding the primary IP.
    pub fn set_alternate_ips(&mut self, ips: &[String]) {
        let filtered: Vec<&String> = ips.iter().filter(|ip| ip.as_str() != self.ip).collect();
        if filtered.is_empty() {
            self.metadata.remove("alternate_ips");
            return;
        }
        let encoded =
            serde_json::to_string(&filtered).expect("string vec always serializes");
        self.metadata.insert("alternate_ips".to_string(), encoded);
    }
}

/// Device component kinds. Service devices are never merged with host
/// devices and are never counted in device stats.
pub const SERVICE_DEVICE_KINDS: &[&str] = &[
    "poller", "agent", "checker", "datasvc", "kv", "sync", "mapper", "otel", "zen", "core",
];

/// Core-service kinds that legitimately run inside containers.
pub const CORE_SERVICE_KINDS: &[&str] =
    &["datasvc", "kv", "sync", "mapper", "otel", "zen", "core"];

/// Build a service-device ID: `serviceradar:<kind>:<id>`.
pub fn service_device_id(kind: &str, id: &str) -> String {
    format!("serviceradar:{kind}:{id}")
}

/// True if `device_id` is a `serviceradar:<kind>:<id>` service component.
pub fn is_service_device_id(device_id: &str) -> bool {
    let Some(rest) = device_id.strip_prefix("serviceradar:") else {
        return false;
    };
    let Some((kind, _id)) = rest.split_once(':') else {
        return false;
    };
    SERVICE_DEVICE_KINDS.contains(&kind)
}

/// One discovery-source entry in a [`UnifiedDevice`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedDeviceSource {
    pub source: DiscoverySource,
    pub confidence: u8,
    pub agent_id: String,
    pub poller_id: String,
}

/// Device metadata wrapper matching the datastore's materialised shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub value: HashMap<String, String>,
}

/// The datastore's materialised view of a merged device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedDevice {
    pub device_id: String,
    pub ip: String,
    pub is_available: bool,
    pub first_seen: i64,
    pub last_seen: i64,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub metadata: DeviceMetadata,
    #[serde(default)]
    pub discovery_sources: Vec<UnifiedDeviceSource>,
}

/// Metric type tag for [`TimeseriesMetric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Icmp,
    Snmp,
    Rperf,
}

/// One derived time-series data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesMetric {
    pub poller_id: String,
    pub target_device_ip: String,
    pub device_id: String,
    pub partition: String,
    #[serde(default)]
    pub if_index: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: String,
    pub timestamp: i64,
    /// JSON-encoded metadata string.
    #[serde(default)]
    pub metadata: String,
}

/// A service catalogue row persisted alongside per-poller service status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub poller_id: String,
    pub agent_id: String,
    pub service_name: String,
    pub service_type: String,
    pub available: bool,
    pub timestamp: i64,
}

/// Liveness bookkeeping for one poller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollerStatus {
    pub is_healthy: bool,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// Per-partition slice of a [`DeviceStatsSnapshot`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition: String,
    pub device_count: u64,
    pub available_count: u64,
}

/// Aggregate registry snapshot produced by the stats aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStatsSnapshot {
    pub total: u64,
    pub available: u64,
    pub unavailable: u64,
    pub active: u64,
    pub with_icmp: u64,
    pub with_snmp: u64,
    pub with_sysmon: u64,
    pub with_collectors: u64,
    pub partitions: Vec<PartitionStats>,
}

/// Bookkeeping counters accompanying every stats refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStatsMeta {
    pub raw_records: u64,
    pub processed_records: u64,
    pub skipped_nil: u64,
    pub skipped_tombstoned: u64,
    pub skipped_service_components: u64,
    pub skipped_non_canonical: u64,
    pub skipped_sweep_only: u64,
    pub inferred_canonical_fallback: u64,
}

/// Host-level system snapshot carried by a sysmon payload: CPU, disk,
/// memory, and process readings as opaque JSON values (shape varies by
/// platform/collector version; the core stores it, it doesn't interpret it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SysmonStatus {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub cpus: Vec<serde_json::Value>,
    #[serde(default)]
    pub disks: Vec<serde_json::Value>,
    #[serde(default)]
    pub memory: Option<serde_json::Value>,
    #[serde(default)]
    pub processes: Vec<serde_json::Value>,
}

impl SysmonStatus {
    /// True when none of CPU, disk, memory, or process data is present —
    /// the stall-detection signal.
    pub fn is_empty_of_capability_data(&self) -> bool {
        self.cpus.is_empty() && self.disks.is_empty() && self.processes.is_empty() && self.memory.is_none()
    }
}

/// One buffered sysmon write: a host's system snapshot tagged with the
/// partition it was reported under.
#[derive(Debug, Clone)]
pub struct SysmonMetricsBatch {
    pub host_id: String,
    pub partition: String,
    pub status: SysmonStatus,
}

/// A raw SNMP-discovered interface row, persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredInterface {
    pub device_id: String,
    pub device_ip: String,
    pub if_index: i64,
    pub if_name: String,
    pub ip_addresses: Vec<String>,
}

/// A raw topology-discovery row, persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyDiscoveryEvent {
    pub agent_id: String,
    pub poller_id: String,
    pub local_device_id: String,
    pub local_if_index: i64,
    pub neighbor_device_id: Option<String>,
    pub neighbor_if_index: Option<i64>,
    pub protocol: String,
}

mod serde_bytes_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        Ok(s.into_bytes())
    }
}
