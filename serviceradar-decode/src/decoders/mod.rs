//! Per-service decoders.

pub mod icmp;
pub mod rperf;
pub mod snmp;
pub mod snmp_discovery;
pub mod sweep;
pub mod sync_discovery;
pub mod sysmon;

use serviceradar_common::{DeviceUpdate, DiscoveredInterface, TimeseriesMetric, TopologyDiscoveryEvent};

/// Report-level context a decoder falls back to when a service payload
/// carries no enhanced envelope of its own.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub poller_id: String,
    pub agent_id: String,
    pub partition: String,
    pub source_ip: String,
    pub timestamp: i64,
    pub service_name: String,
}

/// Everything one decoder invocation can produce.
#[derive(Debug, Default)]
pub struct DecodeOutput {
    pub device_updates: Vec<DeviceUpdate>,
    pub metrics: Vec<TimeseriesMetric>,
    pub interfaces: Vec<DiscoveredInterface>,
    pub topology_events: Vec<TopologyDiscoveryEvent>,
    /// Populated only by the sweep decoder, for callers that want the
    /// validated summary fields alongside the per-host updates.
    pub sweep_summary: Option<crate::decoders::sweep::SweepSummary>,
}

impl DecodeOutput {
    pub fn merge(&mut self, other: DecodeOutput) {
        self.device_updates.extend(other.device_updates);
        self.metrics.extend(other.metrics);
        self.interfaces.extend(other.interfaces);
        self.topology_events.extend(other.topology_events);
        if other.sweep_summary.is_some() {
            self.sweep_summary = other.sweep_summary;
        }
    }
}
