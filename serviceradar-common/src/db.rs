//! The streaming-datastore and alert-sink contracts the core consumes but
//! does not implement. A real deployment plugs in a concrete datastore
//! client and webhook transport behind these traits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    DiscoveredInterface, PollerStatus, Service, ServiceStatus, SysmonMetricsBatch, TimeseriesMetric,
    TopologyDiscoveryEvent, UnifiedDevice,
};
use crate::model::DeviceUpdate;

/// The downstream streaming database. Treated as durable: every method is
/// a publish/write or a read against the materialised view.
#[allow(async_fn_in_trait)]
pub trait Database: Send + Sync {
    async fn publish_sweep_result(&self, update: &DeviceUpdate) -> Result<()>;
    async fn publish_batch_sweep_results(&self, updates: &[DeviceUpdate]) -> Result<()>;
    async fn publish_batch_discovered_interfaces(
        &self,
        interfaces: &[DiscoveredInterface],
    ) -> Result<()>;
    async fn publish_batch_topology_discovery_events(
        &self,
        events: &[TopologyDiscoveryEvent],
    ) -> Result<()>;

    async fn store_metrics(&self, metrics: &[TimeseriesMetric]) -> Result<()>;
    async fn update_service_statuses(&self, statuses: &[ServiceStatus]) -> Result<()>;
    async fn store_services(&self, services: &[Service]) -> Result<()>;
    /// Sysmon snapshots don't fit `TimeseriesMetric` (whose `type` tag is
    /// `icmp`/`snmp`/`rperf` only), so they get their own write path
    /// instead of flowing through `store_metrics`.
    async fn store_sysmon_metrics(&self, batches: &[SysmonMetricsBatch]) -> Result<()>;

    async fn update_poller_status(&self, poller_id: &str, status: PollerStatus) -> Result<()>;
    async fn get_poller_status(&self, poller_id: &str) -> Result<Option<PollerStatus>>;

    async fn get_unified_device(&self, device_id: &str) -> Result<Option<UnifiedDevice>>;
    async fn get_unified_devices_by_ip(
        &self,
        ips: &[String],
    ) -> Result<HashMap<String, UnifiedDevice>>;
    async fn get_unified_devices_by_ips_or_ids(
        &self,
        ips_or_ids: &[String],
    ) -> Result<HashMap<String, UnifiedDevice>>;
    async fn list_unified_devices(&self) -> Result<Vec<UnifiedDevice>>;
    async fn count_unified_devices(&self) -> Result<u64>;
}

/// Severity level for a [`WebhookAlert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// An alert fired toward the (externally implemented) webhook transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAlert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub timestamp: i64,
    pub poller_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl WebhookAlert {
    pub fn new(
        level: AlertLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        poller_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            timestamp,
            poller_id: poller_id.into(),
            service_name: String::new(),
            details: HashMap::new(),
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Cooldown-aware alert sink. Implementations return
/// [`crate::error::CoreError::AlertCooldown`] when suppressing a repeat.
#[allow(async_fn_in_trait)]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, alert: WebhookAlert) -> Result<()>;
}

/// Where the stats aggregator publishes its periodic gauges.
/// A concrete metrics backend isn't part of this core; the default
/// implementation logs a structured summary line per cycle.
pub trait StatsSink: Send + Sync {
    fn publish(&self, snapshot: &crate::model::DeviceStatsSnapshot, meta: &crate::model::DeviceStatsMeta);
}

/// A [`StatsSink`] that emits the snapshot as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn publish(&self, snapshot: &crate::model::DeviceStatsSnapshot, meta: &crate::model::DeviceStatsMeta) {
        tracing::info!(
            total = snapshot.total,
            available = snapshot.available,
            unavailable = snapshot.unavailable,
            active = snapshot.active,
            with_icmp = snapshot.with_icmp,
            with_snmp = snapshot.with_snmp,
            with_sysmon = snapshot.with_sysmon,
            raw_records = meta.raw_records,
            processed_records = meta.processed_records,
            skipped_non_canonical = meta.skipped_non_canonical,
            "device stats snapshot refreshed"
        );
    }
}
